//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责批量评分和流程调度，只做调度和统计，不做具体业务判断。
//!
//! ## 模块划分
//!
//! ### `batch_processor` - 批量评分处理器
//! - 管理应用生命周期（初始化、运行）
//! - 加载评分清单（Vec<AssignmentEntry>）
//! - 控制并发数量（Semaphore）和取消（CancellationToken）
//! - 输出全局统计信息
//!
//! ### `assignment_processor` - 单份作业处理器
//! - 准备作业（摘要、新作业通知）
//! - 并发评分该作业的所有提交（Vec<SubmissionEntry>）
//! - 输出单份作业的统计信息
//!
//! ## 层次关系
//!
//! ```text
//! batch_processor (处理 Vec<Assignment>)
//!     ↓
//! assignment_processor (处理 Vec<Submission>)
//!     ↓
//! workflow::GradingFlow (处理单份提交)
//!     ↓
//! services (能力层：extract / evaluate / record / notify)
//!     ↓
//! clients + infrastructure (HTTP 重试、文档存储、PDF 引擎)
//! ```

pub mod assignment_processor;
pub mod batch_processor;

pub use assignment_processor::{process_assignment, GradingStats};
pub use batch_processor::App;
