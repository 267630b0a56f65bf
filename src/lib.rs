//! # Assignment Grader
//!
//! 一个用于批量评阅学生作业的 Rust 应用程序
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 基础设施层（Infrastructure / Clients）
//! - `clients/` - 带指数退避重试的 HTTP 客户端、Gemini / chat-completions 推理后端
//! - `infrastructure/` - 文档存储（上传目录）与 pdfium PDF 引擎，只暴露能力
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，只处理单个文档 / 单次评分
//! - `DocumentExtractor` - PDF / DOCX / 纯文本提取，PDF 无文本层时逐页 OCR
//! - `ReferenceSummarizer` - 参考答案摘要（失败回退原文）
//! - `EvaluationClient` - 模型评分，解析 `{score, remarks}`
//! - `Notifier` - webhook 通知（尽力而为）
//! - `ResultWriter` - 评分结果持久化
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一份提交"的完整评分流程
//! - `GradingCtx` - 上下文封装（submission_id + 学生信息）
//! - `GradingFlow` - 流程编排（extract → evaluate → record → notify）
//! - `AssignmentFlow` - 作业准备（摘要 → 公告）
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/batch_processor` - 批量评分处理器，管理资源、并发与取消
//! - `orchestrator/assignment_processor` - 单份作业处理器，遍历提交列表
//!
//! ## 模块结构

pub mod clients;
pub mod config;
pub mod error;
pub mod infrastructure;
pub mod logger;
pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use clients::{HttpTransport, InferenceClient, RetryPolicy, RetryingHttpClient};
pub use config::{BackendKind, Config};
pub use error::{ErrorKind, GradingError};
pub use models::{EvaluationResult, GradingRequest, ReferenceMaterial, Score};
pub use orchestrator::{process_assignment, App, GradingStats};
pub use workflow::{AssignmentFlow, GradingCtx, GradingFlow, GradingOutcome};
