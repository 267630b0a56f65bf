//! 业务能力层（Services）
//!
//! 每个服务只描述"我能做什么"，只处理单个文档 / 单次评分，不关心流程顺序。

pub mod evaluation;
pub mod notifier;
pub mod ocr;
pub mod result_writer;
pub mod summarizer;
pub mod text_extractor;

pub use evaluation::{EvaluationClient, Evaluator};
pub use notifier::{NotificationSink, Notifier, NotifyCondition, NotifyOutcome};
pub use ocr::{OcrEngine, VisionOcr};
pub use result_writer::{EvaluationRecorder, ResultWriter};
pub use summarizer::{ReferenceSummarizer, ReferenceSummary, SummaryOrigin};
pub use text_extractor::{DocumentExtractor, DocumentFormat, TextExtractor};
