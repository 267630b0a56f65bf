//! 错误类型
//!
//! 每个组件边界都返回带标签的错误，调用方按 [`ErrorKind`] 分支，
//! 而不是捕获笼统的错误类型。

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// 错误分类标签
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// 网络 / 超时 / 非 2xx，重试耗尽后才会出现
    TransportFailure,
    /// 缺少必需的端点或密钥，不重试
    Unconfigured,
    /// 文档无法读取、格式不支持或两条提取路径都没有文本
    ExtractionFailure,
    /// 后端响应缺少预期字段或不是合法的结构化数据
    ParseFailure,
    /// 评分阶段的失败（包括评分成功后持久化失败）
    EvaluationFailure,
    /// 调用方取消或超过截止时间
    Cancelled,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::TransportFailure => "TransportFailure",
            ErrorKind::Unconfigured => "Unconfigured",
            ErrorKind::ExtractionFailure => "ExtractionFailure",
            ErrorKind::ParseFailure => "ParseFailure",
            ErrorKind::EvaluationFailure => "EvaluationFailure",
            ErrorKind::Cancelled => "Cancelled",
        };
        f.write_str(name)
    }
}

// ========== HTTP ==========

/// 单次请求尝试的失败原因
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AttemptError {
    /// 连接失败等网络错误
    #[error("网络错误: {0}")]
    Network(String),
    /// 请求超时
    #[error("请求超时 ({0:?})")]
    Timeout(Duration),
    /// 非 2xx 响应
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
}

impl AttemptError {
    /// 是否为 4xx 请求错误（408 / 429 除外）
    pub fn is_client_error(&self) -> bool {
        matches!(self, AttemptError::Status { status, .. }
            if (400..500).contains(status) && *status != 408 && *status != 429)
    }
}

/// 重试 HTTP 客户端的失败
#[derive(Debug, Error)]
pub enum HttpError {
    /// 端点或密钥缺失，未发起任何请求
    #[error("未配置: {what}")]
    Unconfigured { what: String },
    /// 重试耗尽（或遇到不可重试的错误）后的最后一次失败
    #[error("请求 {endpoint} 失败 (共尝试 {attempts} 次): {last}")]
    Transport {
        endpoint: String,
        attempts: u32,
        #[source]
        last: AttemptError,
    },
}

impl HttpError {
    pub fn unconfigured(what: impl Into<String>) -> Self {
        HttpError::Unconfigured { what: what.into() }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            HttpError::Unconfigured { .. } => ErrorKind::Unconfigured,
            HttpError::Transport { .. } => ErrorKind::TransportFailure,
        }
    }
}

// ========== 推理 ==========

/// 一次推理调用的失败
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error(transparent)]
    Http(#[from] HttpError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("请求构建失败: {0}")]
    Request(String),
}

impl InferenceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            InferenceError::Http(e) => e.kind(),
            InferenceError::Parse(_) => ErrorKind::ParseFailure,
            InferenceError::Request(_) => ErrorKind::EvaluationFailure,
        }
    }
}

// ========== 文档提取 ==========

/// PDF 后端错误
#[derive(Debug, Clone, Error)]
pub enum PdfError {
    #[error("pdfium 库不可用: {0}")]
    LibraryUnavailable(String),
    #[error("PDF 加载失败: {0}")]
    Load(String),
    #[error("渲染第 {page} 页失败: {message}")]
    Render { page: usize, message: String },
}

/// OCR 失败
#[derive(Debug, Error)]
pub enum OcrError {
    #[error(transparent)]
    Inference(#[from] InferenceError),
}

/// 文档提取失败
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("无法读取文件 {}: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("不支持的文件格式 {}: .{extension}", path.display())]
    UnsupportedFormat { path: PathBuf, extension: String },
    #[error("文档已损坏 {}: {message}", path.display())]
    Corrupt { path: PathBuf, message: String },
    #[error("PDF 处理失败 {}: {source}", path.display())]
    Pdf {
        path: PathBuf,
        #[source]
        source: PdfError,
    },
    #[error("第 {page} 页 OCR 失败 {}: {source}", path.display())]
    Ocr {
        path: PathBuf,
        page: usize,
        #[source]
        source: OcrError,
    },
    #[error("文档中没有可用文本: {}", path.display())]
    NoText { path: PathBuf },
}

impl ExtractionError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::ExtractionFailure
    }
}

// ========== 解析 ==========

/// 结构化响应解析失败
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("响应中没有补全文本")]
    MissingCompletion,
    #[error("响应体不是合法 JSON: {0}")]
    MalformedBody(String),
    #[error("补全文本不是合法 JSON: {0}")]
    MalformedJson(String),
    #[error("补全文本不是 JSON 对象")]
    NotAnObject,
    #[error("缺少字段: {0}")]
    MissingField(&'static str),
    #[error("字段 {field} 无效: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

// ========== 评分 ==========

/// 评分阶段失败
#[derive(Debug, Error)]
pub enum EvaluationError {
    #[error(transparent)]
    Http(#[from] HttpError),
    #[error("解析评分结果失败: {0}")]
    Parse(#[from] ParseError),
    #[error("请求构建失败: {0}")]
    Request(String),
    #[error("评分结果持久化失败: {0}")]
    Persistence(String),
}

impl From<InferenceError> for EvaluationError {
    fn from(e: InferenceError) -> Self {
        match e {
            InferenceError::Http(e) => EvaluationError::Http(e),
            InferenceError::Parse(e) => EvaluationError::Parse(e),
            InferenceError::Request(msg) => EvaluationError::Request(msg),
        }
    }
}

impl EvaluationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EvaluationError::Http(e) => e.kind(),
            EvaluationError::Parse(_) => ErrorKind::ParseFailure,
            EvaluationError::Request(_) | EvaluationError::Persistence(_) => {
                ErrorKind::EvaluationFailure
            }
        }
    }
}

// ========== 编排 ==========

/// 评分请求的处理阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GradingStage {
    ExtractStudent,
    ExtractReference,
    Evaluate,
    Record,
    Notify,
}

impl fmt::Display for GradingStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GradingStage::ExtractStudent => "EXTRACT_STUDENT",
            GradingStage::ExtractReference => "EXTRACT_REFERENCE",
            GradingStage::Evaluate => "EVALUATE",
            GradingStage::Record => "RECORD",
            GradingStage::Notify => "NOTIFY",
        };
        f.write_str(name)
    }
}

/// 取消来源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// 调用方主动取消
    Caller,
    /// 超过请求截止时间
    Deadline,
}

/// 评分编排的终止错误
#[derive(Debug, Error)]
pub enum GradingError {
    #[error("[{stage}] 文本提取失败: {source}")]
    Extraction {
        stage: GradingStage,
        #[source]
        source: ExtractionError,
    },
    #[error("[EVALUATE] 评分失败: {0}")]
    Evaluation(#[source] EvaluationError),
    #[error("[{stage}] 已取消 ({reason:?})")]
    Cancelled {
        stage: GradingStage,
        reason: CancelReason,
    },
}

impl GradingError {
    /// 对外的错误分类
    ///
    /// 评分阶段内的传输 / 配置 / 解析失败统一归为 `EvaluationFailure`，
    /// 具体原因见 [`GradingError::cause_kind`]。
    pub fn kind(&self) -> ErrorKind {
        match self {
            GradingError::Extraction { .. } => ErrorKind::ExtractionFailure,
            GradingError::Evaluation(_) => ErrorKind::EvaluationFailure,
            GradingError::Cancelled { .. } => ErrorKind::Cancelled,
        }
    }

    /// 底层原因的分类
    pub fn cause_kind(&self) -> ErrorKind {
        match self {
            GradingError::Extraction { source, .. } => source.kind(),
            GradingError::Evaluation(e) => e.kind(),
            GradingError::Cancelled { .. } => ErrorKind::Cancelled,
        }
    }
}
