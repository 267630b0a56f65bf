//! 外部 HTTP 客户端
//!
//! - `http_client` - 带指数退避重试的通用 HTTP 客户端
//! - `inference` - Gemini / chat-completions 推理后端

pub mod http_client;
pub mod inference;

pub use http_client::{
    HttpMethod, HttpRequest, HttpResponse, HttpTransport, ReqwestTransport, RetryPolicy,
    RetryingHttpClient,
};
pub use inference::{InferenceBackend, InferenceClient, InferencePrompt};
