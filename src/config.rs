use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::clients::http_client::RetryPolicy;
use crate::models::notification::EventType;

/// 推理后端类型
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendKind {
    /// Gemini generateContent 接口（API key 走 query 参数）
    Gemini,
    /// OpenAI 兼容的 chat/completions 接口（DeepSeek 等，Bearer 认证）
    ChatCompletions,
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "gemini" => Ok(Self::Gemini),
            "deepseek" | "openai" | "chat" | "chat_completions" => Ok(Self::ChatCompletions),
            other => Err(format!("未知的推理后端: {}", other)),
        }
    }
}

/// 程序配置
///
/// 进程启动时构建一次，之后只读；各组件在构造时按引用取用。
#[derive(Clone, Debug)]
pub struct Config {
    // --- Gemini ---
    pub gemini_api_key: String,
    pub gemini_api_url: String,
    pub gemini_max_output_tokens: u32,
    // --- DeepSeek / chat completions ---
    pub deepseek_api_key: String,
    pub deepseek_api_url: String,
    pub deepseek_model: String,
    // --- 后端选择 ---
    pub evaluation_backend: BackendKind,
    pub summarization_backend: BackendKind,
    pub ocr_backend: BackendKind,
    // --- 通知 webhook ---
    pub new_assignment_webhook: Option<String>,
    pub evaluation_complete_webhook: Option<String>,
    // --- 重试与超时 ---
    pub inference_retry: RetryPolicy,
    pub webhook_retry: RetryPolicy,
    pub inference_timeout: Duration,
    pub webhook_timeout: Duration,
    /// 单个评分请求的截止时间，None 表示不限
    pub grading_timeout: Option<Duration>,
    // --- 文档 ---
    pub pdfium_library_path: Option<PathBuf>,
    pub upload_folder: PathBuf,
    // --- 批量评分 ---
    pub manifest_path: String,
    pub results_file: String,
    pub max_concurrent_gradings: usize,
    /// 是否显示详细日志
    pub verbose_logging: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gemini_api_key: String::new(),
            gemini_api_url: "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash-preview-05-20:generateContent".to_string(),
            gemini_max_output_tokens: 2048,
            deepseek_api_key: String::new(),
            deepseek_api_url: "https://api.deepseek.com/chat/completions".to_string(),
            deepseek_model: "deepseek-chat".to_string(),
            evaluation_backend: BackendKind::Gemini,
            summarization_backend: BackendKind::ChatCompletions,
            ocr_backend: BackendKind::Gemini,
            new_assignment_webhook: None,
            evaluation_complete_webhook: None,
            inference_retry: RetryPolicy::default(),
            webhook_retry: RetryPolicy::default(),
            inference_timeout: Duration::from_secs(120),
            webhook_timeout: Duration::from_secs(10),
            grading_timeout: None,
            pdfium_library_path: None,
            upload_folder: PathBuf::from("uploads"),
            manifest_path: "grading.toml".to_string(),
            results_file: "grades.jsonl".to_string(),
            max_concurrent_gradings: 4,
            verbose_logging: false,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            gemini_api_key: env_string("GEMINI_API_KEY").unwrap_or(default.gemini_api_key),
            gemini_api_url: env_string("GEMINI_API_URL").unwrap_or(default.gemini_api_url),
            gemini_max_output_tokens: env_parse("GEMINI_MAX_OUTPUT_TOKENS").unwrap_or(default.gemini_max_output_tokens),
            deepseek_api_key: env_string("DEEPSEEK_API_KEY").unwrap_or(default.deepseek_api_key),
            deepseek_api_url: env_string("DEEPSEEK_API_URL").unwrap_or(default.deepseek_api_url),
            deepseek_model: env_string("DEEPSEEK_MODEL").unwrap_or(default.deepseek_model),
            evaluation_backend: env_parse("EVALUATION_BACKEND").unwrap_or(default.evaluation_backend),
            summarization_backend: env_parse("SUMMARIZATION_BACKEND").unwrap_or(default.summarization_backend),
            ocr_backend: env_parse("OCR_BACKEND").unwrap_or(default.ocr_backend),
            new_assignment_webhook: env_string("NOTIFICATION_NEW_ASSIGNMENT_WEBHOOK"),
            evaluation_complete_webhook: env_string("NOTIFICATION_EVALUATION_COMPLETE_WEBHOOK"),
            inference_retry: retry_from_env("INFERENCE_RETRY", default.inference_retry),
            webhook_retry: retry_from_env("WEBHOOK_RETRY", default.webhook_retry),
            inference_timeout: env_parse("INFERENCE_TIMEOUT_SECS").map(Duration::from_secs).unwrap_or(default.inference_timeout),
            webhook_timeout: env_parse("WEBHOOK_TIMEOUT_SECS").map(Duration::from_secs).unwrap_or(default.webhook_timeout),
            grading_timeout: env_parse("GRADING_TIMEOUT_SECS").map(Duration::from_secs),
            pdfium_library_path: env_string("PDFIUM_LIBRARY_PATH").map(PathBuf::from),
            upload_folder: env_string("UPLOAD_FOLDER").map(PathBuf::from).unwrap_or(default.upload_folder),
            manifest_path: env_string("GRADING_MANIFEST").unwrap_or(default.manifest_path),
            results_file: env_string("RESULTS_FILE").unwrap_or(default.results_file),
            max_concurrent_gradings: env_parse("MAX_CONCURRENT_GRADINGS").unwrap_or(default.max_concurrent_gradings),
            verbose_logging: env_parse("VERBOSE_LOGGING").unwrap_or(default.verbose_logging),
        }
    }

    /// 按事件类型解析 webhook 地址，空字符串视为未配置
    pub fn webhook_url(&self, event_type: EventType) -> Option<&str> {
        let url = match event_type {
            EventType::NewAssignment => self.new_assignment_webhook.as_deref(),
            EventType::EvaluationComplete => self.evaluation_complete_webhook.as_deref(),
        };
        url.map(str::trim).filter(|u| !u.is_empty())
    }
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

fn retry_from_env(prefix: &str, default: RetryPolicy) -> RetryPolicy {
    RetryPolicy {
        initial_backoff: env_parse(&format!("{}_INITIAL_MS", prefix))
            .map(Duration::from_millis)
            .unwrap_or(default.initial_backoff),
        max_backoff: env_parse(&format!("{}_MAX_MS", prefix))
            .map(Duration::from_millis)
            .unwrap_or(default.max_backoff),
        max_attempts: env_parse(&format!("{}_MAX_ATTEMPTS", prefix))
            .unwrap_or(default.max_attempts),
        retry_client_errors: env_parse(&format!("{}_CLIENT_ERRORS", prefix))
            .unwrap_or(default.retry_client_errors),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_kind_from_str() {
        assert_eq!("Gemini".parse::<BackendKind>(), Ok(BackendKind::Gemini));
        assert_eq!(
            "deepseek".parse::<BackendKind>(),
            Ok(BackendKind::ChatCompletions)
        );
        assert!("llama".parse::<BackendKind>().is_err());
    }

    #[test]
    fn test_webhook_url_ignores_blank_values() {
        let config = Config {
            new_assignment_webhook: Some("   ".to_string()),
            evaluation_complete_webhook: Some("https://hooks.example.com/eval".to_string()),
            ..Config::default()
        };

        assert_eq!(config.webhook_url(EventType::NewAssignment), None);
        assert_eq!(
            config.webhook_url(EventType::EvaluationComplete),
            Some("https://hooks.example.com/eval")
        );
    }

    #[test]
    fn test_default_retry_and_timeouts() {
        let config = Config::default();
        assert_eq!(config.inference_retry.max_attempts, 5);
        assert_eq!(config.webhook_retry.max_backoff, Duration::from_secs(10));
        assert_eq!(config.webhook_timeout, Duration::from_secs(10));
    }
}
