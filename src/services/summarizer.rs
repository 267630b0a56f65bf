//! 参考答案摘要 - 业务能力层
//!
//! 创建作业时执行一次，把冗长的参考答案压缩成结构化 JSON 摘要，
//! 之后每次评分都用摘要代替原文以缩短提示词。
//!
//! 摘要只是优化：任何失败都回退为原文，不会让作业准备失败。

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::clients::inference::{InferenceClient, InferencePrompt};
use crate::models::evidence::EvidenceBlock;
use crate::models::grading::strip_code_fence;

pub const SUMMARY_SYSTEM_PROMPT: &str =
    "You are a helpful assistant that summarizes reference materials for grading.";

const SUMMARY_TEMPERATURE: f32 = 0.5;

fn summary_prompt(reference_text: &str) -> String {
    format!(
        "Summarize the following reference answer text into a concise, well-structured json \
format that can be used for automated grading.\n\
The summary should retain all key points and facts.\n\n\
Reference Text:\n{}",
        reference_text
    )
}

/// 摘要来源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryOrigin {
    /// 模型生成的结构化摘要
    Summarized,
    /// 摘要失败，回退为原文
    Original,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceSummary {
    pub text: String,
    pub origin: SummaryOrigin,
}

impl ReferenceSummary {
    fn original(text: &str) -> Self {
        Self {
            text: text.to_string(),
            origin: SummaryOrigin::Original,
        }
    }

    pub fn is_summarized(&self) -> bool {
        self.origin == SummaryOrigin::Summarized
    }
}

pub struct ReferenceSummarizer {
    client: InferenceClient,
}

impl ReferenceSummarizer {
    pub fn new(client: InferenceClient) -> Self {
        Self { client }
    }

    /// 生成摘要；失败时返回原文
    pub async fn summarize(&self, long_text: &str) -> ReferenceSummary {
        if long_text.trim().is_empty() {
            return ReferenceSummary::original(long_text);
        }

        let prompt = InferencePrompt::new(vec![EvidenceBlock::text(summary_prompt(long_text))])
            .with_system(SUMMARY_SYSTEM_PROMPT)
            .with_temperature(SUMMARY_TEMPERATURE)
            .structured();

        let completion = match self.client.complete(&prompt).await {
            Ok(text) => text,
            Err(e) => {
                warn!("⚠️ 参考答案摘要失败 ({}), 使用原文: {}", e.kind(), e);
                return ReferenceSummary::original(long_text);
            }
        };

        let body = strip_code_fence(&completion);
        if let Err(e) = serde_json::from_str::<Value>(body) {
            warn!("⚠️ 摘要不是合法 JSON，使用原文: {}", e);
            debug!("摘要原始内容: {}", completion);
            return ReferenceSummary::original(long_text);
        }

        info!(
            "✓ 参考答案摘要完成: {} → {} 字符",
            long_text.chars().count(),
            body.chars().count()
        );

        ReferenceSummary {
            text: body.to_string(),
            origin: SummaryOrigin::Summarized,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::clients::http_client::testing::{ok, status, ScriptedTransport};
    use crate::clients::http_client::{RetryPolicy, RetryingHttpClient};
    use crate::clients::inference::{ChatCompletionsBackend, InferenceBackend};

    const REFERENCE: &str = "Mitochondria generate ATP via oxidative phosphorylation.";

    fn summarizer(transport: Arc<ScriptedTransport>, api_key: &str) -> ReferenceSummarizer {
        let backend = InferenceBackend::ChatCompletions(ChatCompletionsBackend {
            api_key: api_key.to_string(),
            api_url: "https://chat.example.com/chat/completions".to_string(),
            model: "deepseek-chat".to_string(),
        });
        ReferenceSummarizer::new(InferenceClient::new(
            backend,
            RetryingHttpClient::new(transport, RetryPolicy::default()),
            Duration::from_secs(60),
        ))
    }

    fn chat_reply(content: &str) -> String {
        serde_json::json!({ "choices": [{ "message": { "content": content } }] }).to_string()
    }

    #[tokio::test]
    async fn test_summarize_returns_structured_text() {
        let summary_json = r#"{"key_points":["ATP","oxidative phosphorylation"]}"#;
        let transport = ScriptedTransport::always(ok(&chat_reply(summary_json)));

        let summary = summarizer(transport.clone(), "sk").summarize(REFERENCE).await;

        assert!(summary.is_summarized());
        assert_eq!(summary.text, summary_json);

        let body = transport.requests()[0].body.clone().unwrap();
        assert_eq!(body["messages"][0]["content"], SUMMARY_SYSTEM_PROMPT);
        assert!(body["messages"][1]["content"]
            .as_str()
            .unwrap()
            .ends_with(REFERENCE));
        assert_eq!(body["temperature"], 0.5);
        assert_eq!(body["response_format"]["type"], "json_object");
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_failure_falls_back_to_original() {
        let transport = ScriptedTransport::always(status(503));

        let summary = summarizer(transport.clone(), "sk").summarize(REFERENCE).await;

        assert_eq!(summary, ReferenceSummary::original(REFERENCE));
        assert_eq!(transport.call_count(), 5);
    }

    #[tokio::test]
    async fn test_malformed_completion_falls_back_to_original() {
        let transport = ScriptedTransport::always(ok(&chat_reply("Here is a summary: ATP.")));

        let summary = summarizer(transport, "sk").summarize(REFERENCE).await;

        assert_eq!(summary.origin, SummaryOrigin::Original);
        assert_eq!(summary.text, REFERENCE);
    }

    #[tokio::test]
    async fn test_unconfigured_falls_back_without_network() {
        let transport = ScriptedTransport::always(ok(&chat_reply("{}")));

        let summary = summarizer(transport.clone(), "").summarize(REFERENCE).await;

        assert_eq!(summary.origin, SummaryOrigin::Original);
        assert_eq!(transport.call_count(), 0);
    }
}
