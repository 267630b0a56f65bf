//! OCR 服务 - 业务能力层
//!
//! 只负责"把一页图片转成文字"，由视觉模型完成识别。

use async_trait::async_trait;
use tracing::debug;

use crate::clients::inference::{InferenceClient, InferencePrompt};
use crate::error::{InferenceError, OcrError, ParseError};
use crate::infrastructure::PageImage;
use crate::models::evidence::EvidenceBlock;

const TRANSCRIBE_INSTRUCTION: &str = "Transcribe all text on this page exactly as written, \
including handwriting. Preserve the reading order. Return only the transcribed text, \
without commentary or formatting.";

#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// 识别单页文字；空白页返回空字符串
    async fn recognize(&self, page: &PageImage) -> Result<String, OcrError>;
}

/// 基于视觉模型的 OCR
pub struct VisionOcr {
    client: InferenceClient,
}

impl VisionOcr {
    pub fn new(client: InferenceClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl OcrEngine for VisionOcr {
    async fn recognize(&self, page: &PageImage) -> Result<String, OcrError> {
        let prompt = InferencePrompt::new(vec![
            EvidenceBlock::text(TRANSCRIBE_INSTRUCTION),
            page.to_evidence(),
        ]);

        match self.client.complete(&prompt).await {
            Ok(text) => Ok(text),
            Err(InferenceError::Parse(ParseError::MissingCompletion)) => {
                debug!("第 {} 页 OCR 没有返回文本，按空白页处理", page.page_number);
                Ok(String::new())
            }
            Err(e) => Err(e.into()),
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
    use crate::clients::inference::{GeminiBackend, InferenceBackend};
    use crate::error::ErrorKind;

    fn ocr(transport: Arc<ScriptedTransport>) -> VisionOcr {
        let backend = InferenceBackend::Gemini(GeminiBackend {
            api_key: "k".to_string(),
            api_url: "https://gemini.example.com/generate".to_string(),
            max_output_tokens: 2048,
        });
        let policy = RetryPolicy::new(Duration::from_millis(10), Duration::from_millis(10), 2);
        VisionOcr::new(InferenceClient::new(
            backend,
            RetryingHttpClient::new(transport, policy),
            Duration::from_secs(60),
        ))
    }

    #[tokio::test]
    async fn test_recognize_sends_page_image() {
        let transport = ScriptedTransport::always(ok(
            r#"{"candidates":[{"content":{"parts":[{"text":"Photosynthesis makes sugar."}]}}]}"#,
        ));

        let text = ocr(transport.clone())
            .recognize(&PageImage::jpeg(1, vec![0xFF, 0xD8]))
            .await
            .unwrap();

        assert_eq!(text, "Photosynthesis makes sugar.");
        let body = transport.requests()[0].body.clone().unwrap();
        assert_eq!(
            body["contents"][0]["parts"][1]["inlineData"]["mimeType"],
            "image/jpeg"
        );
        assert!(body["generationConfig"].get("responseMimeType").is_none());
    }

    #[tokio::test]
    async fn test_blank_page_yields_empty_text() {
        let transport = ScriptedTransport::always(ok(r#"{"candidates":[]}"#));

        let text = ocr(transport)
            .recognize(&PageImage::jpeg(2, vec![0xFF, 0xD8]))
            .await
            .unwrap();

        assert!(text.is_empty());
    }

    #[tokio::test]
    async fn test_transport_failure_propagates() {
        let transport = ScriptedTransport::always(status(503));

        let err = ocr(transport.clone())
            .recognize(&PageImage::jpeg(1, vec![0xFF]))
            .await
            .unwrap_err();

        let OcrError::Inference(inner) = err;
        assert_eq!(inner.kind(), ErrorKind::TransportFailure);
        assert_eq!(transport.call_count(), 2);
    }
}
