//! 评分服务 - 业务能力层
//!
//! 只负责"把证据交给模型，拿回分数和评语"：
//! - 用固定模板组装提示词（题目、参考答案、学生答案）
//! - 以 JSON 结构化模式调用推理后端
//! - 严格解析 `score` / `remarks`，解析失败直接报错，不给默认分
//!
//! 证据是一组有类型的内容块（文本或 base64 图片），
//! 纯文本作答和扫描件作答走同一个接口。

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::clients::inference::{InferenceClient, InferencePrompt};
use crate::error::EvaluationError;
use crate::models::evidence::EvidenceBlock;
use crate::models::grading::EvaluationResult;

/// 组装评分指令（不含学生答案）
pub fn grading_instructions(question: &str, reference_text: &str) -> String {
    format!(
        "You are an experienced teacher grading a student's submission.\n\n\
Question / assignment: {question}\n\n\
Reference answer:\n{reference_text}\n\n\
Compare the student's answer below with the reference answer and:\n\
(a) assign a numeric score between 0 and 100;\n\
(b) write 1-2 sentences of constructive feedback for the student.\n\n\
Respond only with a JSON object containing exactly two fields: \
\"score\" (a number) and \"remarks\" (a string)."
    )
}

/// 文本作答的证据
pub fn grading_evidence(
    question: &str,
    reference_text: &str,
    student_text: &str,
) -> Vec<EvidenceBlock> {
    vec![
        EvidenceBlock::text(grading_instructions(question, reference_text)),
        EvidenceBlock::text(format!("Student answer:\n{}", student_text)),
    ]
}

/// 图片作答的证据（例如手写扫描件的页面）
pub fn image_grading_evidence(
    question: &str,
    reference_text: &str,
    pages: impl IntoIterator<Item = EvidenceBlock>,
) -> Vec<EvidenceBlock> {
    let mut evidence = vec![
        EvidenceBlock::text(grading_instructions(question, reference_text)),
        EvidenceBlock::text("Student answer (scanned pages follow):"),
    ];
    evidence.extend(pages);
    evidence
}

#[async_trait]
pub trait Evaluator: Send + Sync {
    /// 对任意证据评分
    async fn evaluate_evidence(
        &self,
        evidence: Vec<EvidenceBlock>,
    ) -> Result<EvaluationResult, EvaluationError>;

    /// 对文本作答评分
    async fn evaluate(
        &self,
        question: &str,
        reference_text: &str,
        student_text: &str,
    ) -> Result<EvaluationResult, EvaluationError> {
        self.evaluate_evidence(grading_evidence(question, reference_text, student_text))
            .await
    }
}

/// 评分客户端
pub struct EvaluationClient {
    client: InferenceClient,
}

impl EvaluationClient {
    pub fn new(client: InferenceClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Evaluator for EvaluationClient {
    async fn evaluate_evidence(
        &self,
        evidence: Vec<EvidenceBlock>,
    ) -> Result<EvaluationResult, EvaluationError> {
        let images = evidence.iter().filter(|b| b.is_image()).count();
        debug!(
            "提交评分: {} 个内容块（图片 {} 个），后端 {}",
            evidence.len(),
            images,
            self.client.backend_name()
        );

        let prompt = InferencePrompt::new(evidence).structured();
        let completion = self.client.complete(&prompt).await?;

        let result = EvaluationResult::parse(&completion).map_err(|e| {
            warn!("评分结果解析失败: {}，原始内容: {}", e, completion);
            e
        })?;

        if !result.score().is_in_expected_range() {
            warn!(
                "⚠️ 模型返回的分数不在 0-100 范围内，原样保留: {}",
                result.score()
            );
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use tokio_test::assert_err;

    use super::*;
    use crate::clients::http_client::testing::{ok, status, ScriptedTransport};
    use crate::clients::http_client::{RetryPolicy, RetryingHttpClient};
    use crate::clients::inference::{GeminiBackend, InferenceBackend};
    use crate::error::{ErrorKind, ParseError};
    use crate::models::grading::Score;

    fn gemini_reply(text: &str) -> String {
        serde_json::json!({
            "candidates": [{ "content": { "parts": [{ "text": text }] } }]
        })
        .to_string()
    }

    fn evaluator(transport: Arc<ScriptedTransport>) -> EvaluationClient {
        let backend = InferenceBackend::Gemini(GeminiBackend {
            api_key: "k".to_string(),
            api_url: "https://gemini.example.com/generate".to_string(),
            max_output_tokens: 2048,
        });
        EvaluationClient::new(InferenceClient::new(
            backend,
            RetryingHttpClient::new(transport, RetryPolicy::default()),
            Duration::from_secs(120),
        ))
    }

    #[tokio::test]
    async fn test_evaluate_returns_exact_score_and_remarks() {
        let transport = ScriptedTransport::always(ok(&gemini_reply(
            r#"{"score": 72, "remarks": "Correct general idea but missing mechanism detail."}"#,
        )));

        let result = evaluator(transport.clone())
            .evaluate(
                "Cell respiration",
                "Mitochondria generate ATP via oxidative phosphorylation.",
                "The mitochondria is the powerhouse of the cell.",
            )
            .await
            .unwrap();

        assert_eq!(result.score(), &Score::Numeric(72.0));
        assert_eq!(
            result.remarks(),
            "Correct general idea but missing mechanism detail."
        );

        let body = transport.requests()[0].body.clone().unwrap();
        let parts = &body["contents"][0]["parts"];
        assert!(parts[0]["text"]
            .as_str()
            .unwrap()
            .contains("Mitochondria generate ATP"));
        assert!(parts[1]["text"]
            .as_str()
            .unwrap()
            .contains("powerhouse of the cell"));
        assert_eq!(
            body["generationConfig"]["responseMimeType"],
            "application/json"
        );
    }

    #[tokio::test]
    async fn test_missing_score_is_parse_failure() {
        let transport =
            ScriptedTransport::always(ok(&gemini_reply(r#"{"remarks": "Well argued."}"#)));

        let err = assert_err!(evaluator(transport).evaluate("q", "r", "s").await);

        assert_eq!(err.kind(), ErrorKind::ParseFailure);
        assert!(matches!(
            err,
            EvaluationError::Parse(ParseError::MissingField("score"))
        ));
    }

    #[tokio::test]
    async fn test_out_of_range_score_passes_through() {
        let transport = ScriptedTransport::always(ok(&gemini_reply(
            r#"{"score": "A-", "remarks": "Strong."}"#,
        )));

        let result = evaluator(transport).evaluate("q", "r", "s").await.unwrap();

        assert_eq!(result.score(), &Score::Text("A-".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_backend_unreachable_is_transport_failure() {
        let transport = ScriptedTransport::always(status(500));

        let err = evaluator(transport.clone())
            .evaluate("q", "r", "s")
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::TransportFailure);
        assert_eq!(transport.call_count(), 5);
    }

    #[tokio::test]
    async fn test_image_evidence_is_sent_as_inline_data() {
        let transport = ScriptedTransport::always(ok(&gemini_reply(
            r#"{"score": 55, "remarks": "Partially legible."}"#,
        )));

        let evidence = image_grading_evidence("q", "r", vec![EvidenceBlock::jpeg(b"\xFF\xD8")]);
        evaluator(transport.clone())
            .evaluate_evidence(evidence)
            .await
            .unwrap();

        let body = transport.requests()[0].body.clone().unwrap();
        assert_eq!(
            body["contents"][0]["parts"][2]["inlineData"]["mimeType"],
            "image/jpeg"
        );
    }
}
