//! 推理后端客户端
//!
//! 两种后端共用同一个入口 [`InferenceClient::complete`]：
//! - Gemini generateContent（API key 走 query 参数 `key`）
//! - OpenAI 兼容的 chat/completions（DeepSeek 等，Bearer 认证）
//!
//! 请求体在本模块构建，重试统一交给 [`RetryingHttpClient`]。

use std::sync::Arc;
use std::time::Duration;

use async_openai::types::chat::{
    ChatCompletionRequestMessage, ChatCompletionRequestMessageContentPartImage,
    ChatCompletionRequestMessageContentPartText, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestUserMessageArgs, ChatCompletionRequestUserMessageContent,
    ChatCompletionRequestUserMessageContentPart, CreateChatCompletionRequestArgs, ImageDetail,
    ImageUrl,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::clients::http_client::{HttpRequest, HttpResponse, HttpTransport, RetryingHttpClient};
use crate::config::{BackendKind, Config};
use crate::error::{HttpError, InferenceError, ParseError};
use crate::models::evidence::EvidenceBlock;

/// 一次推理调用的输入
#[derive(Debug, Clone, Default)]
pub struct InferencePrompt {
    /// 系统指令（Gemini 下作为第一个文本 part）
    pub system: Option<String>,
    pub blocks: Vec<EvidenceBlock>,
    /// 是否要求 JSON 结构化输出
    pub structured: bool,
    pub temperature: Option<f32>,
}

impl InferencePrompt {
    pub fn new(blocks: Vec<EvidenceBlock>) -> Self {
        Self {
            blocks,
            ..Default::default()
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn structured(mut self) -> Self {
        self.structured = true;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

// ========== Gemini ==========

const SAFETY_CATEGORIES: [&str; 4] = [
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];

#[derive(Debug, Clone)]
pub struct GeminiBackend {
    pub api_key: String,
    pub api_url: String,
    pub max_output_tokens: u32,
}

impl GeminiBackend {
    pub fn from_config(config: &Config) -> Self {
        Self {
            api_key: config.gemini_api_key.clone(),
            api_url: config.gemini_api_url.clone(),
            max_output_tokens: config.gemini_max_output_tokens,
        }
    }

    fn build_request(&self, prompt: &InferencePrompt) -> Result<HttpRequest, InferenceError> {
        let mut parts = Vec::with_capacity(prompt.blocks.len() + 1);
        if let Some(system) = &prompt.system {
            parts.push(json!({ "text": system }));
        }
        for block in &prompt.blocks {
            parts.push(match block {
                EvidenceBlock::Text { text } => json!({ "text": text }),
                EvidenceBlock::Image { mime_type, data } => json!({
                    "inlineData": { "mimeType": mime_type, "data": data }
                }),
            });
        }

        let mut generation_config = json!({
            "candidateCount": 1,
            "maxOutputTokens": self.max_output_tokens,
        });
        if prompt.structured {
            generation_config["responseMimeType"] = json!("application/json");
        }
        if let Some(temperature) = prompt.temperature {
            generation_config["temperature"] = json!(temperature);
        }

        let safety_settings: Vec<Value> = SAFETY_CATEGORIES
            .iter()
            .map(|category| json!({ "category": category, "threshold": "BLOCK_NONE" }))
            .collect();

        let body = json!({
            "contents": [{ "parts": parts }],
            "generationConfig": generation_config,
            "safetySettings": safety_settings,
        });

        Ok(HttpRequest::post_json(&self.api_url, body).with_query("key", &self.api_key))
    }

    fn completion_text(&self, response: &HttpResponse) -> Result<String, ParseError> {
        let value: Value = response
            .json()
            .map_err(|e| ParseError::MalformedBody(e.to_string()))?;

        value
            .pointer("/candidates/0/content/parts/0/text")
            .and_then(Value::as_str)
            .filter(|text| !text.trim().is_empty())
            .map(str::to_string)
            .ok_or(ParseError::MissingCompletion)
    }
}

// ========== chat/completions ==========

#[derive(Debug, Clone)]
pub struct ChatCompletionsBackend {
    pub api_key: String,
    pub api_url: String,
    pub model: String,
}

#[derive(Deserialize)]
struct ChatCompletionBody {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

impl ChatCompletionsBackend {
    pub fn from_config(config: &Config) -> Self {
        Self {
            api_key: config.deepseek_api_key.clone(),
            api_url: config.deepseek_api_url.clone(),
            model: config.deepseek_model.clone(),
        }
    }

    fn build_request(&self, prompt: &InferencePrompt) -> Result<HttpRequest, InferenceError> {
        let build_err = |e: async_openai::error::OpenAIError| InferenceError::Request(e.to_string());
        let mut messages = Vec::new();

        if let Some(system) = &prompt.system {
            let system_msg = ChatCompletionRequestSystemMessageArgs::default()
                .content(system.as_str())
                .build()
                .map_err(build_err)?;
            messages.push(ChatCompletionRequestMessage::System(system_msg));
        }

        let has_images = prompt.blocks.iter().any(EvidenceBlock::is_image);
        let user_msg = if has_images {
            // 有图片时使用多部分内容
            let parts: Vec<ChatCompletionRequestUserMessageContentPart> = prompt
                .blocks
                .iter()
                .map(|block| match block {
                    EvidenceBlock::Text { text } => {
                        ChatCompletionRequestUserMessageContentPart::Text(
                            ChatCompletionRequestMessageContentPartText { text: text.clone() },
                        )
                    }
                    EvidenceBlock::Image { .. } => {
                        ChatCompletionRequestUserMessageContentPart::ImageUrl(
                            ChatCompletionRequestMessageContentPartImage {
                                image_url: ImageUrl {
                                    url: block.data_url().unwrap_or_default(),
                                    detail: Some(ImageDetail::Auto),
                                },
                            },
                        )
                    }
                })
                .collect();

            ChatCompletionRequestUserMessageArgs::default()
                .content(ChatCompletionRequestUserMessageContent::Array(parts))
                .build()
                .map_err(build_err)?
        } else {
            let text = prompt
                .blocks
                .iter()
                .filter_map(|block| match block {
                    EvidenceBlock::Text { text } => Some(text.as_str()),
                    EvidenceBlock::Image { .. } => None,
                })
                .collect::<Vec<_>>()
                .join("\n\n");

            ChatCompletionRequestUserMessageArgs::default()
                .content(text)
                .build()
                .map_err(build_err)?
        };
        messages.push(ChatCompletionRequestMessage::User(user_msg));

        let mut builder = CreateChatCompletionRequestArgs::default();
        builder.model(&self.model).messages(messages);
        if let Some(temperature) = prompt.temperature {
            builder.temperature(temperature);
        }
        let request = builder.build().map_err(build_err)?;

        let mut body =
            serde_json::to_value(&request).map_err(|e| InferenceError::Request(e.to_string()))?;
        if prompt.structured {
            if let Some(object) = body.as_object_mut() {
                object.insert(
                    "response_format".to_string(),
                    json!({ "type": "json_object" }),
                );
            }
        }

        Ok(HttpRequest::post_json(&self.api_url, body).with_bearer(&self.api_key))
    }

    fn completion_text(&self, response: &HttpResponse) -> Result<String, ParseError> {
        let body: ChatCompletionBody = response
            .json()
            .map_err(|e| ParseError::MalformedBody(e.to_string()))?;

        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|text| !text.trim().is_empty())
            .ok_or(ParseError::MissingCompletion)
    }
}

// ========== 统一入口 ==========

#[derive(Debug, Clone)]
pub enum InferenceBackend {
    Gemini(GeminiBackend),
    ChatCompletions(ChatCompletionsBackend),
}

impl InferenceBackend {
    pub fn from_config(config: &Config, kind: BackendKind) -> Self {
        match kind {
            BackendKind::Gemini => InferenceBackend::Gemini(GeminiBackend::from_config(config)),
            BackendKind::ChatCompletions => {
                InferenceBackend::ChatCompletions(ChatCompletionsBackend::from_config(config))
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            InferenceBackend::Gemini(_) => "Gemini",
            InferenceBackend::ChatCompletions(_) => "ChatCompletions",
        }
    }

    /// 密钥或端点为空时直接失败，不发请求
    fn ensure_configured(&self) -> Result<(), HttpError> {
        let (key, url, prefix) = match self {
            InferenceBackend::Gemini(b) => (&b.api_key, &b.api_url, "GEMINI"),
            InferenceBackend::ChatCompletions(b) => (&b.api_key, &b.api_url, "DEEPSEEK"),
        };
        if key.trim().is_empty() {
            return Err(HttpError::unconfigured(format!("{}_API_KEY", prefix)));
        }
        if url.trim().is_empty() {
            return Err(HttpError::unconfigured(format!("{}_API_URL", prefix)));
        }
        Ok(())
    }

    fn build_request(&self, prompt: &InferencePrompt) -> Result<HttpRequest, InferenceError> {
        match self {
            InferenceBackend::Gemini(b) => b.build_request(prompt),
            InferenceBackend::ChatCompletions(b) => b.build_request(prompt),
        }
    }

    fn completion_text(&self, response: &HttpResponse) -> Result<String, ParseError> {
        match self {
            InferenceBackend::Gemini(b) => b.completion_text(response),
            InferenceBackend::ChatCompletions(b) => b.completion_text(response),
        }
    }
}

/// 推理客户端
#[derive(Clone)]
pub struct InferenceClient {
    backend: InferenceBackend,
    http: RetryingHttpClient,
    timeout: Duration,
}

impl InferenceClient {
    pub fn new(backend: InferenceBackend, http: RetryingHttpClient, timeout: Duration) -> Self {
        Self {
            backend,
            http,
            timeout,
        }
    }

    /// 按配置选择后端，使用推理重试策略
    pub fn from_config(
        config: &Config,
        kind: BackendKind,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        Self::new(
            InferenceBackend::from_config(config, kind),
            RetryingHttpClient::new(transport, config.inference_retry.clone()),
            config.inference_timeout,
        )
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// 发送一次推理请求，返回模型的补全文本
    pub async fn complete(&self, prompt: &InferencePrompt) -> Result<String, InferenceError> {
        self.backend.ensure_configured()?;

        let request = self.backend.build_request(prompt)?.with_timeout(self.timeout);
        debug!(
            "调用 {} 后端: {} 个内容块, 结构化输出: {}",
            self.backend.name(),
            prompt.blocks.len(),
            prompt.structured
        );

        let response = self.http.call(&request).await?;
        let text = self.backend.completion_text(&response)?;

        debug!("{} 返回 {} 字符", self.backend.name(), text.chars().count());
        Ok(text)
    }
}
