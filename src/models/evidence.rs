//! 评分证据：提交给推理后端的一组有类型的内容块

use base64::{engine::general_purpose, Engine};
use serde::Serialize;

/// 单个内容块
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EvidenceBlock {
    Text {
        text: String,
    },
    /// base64 编码的图片
    Image {
        mime_type: String,
        data: String,
    },
}

impl EvidenceBlock {
    pub fn text(text: impl Into<String>) -> Self {
        EvidenceBlock::Text { text: text.into() }
    }

    pub fn image(mime_type: impl Into<String>, bytes: &[u8]) -> Self {
        EvidenceBlock::Image {
            mime_type: mime_type.into(),
            data: general_purpose::STANDARD.encode(bytes),
        }
    }

    pub fn jpeg(bytes: &[u8]) -> Self {
        Self::image("image/jpeg", bytes)
    }

    pub fn is_image(&self) -> bool {
        matches!(self, EvidenceBlock::Image { .. })
    }

    /// `data:` URL 形式（chat/completions 的 image_url 需要）
    pub fn data_url(&self) -> Option<String> {
        match self {
            EvidenceBlock::Image { mime_type, data } => {
                Some(format!("data:{};base64,{}", mime_type, data))
            }
            EvidenceBlock::Text { .. } => None,
        }
    }
}
