use std::fmt;
use std::path::PathBuf;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::error::ParseError;

/// 参考答案：原始文档，或创建作业时已生成的摘要
#[derive(Debug, Clone, PartialEq)]
pub enum ReferenceMaterial {
    Document(PathBuf),
    Summary(String),
}

/// 一次评分请求（一份提交对一份作业）
#[derive(Debug, Clone, PartialEq)]
pub struct GradingRequest {
    pub submission_document_path: PathBuf,
    pub reference: ReferenceMaterial,
    /// 题目或作业标题
    pub question: String,
}

impl GradingRequest {
    pub fn new(
        submission_document_path: impl Into<PathBuf>,
        reference: ReferenceMaterial,
        question: impl Into<String>,
    ) -> Self {
        Self {
            submission_document_path: submission_document_path.into(),
            reference,
            question: question.into(),
        }
    }
}

/// 文本提取方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    /// 直接读取文档内嵌的文本层
    Direct,
    /// 页面渲染后 OCR
    Ocr,
}

/// 提取出的文本
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedText {
    pub source_path: PathBuf,
    pub text: String,
    pub method: ExtractionMethod,
}

/// 分数
///
/// 模型返回的非数字或越界分数原样透传，不做强制转换。
#[derive(Debug, Clone, PartialEq)]
pub enum Score {
    Numeric(f64),
    Text(String),
}

impl Score {
    fn from_json(value: &Value) -> Result<Self, ParseError> {
        match value {
            Value::Number(n) => n.as_f64().map(Score::Numeric).ok_or_else(|| {
                ParseError::InvalidField {
                    field: "score",
                    reason: format!("无法表示的数字: {}", n),
                }
            }),
            Value::String(s) => Ok(match s.trim().parse::<f64>() {
                Ok(n) if n.is_finite() => Score::Numeric(n),
                _ => Score::Text(s.clone()),
            }),
            other => Err(ParseError::InvalidField {
                field: "score",
                reason: format!("期望数字或字符串，实际为 {}", json_type(other)),
            }),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Score::Numeric(n) => Some(*n),
            Score::Text(_) => None,
        }
    }

    /// 是否在 [0, 100] 内
    pub fn is_in_expected_range(&self) -> bool {
        self.as_f64().is_some_and(|n| (0.0..=100.0).contains(&n))
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Score::Numeric(n) if n.fract() == 0.0 => write!(f, "{:.0}", n),
            Score::Numeric(n) => write!(f, "{}", n),
            Score::Text(s) => f.write_str(s),
        }
    }
}

impl Serialize for Score {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Score::Numeric(n) if n.fract() == 0.0 && n.abs() < i64::MAX as f64 => {
                serializer.serialize_i64(*n as i64)
            }
            Score::Numeric(n) => serializer.serialize_f64(*n),
            Score::Text(s) => serializer.serialize_str(s),
        }
    }
}

/// 评分结果
///
/// 只能通过 [`EvaluationResult::parse`] 从结构化响应解析得到，
/// 不存在“默认分数”的构造方式。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationResult {
    score: Score,
    remarks: String,
}

impl EvaluationResult {
    /// 解析模型补全文本，要求是带 `score` 和 `remarks` 的 JSON 对象
    ///
    /// 允许外层包裹 Markdown 代码块；多余的字段忽略。
    pub fn parse(completion: &str) -> Result<Self, ParseError> {
        let body = strip_code_fence(completion);
        if body.is_empty() {
            return Err(ParseError::MissingCompletion);
        }

        let value: Value =
            serde_json::from_str(body).map_err(|e| ParseError::MalformedJson(e.to_string()))?;
        let object = value.as_object().ok_or(ParseError::NotAnObject)?;

        let score = object
            .get("score")
            .ok_or(ParseError::MissingField("score"))
            .and_then(Score::from_json)?;

        let remarks = match object.get("remarks") {
            None => return Err(ParseError::MissingField("remarks")),
            Some(Value::String(s)) => s.clone(),
            Some(other) => {
                return Err(ParseError::InvalidField {
                    field: "remarks",
                    reason: format!("期望字符串，实际为 {}", json_type(other)),
                })
            }
        };

        Ok(Self { score, remarks })
    }

    pub fn score(&self) -> &Score {
        &self.score
    }

    pub fn remarks(&self) -> &str {
        &self.remarks
    }
}

/// 去掉 ```json ... ``` 代码块包装
pub(crate) fn strip_code_fence(text: &str) -> &str {
    static FENCE: OnceLock<Option<Regex>> = OnceLock::new();
    let trimmed = text.trim();
    let fence = FENCE.get_or_init(|| Regex::new(r"(?s)^```[A-Za-z0-9_-]*\s*(.*?)\s*```$").ok());

    fence
        .as_ref()
        .and_then(|re| re.captures(trimmed))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .unwrap_or(trimmed)
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "布尔值",
        Value::Number(_) => "数字",
        Value::String(_) => "字符串",
        Value::Array(_) => "数组",
        Value::Object(_) => "对象",
    }
}
