use std::path::PathBuf;

use serde::Deserialize;

use crate::models::grading::{GradingRequest, ReferenceMaterial};
use crate::models::notification::NewAssignmentPayload;

/// 批量评分清单（TOML）
#[derive(Debug, Clone, Deserialize)]
pub struct GradingManifest {
    #[serde(default)]
    pub assignments: Vec<AssignmentEntry>,
    #[serde(skip)]
    pub file_path: Option<String>,
}

impl GradingManifest {
    pub fn submission_count(&self) -> usize {
        self.assignments.iter().map(|a| a.submissions.len()).sum()
    }
}

/// 一份作业及其提交
#[derive(Debug, Clone, Deserialize)]
pub struct AssignmentEntry {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub class_name: String,
    #[serde(default, deserialize_with = "deserialize_id")]
    pub due_date: String,
    pub reference_path: PathBuf,
    /// 已有的参考答案摘要，存在时评分跳过参考文档提取
    #[serde(default)]
    pub reference_summary: Option<String>,
    /// 是否在准备阶段生成摘要
    #[serde(default)]
    pub summarize_reference: bool,
    /// 是否发送新作业通知
    #[serde(default)]
    pub announce: bool,
    /// 新作业通知的收件人，缺省时取所有提交者邮箱
    #[serde(default)]
    pub recipient_emails: Option<Vec<String>>,
    #[serde(default)]
    pub submissions: Vec<SubmissionEntry>,
}

impl AssignmentEntry {
    pub fn reference_material(&self) -> ReferenceMaterial {
        match &self.reference_summary {
            Some(summary) if !summary.trim().is_empty() => {
                ReferenceMaterial::Summary(summary.clone())
            }
            _ => ReferenceMaterial::Document(self.reference_path.clone()),
        }
    }

    pub fn grading_request(&self, submission: &SubmissionEntry) -> GradingRequest {
        GradingRequest::new(
            submission.file_path.clone(),
            self.reference_material(),
            self.title.clone(),
        )
    }

    pub fn announcement(&self) -> NewAssignmentPayload {
        let recipient_emails = self.recipient_emails.clone().unwrap_or_else(|| {
            self.submissions
                .iter()
                .filter(|s| !s.student_email.is_empty())
                .map(|s| s.student_email.clone())
                .collect()
        });

        NewAssignmentPayload {
            title: self.title.clone(),
            subject: self.subject.clone(),
            class_name: self.class_name.clone(),
            due_date: self.due_date.clone(),
            recipient_emails,
        }
    }
}

/// 一份学生提交
#[derive(Debug, Clone, Deserialize)]
pub struct SubmissionEntry {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    #[serde(default)]
    pub student_username: String,
    #[serde(default)]
    pub student_email: String,
    pub file_path: PathBuf,
}

// id 和日期既可以写成字符串也可以写成整数 / TOML 日期
fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Visitor;
    use std::fmt;

    struct IdVisitor;

    impl<'de> Visitor<'de> for IdVisitor {
        type Value = String;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a string, integer or date")
        }

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(value.to_string())
        }

        fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(value.to_string())
        }

        fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(value.to_string())
        }

        // TOML 日期以单键 map 的形式出现
        fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
        where
            A: serde::de::MapAccess<'de>,
        {
            match map.next_entry::<String, String>()? {
                Some((_, value)) => Ok(value),
                None => Err(serde::de::Error::custom("空的日期值")),
            }
        }
    }

    deserializer.deserialize_any(IdVisitor)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"
[[assignments]]
id = 7
title = "Cell Biology"
subject = "Biology"
class_name = "BIO-101"
due_date = "2025-06-01"
reference_path = "assignments/7/reference.pdf"
announce = true

[[assignments.submissions]]
id = "s-1"
student_username = "alice"
student_email = "alice@example.com"
file_path = "submissions/7/alice.pdf"

[[assignments.submissions]]
id = 2
student_username = "bob"
file_path = "submissions/7/bob.docx"

[[assignments]]
id = "8"
title = "Essay"
reference_path = "assignments/8/reference.docx"
reference_summary = "{\"key_points\": [\"thesis\"]}"
"#;

    #[test]
    fn test_manifest_parses_ids_and_dates() {
        let manifest: GradingManifest = toml::from_str(MANIFEST).unwrap();

        assert_eq!(manifest.assignments.len(), 2);
        assert_eq!(manifest.submission_count(), 2);

        let first = &manifest.assignments[0];
        assert_eq!(first.id, "7");
        assert_eq!(first.due_date, "2025-06-01");
        assert_eq!(first.submissions[1].id, "2");
        assert!(first.announce);
        assert!(!first.summarize_reference);
    }

    #[test]
    fn test_reference_material_prefers_summary() {
        let manifest: GradingManifest = toml::from_str(MANIFEST).unwrap();

        assert_eq!(
            manifest.assignments[0].reference_material(),
            ReferenceMaterial::Document(PathBuf::from("assignments/7/reference.pdf"))
        );
        assert!(matches!(
            manifest.assignments[1].reference_material(),
            ReferenceMaterial::Summary(_)
        ));
    }

    #[test]
    fn test_announcement_defaults_to_submitter_emails() {
        let manifest: GradingManifest = toml::from_str(MANIFEST).unwrap();
        let payload = manifest.assignments[0].announcement();

        assert_eq!(payload.recipient_emails, vec!["alice@example.com".to_string()]);
        assert_eq!(payload.class_name, "BIO-101");
    }
}
