use std::fmt;

use serde::Serialize;
use serde_json::Value;

use crate::models::grading::{EvaluationResult, Score};

/// 通知事件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    NewAssignment,
    EvaluationComplete,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::NewAssignment => "new_assignment",
            EventType::EvaluationComplete => "evaluation_complete",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 新作业发布
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewAssignmentPayload {
    pub title: String,
    pub subject: String,
    pub class_name: String,
    pub due_date: String,
    pub recipient_emails: Vec<String>,
}

/// 评分完成
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationCompletePayload {
    pub email: String,
    pub username: String,
    pub assignment_title: String,
    pub score: Score,
    pub remarks: String,
}

impl EvaluationCompletePayload {
    pub fn new(
        email: impl Into<String>,
        username: impl Into<String>,
        assignment_title: impl Into<String>,
        result: &EvaluationResult,
    ) -> Self {
        Self {
            email: email.into(),
            username: username.into(),
            assignment_title: assignment_title.into(),
            score: result.score().clone(),
            remarks: result.remarks().to_string(),
        }
    }
}

/// 通知事件，只被通知器消费一次
#[derive(Debug, Clone, PartialEq)]
pub enum NotificationEvent {
    NewAssignment(NewAssignmentPayload),
    EvaluationComplete(EvaluationCompletePayload),
}

impl NotificationEvent {
    pub fn event_type(&self) -> EventType {
        match self {
            NotificationEvent::NewAssignment(_) => EventType::NewAssignment,
            NotificationEvent::EvaluationComplete(_) => EventType::EvaluationComplete,
        }
    }

    /// webhook 请求体
    pub fn payload(&self) -> Result<Value, serde_json::Error> {
        match self {
            NotificationEvent::NewAssignment(p) => serde_json::to_value(p),
            NotificationEvent::EvaluationComplete(p) => serde_json::to_value(p),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_evaluation_complete_payload_shape() {
        let result =
            EvaluationResult::parse(r#"{"score": 88, "remarks": "Clear and complete."}"#).unwrap();
        let event = NotificationEvent::EvaluationComplete(EvaluationCompletePayload::new(
            "student@example.com",
            "student1",
            "Photosynthesis",
            &result,
        ));

        assert_eq!(event.event_type(), EventType::EvaluationComplete);
        assert_eq!(
            event.payload().unwrap(),
            json!({
                "email": "student@example.com",
                "username": "student1",
                "assignment_title": "Photosynthesis",
                "score": 88,
                "remarks": "Clear and complete."
            })
        );
    }

    #[test]
    fn test_event_type_wire_names() {
        assert_eq!(EventType::NewAssignment.to_string(), "new_assignment");
        assert_eq!(
            serde_json::to_value(EventType::EvaluationComplete).unwrap(),
            json!("evaluation_complete")
        );
    }
}
