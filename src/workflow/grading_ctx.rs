//! 评分上下文
//!
//! 封装"我正在给哪份作业的哪份提交评分"这一信息

use std::fmt::Display;

/// 评分上下文
#[derive(Debug, Clone)]
pub struct GradingCtx {
    /// 提交 ID（写入结果时使用）
    pub submission_id: String,

    /// 作业标题
    pub assignment_title: String,

    pub student_username: String,

    /// 评分完成通知的收件人
    pub student_email: String,
}

impl GradingCtx {
    pub fn new(
        submission_id: impl Into<String>,
        assignment_title: impl Into<String>,
        student_username: impl Into<String>,
        student_email: impl Into<String>,
    ) -> Self {
        Self {
            submission_id: submission_id.into(),
            assignment_title: assignment_title.into(),
            student_username: student_username.into(),
            student_email: student_email.into(),
        }
    }
}

impl Display for GradingCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[提交 {}]", self.submission_id)
    }
}
