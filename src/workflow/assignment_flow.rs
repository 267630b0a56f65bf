//! 作业准备流程 - 流程层
//!
//! 每份作业在评分前执行一次：
//! 1. 已有摘要 → 直接使用
//! 2. 需要摘要 → 提取参考答案 → 生成摘要（失败回退原文）→ 保存 `<参考文件>.summary.json`
//!    参考答案提取失败时不生成摘要，评分时再按原文档提取
//! 3. 需要公告 → 发送 new_assignment 通知（与摘要结果无关，失败不影响准备结果）

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use crate::error::ExtractionError;
use crate::infrastructure::DocumentStore;
use crate::models::grading::ReferenceMaterial;
use crate::models::manifest::AssignmentEntry;
use crate::models::notification::NotificationEvent;
use crate::services::{
    NotificationSink, NotifyOutcome, ReferenceSummarizer, ReferenceSummary, TextExtractor,
};

/// 准备好的作业
#[derive(Debug, Clone)]
pub struct PreparedAssignment {
    /// 评分时使用的参考答案
    pub reference: ReferenceMaterial,
    /// 本次生成的摘要（未要求摘要或参考答案提取失败时为 None）
    pub summary: Option<ReferenceSummary>,
    /// 新作业通知结果（未要求公告时为 None）
    pub announcement: Option<NotifyOutcome>,
}

pub struct AssignmentFlow {
    extractor: Arc<dyn TextExtractor>,
    summarizer: Arc<ReferenceSummarizer>,
    store: Arc<dyn DocumentStore>,
    notifier: Arc<dyn NotificationSink>,
}

impl AssignmentFlow {
    pub fn new(
        extractor: Arc<dyn TextExtractor>,
        summarizer: Arc<ReferenceSummarizer>,
        store: Arc<dyn DocumentStore>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            extractor,
            summarizer,
            store,
            notifier,
        }
    }

    /// 准备作业，从不失败：摘要和公告都是尽力而为
    pub async fn prepare(&self, assignment: &AssignmentEntry) -> PreparedAssignment {
        let tag = format!("[作业 {}]", assignment.id);

        let needs_summary = assignment.summarize_reference
            && !matches!(assignment.reference_material(), ReferenceMaterial::Summary(_));
        let summary = if needs_summary {
            match self.summarize(&tag, &assignment.reference_path).await {
                Ok(summary) => Some(summary),
                Err(e) => {
                    warn!("{} ⚠️ 参考答案提取失败，跳过摘要: {}", tag, e);
                    None
                }
            }
        } else {
            None
        };
        let reference = match &summary {
            Some(summary) => ReferenceMaterial::Summary(summary.text.clone()),
            None => assignment.reference_material(),
        };

        let announcement = if assignment.announce {
            let outcome = self
                .notifier
                .notify(NotificationEvent::NewAssignment(assignment.announcement()))
                .await;
            if !outcome.success {
                warn!("{} ⚠️ 新作业通知未送达: {}", tag, outcome.detail);
            }
            Some(outcome)
        } else {
            None
        };

        PreparedAssignment {
            reference,
            summary,
            announcement,
        }
    }

    async fn summarize(
        &self,
        tag: &str,
        reference_path: &Path,
    ) -> Result<ReferenceSummary, ExtractionError> {
        info!("{} 📝 提取并摘要参考答案: {}", tag, reference_path.display());
        let extracted = self.extractor.extract(reference_path).await?;
        let summary = self.summarizer.summarize(&extracted.text).await;

        if summary.is_summarized() {
            let target = summary_path(reference_path);
            match self
                .store
                .save_file(&target, summary.text.as_bytes())
                .await
            {
                Ok(()) => info!("{} 💾 摘要已保存: {}", tag, target.display()),
                Err(e) => warn!("{} ⚠️ 摘要保存失败 {}: {}", tag, target.display(), e),
            }
        } else {
            warn!("{} ⚠️ 摘要不可用，评分时使用参考答案原文", tag);
        }

        Ok(summary)
    }
}

/// `<参考文件>.summary.json`
pub fn summary_path(reference_path: &Path) -> PathBuf {
    let mut name = OsString::from(reference_path.as_os_str());
    name.push(".summary.json");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_path_appends_suffix() {
        assert_eq!(
            summary_path(Path::new("assignments/7/reference.pdf")),
            PathBuf::from("assignments/7/reference.pdf.summary.json")
        );
    }
}
