//! 评分结果写入服务 - 业务能力层
//!
//! 只负责"把一条评分结果追加到结果文件"，不关心流程

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Local};
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

use crate::models::grading::{EvaluationResult, Score};

/// 持久化回调
///
/// 评分成功后、发送通知前调用；失败会让整个评分请求失败。
#[async_trait]
pub trait EvaluationRecorder: Send + Sync {
    async fn record_evaluation(
        &self,
        submission_id: &str,
        result: &EvaluationResult,
        graded_at: DateTime<Local>,
    ) -> Result<()>;
}

#[derive(Serialize)]
struct GradeRecord<'a> {
    submission_id: &'a str,
    score: &'a Score,
    remarks: &'a str,
    graded_at: String,
}

/// JSONL 结果写入器
///
/// 每条评分结果一行，多个评分任务并发写入时串行化。
pub struct ResultWriter {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl ResultWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl EvaluationRecorder for ResultWriter {
    async fn record_evaluation(
        &self,
        submission_id: &str,
        result: &EvaluationResult,
        graded_at: DateTime<Local>,
    ) -> Result<()> {
        let record = GradeRecord {
            submission_id,
            score: result.score(),
            remarks: result.remarks(),
            graded_at: graded_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        };
        let mut line = serde_json::to_string(&record)?;
        line.push('\n');

        debug!(
            "写入评分结果: 提交 {} | 分数 {} | {}",
            submission_id,
            result.score(),
            self.path.display()
        );

        let _guard = self.write_lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("无法打开结果文件: {}", self.path.display()))?;

        file.write_all(line.as_bytes())
            .await
            .with_context(|| format!("无法写入结果文件: {}", self.path.display()))?;
        file.flush().await?;

        Ok(())
    }
}
