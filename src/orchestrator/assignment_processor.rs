//! 单份作业处理器 - 编排层
//!
//! ## 职责
//!
//! 本模块负责处理单份作业的所有提交，是作业级别的编排器。
//!
//! ## 核心功能
//!
//! 1. **作业准备**：委托 `AssignmentFlow` 生成摘要、发送新作业通知（尽力而为）
//! 2. **并发评分**：每份提交一个任务，由共享的 Semaphore 限流
//! 3. **统一取消**：每个评分任务拿到根令牌的子令牌
//! 4. **统计输出**：按错误类型统计失败数量

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::error;

use crate::error::{ErrorKind, GradingError};
use crate::models::manifest::AssignmentEntry;
use crate::utils::logging;
use crate::workflow::{AssignmentFlow, GradingCtx, GradingFlow, GradingOutcome};

/// 评分统计
#[derive(Debug, Default, Clone)]
pub struct GradingStats {
    pub total: usize,
    pub graded: usize,
    pub cancelled: usize,
    pub failed: HashMap<ErrorKind, usize>,
}

impl GradingStats {
    pub fn record(&mut self, result: &Result<GradingOutcome, GradingError>) {
        self.total += 1;
        match result {
            Ok(_) => self.graded += 1,
            Err(GradingError::Cancelled { .. }) => self.cancelled += 1,
            Err(e) => *self.failed.entry(e.kind()).or_insert(0) += 1,
        }
    }

    pub fn merge(&mut self, other: &GradingStats) {
        self.total += other.total;
        self.graded += other.graded;
        self.cancelled += other.cancelled;
        for (kind, count) in &other.failed {
            *self.failed.entry(*kind).or_insert(0) += count;
        }
    }

    pub fn failed_total(&self) -> usize {
        self.failed.values().sum()
    }

    /// 按名称排序的失败统计，用于日志输出
    pub fn failure_summary(&self) -> Vec<(String, usize)> {
        let mut summary: Vec<(String, usize)> = self
            .failed
            .iter()
            .map(|(kind, count)| (kind.to_string(), *count))
            .collect();
        summary.sort();
        summary
    }
}

/// 处理单份作业
///
/// # 参数
/// - `grading_flow`: 评分流程（所有任务共享）
/// - `assignment_flow`: 作业准备流程
/// - `assignment`: 作业数据
/// - `assignment_index`: 作业编号（用于日志）
/// - `total_assignments`: 作业总数（用于日志）
/// - `semaphore`: 并发评分许可
/// - `cancel`: 根取消令牌
pub async fn process_assignment(
    grading_flow: Arc<GradingFlow>,
    assignment_flow: &AssignmentFlow,
    assignment: &AssignmentEntry,
    assignment_index: usize,
    total_assignments: usize,
    semaphore: Arc<Semaphore>,
    cancel: &CancellationToken,
) -> GradingStats {
    logging::log_assignment_start(
        assignment_index,
        total_assignments,
        &assignment.title,
        assignment.submissions.len(),
    );

    let reference = assignment_flow.prepare(assignment).await.reference;

    let mut handles = Vec::with_capacity(assignment.submissions.len());
    for submission in &assignment.submissions {
        let mut request = assignment.grading_request(submission);
        request.reference = reference.clone();
        let ctx = GradingCtx::new(
            submission.id.clone(),
            assignment.title.clone(),
            submission.student_username.clone(),
            submission.student_email.clone(),
        );

        let flow = grading_flow.clone();
        let semaphore = semaphore.clone();
        let token = cancel.child_token();

        handles.push(tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await;
            flow.run(&request, &ctx, &token).await
        }));
    }

    let mut stats = GradingStats::default();
    for joined in join_all(handles).await {
        match joined {
            Ok(result) => stats.record(&result),
            Err(e) => {
                error!("[作业 {}] 评分任务执行失败: {}", assignment.id, e);
                stats.total += 1;
                *stats.failed.entry(ErrorKind::EvaluationFailure).or_insert(0) += 1;
            }
        }
    }

    logging::log_assignment_complete(assignment_index, stats.graded, stats.total);
    stats
}
