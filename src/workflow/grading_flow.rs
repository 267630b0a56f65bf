//! 评分流程 - 流程层
//!
//! 核心职责：定义"一份提交"的完整评分流程
//!
//! 流程顺序（状态机）：
//! 1. EXTRACT_STUDENT   提取学生答案
//! 2. EXTRACT_REFERENCE 提取参考答案（已有摘要时跳过）
//! 3. EVALUATE          模型评分
//! 4. RECORD            持久化回调，成功后才允许通知
//! 5. NOTIFY            评分完成通知（尽力而为）
//!
//! 失败策略：
//! - 提取失败 → `ExtractionFailure`，不做任何评分
//! - 评分失败或持久化失败 → `EvaluationFailure`，不存默认分，不通知
//! - 通知失败只记日志，评分仍然算成功
//!
//! 取消：调用方的 `CancellationToken` 或请求截止时间会中止当前阶段，
//! 返回 `Cancelled`。RECORD 阶段不可中断；NOTIFY 阶段被取消时评分仍算成功。

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local};
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{CancelReason, EvaluationError, GradingError, GradingStage};
use crate::models::grading::{EvaluationResult, GradingRequest, ReferenceMaterial};
use crate::models::notification::{EvaluationCompletePayload, NotificationEvent};
use crate::services::{
    EvaluationRecorder, Evaluator, NotificationSink, NotifyOutcome, TextExtractor,
};
use crate::utils::logging::truncate_text;
use crate::workflow::grading_ctx::GradingCtx;

/// 一次成功评分的结果
#[derive(Debug, Clone)]
pub struct GradingOutcome {
    pub result: EvaluationResult,
    pub graded_at: DateTime<Local>,
    /// 通知结果；通知阶段被取消时为 None
    pub notification: Option<NotifyOutcome>,
}

/// 评分流程
///
/// - 编排单份提交的完整评分流程
/// - 不持有任何可变状态，可被多个请求并发调用
/// - 只依赖业务能力（services）
pub struct GradingFlow {
    extractor: Arc<dyn TextExtractor>,
    evaluator: Arc<dyn Evaluator>,
    recorder: Arc<dyn EvaluationRecorder>,
    notifier: Arc<dyn NotificationSink>,
    timeout: Option<Duration>,
    verbose_logging: bool,
}

impl GradingFlow {
    pub fn new(
        extractor: Arc<dyn TextExtractor>,
        evaluator: Arc<dyn Evaluator>,
        recorder: Arc<dyn EvaluationRecorder>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            extractor,
            evaluator,
            recorder,
            notifier,
            timeout: None,
            verbose_logging: false,
        }
    }

    /// 单个请求的截止时间（从 `run` 开始计时）
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_verbose_logging(mut self, verbose: bool) -> Self {
        self.verbose_logging = verbose;
        self
    }

    pub async fn run(
        &self,
        request: &GradingRequest,
        ctx: &GradingCtx,
        cancel: &CancellationToken,
    ) -> Result<GradingOutcome, GradingError> {
        let deadline = self.timeout.map(|t| Instant::now() + t);

        // ========== EXTRACT_STUDENT ==========
        let stage = GradingStage::ExtractStudent;
        info!("{} 📄 提取学生答案: {}", ctx, request.submission_document_path.display());
        let student = guard(stage, cancel, deadline, async {
            self.extractor
                .extract(&request.submission_document_path)
                .await
        })
        .await?
        .map_err(|source| {
            error!("{} ❌ 学生答案提取失败: {}", ctx, source);
            GradingError::Extraction { stage, source }
        })?;
        self.log_preview(ctx, "学生答案", &student.text);

        // ========== EXTRACT_REFERENCE ==========
        let stage = GradingStage::ExtractReference;
        let reference_text = match &request.reference {
            ReferenceMaterial::Summary(summary) => {
                debug!("{} 使用预先生成的参考答案摘要，跳过提取", ctx);
                summary.clone()
            }
            ReferenceMaterial::Document(path) => {
                info!("{} 📄 提取参考答案: {}", ctx, path.display());
                guard(stage, cancel, deadline, self.extractor.extract(path))
                    .await?
                    .map_err(|source| {
                        error!("{} ❌ 参考答案提取失败: {}", ctx, source);
                        GradingError::Extraction { stage, source }
                    })?
                    .text
            }
        };

        // ========== EVALUATE ==========
        let stage = GradingStage::Evaluate;
        info!("{} 🤖 开始评分...", ctx);
        let result = guard(
            stage,
            cancel,
            deadline,
            self.evaluator
                .evaluate(&request.question, &reference_text, &student.text),
        )
        .await?
        .map_err(|e| {
            error!("{} ❌ 评分失败 ({}): {}", ctx, e.kind(), e);
            GradingError::Evaluation(e)
        })?;
        info!("{} ✓ 评分完成: {} 分", ctx, result.score());

        // ========== RECORD ==========
        let graded_at = Local::now();
        if let Err(e) = self
            .recorder
            .record_evaluation(&ctx.submission_id, &result, graded_at)
            .await
        {
            error!("{} ❌ 评分结果持久化失败，不发送通知: {:#}", ctx, e);
            return Err(GradingError::Evaluation(EvaluationError::Persistence(
                format!("{:#}", e),
            )));
        }
        debug!("{} 评分结果已记录", ctx);

        // ========== NOTIFY ==========
        let event = NotificationEvent::EvaluationComplete(EvaluationCompletePayload::new(
            &ctx.student_email,
            &ctx.student_username,
            &ctx.assignment_title,
            &result,
        ));
        let notification =
            match guard(GradingStage::Notify, cancel, deadline, self.notifier.notify(event)).await
            {
                Ok(outcome) => {
                    if !outcome.success {
                        warn!("{} ⚠️ 通知未送达（评分已保存）: {}", ctx, outcome.detail);
                    }
                    Some(outcome)
                }
                Err(e) => {
                    warn!("{} ⚠️ {}，评分已保存", ctx, e);
                    None
                }
            };

        Ok(GradingOutcome {
            result,
            graded_at,
            notification,
        })
    }

    fn log_preview(&self, ctx: &GradingCtx, label: &str, text: &str) {
        if self.verbose_logging {
            debug!("{} {}: {}", ctx, label, truncate_text(text, 200));
        } else {
            debug!("{} {}: {} 字符", ctx, label, text.chars().count());
        }
    }
}

/// 在取消 / 截止时间的约束下执行一个阶段
async fn guard<F, T>(
    stage: GradingStage,
    cancel: &CancellationToken,
    deadline: Option<Instant>,
    stage_future: F,
) -> Result<T, GradingError>
where
    F: Future<Output = T>,
{
    let cancelled = |reason| GradingError::Cancelled { stage, reason };

    if cancel.is_cancelled() {
        return Err(cancelled(CancelReason::Caller));
    }
    if deadline.is_some_and(|d| Instant::now() >= d) {
        return Err(cancelled(CancelReason::Deadline));
    }

    let expired = async {
        match deadline {
            Some(d) => sleep_until(d).await,
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(cancelled(CancelReason::Caller)),
        _ = expired => Err(cancelled(CancelReason::Deadline)),
        output = stage_future => Ok(output),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_guard_passes_output_through() {
        let token = CancellationToken::new();
        let value = guard(GradingStage::Evaluate, &token, None, async { 42 })
            .await
            .unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn test_guard_rejects_already_cancelled() {
        let token = CancellationToken::new();
        token.cancel();

        let err = guard(GradingStage::ExtractStudent, &token, None, async { 1 })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            GradingError::Cancelled {
                stage: GradingStage::ExtractStudent,
                reason: CancelReason::Caller
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_guard_enforces_deadline() {
        let token = CancellationToken::new();
        let deadline = Some(Instant::now() + Duration::from_secs(5));

        let err = guard(GradingStage::Evaluate, &token, deadline, async {
            tokio::time::sleep(Duration::from_secs(60)).await;
        })
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            GradingError::Cancelled {
                reason: CancelReason::Deadline,
                ..
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_guard_aborts_on_cancel_mid_stage() {
        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let err = guard(GradingStage::Evaluate, &token, None, async {
            tokio::time::sleep(Duration::from_secs(60)).await;
        })
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            GradingError::Cancelled {
                stage: GradingStage::Evaluate,
                reason: CancelReason::Caller
            }
        ));
    }
}
