//! 批量评分处理器 - 编排层
//!
//! ## 职责
//!
//! 本模块是整个应用的入口，负责组装组件、加载评分清单并逐份作业处理。
//!
//! ## 核心功能
//!
//! 1. **应用初始化**：按配置构建传输层、文档存储、PDF 引擎、OCR、评分与通知服务
//! 2. **清单加载**：读取 TOML 评分清单（`Vec<AssignmentEntry>`）
//! 3. **并发控制**：所有作业共享一个 Semaphore
//! 4. **取消处理**：Ctrl-C 取消根令牌，进行中的评分返回 `Cancelled`
//! 5. **全局统计**：汇总所有作业的评分结果

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::clients::http_client::{HttpTransport, ReqwestTransport};
use crate::clients::inference::InferenceClient;
use crate::config::Config;
use crate::infrastructure::{LocalDocumentStore, PdfiumEngine};
use crate::models::load_manifest;
use crate::orchestrator::assignment_processor::{self, GradingStats};
use crate::services::{
    DocumentExtractor, EvaluationClient, Notifier, ReferenceSummarizer, ResultWriter, VisionOcr,
};
use crate::utils::logging;
use crate::workflow::{AssignmentFlow, GradingFlow};

/// 应用主结构
pub struct App {
    config: Config,
    grading_flow: Arc<GradingFlow>,
    assignment_flow: AssignmentFlow,
    cancel: CancellationToken,
}

impl App {
    /// 初始化应用
    pub async fn initialize(config: Config) -> Result<Self> {
        let evaluation_backend = format!("{:?}", config.evaluation_backend);
        logging::log_startup(config.max_concurrent_gradings, &evaluation_backend);

        let transport: Arc<dyn HttpTransport> = Arc::new(ReqwestTransport::new());
        let store = Arc::new(LocalDocumentStore::new(&config.upload_folder));
        let pdf = Arc::new(PdfiumEngine::new(config.pdfium_library_path.clone()));

        let ocr = Arc::new(VisionOcr::new(InferenceClient::from_config(
            &config,
            config.ocr_backend,
            transport.clone(),
        )));
        let evaluator = Arc::new(EvaluationClient::new(InferenceClient::from_config(
            &config,
            config.evaluation_backend,
            transport.clone(),
        )));
        let summarizer = Arc::new(ReferenceSummarizer::new(InferenceClient::from_config(
            &config,
            config.summarization_backend,
            transport.clone(),
        )));
        let notifier = Arc::new(Notifier::new(&config, transport));
        let recorder = Arc::new(ResultWriter::new(&config.results_file));
        let extractor = Arc::new(DocumentExtractor::new(store.clone(), pdf, ocr));

        if config.webhook_url(crate::models::EventType::EvaluationComplete).is_none() {
            warn!("⚠️ 未配置评分完成 webhook，评分结果不会发送通知");
        }

        let grading_flow = GradingFlow::new(
            extractor.clone(),
            evaluator,
            recorder,
            notifier.clone(),
        )
        .with_timeout(config.grading_timeout)
        .with_verbose_logging(config.verbose_logging);

        let assignment_flow = AssignmentFlow::new(extractor, summarizer, store, notifier);

        Ok(Self {
            config,
            grading_flow: Arc::new(grading_flow),
            assignment_flow,
            cancel: CancellationToken::new(),
        })
    }

    /// 运行应用主逻辑
    pub async fn run(&self) -> Result<()> {
        info!("\n📁 正在加载评分清单: {}", self.config.manifest_path);
        let manifest = load_manifest(Path::new(&self.config.manifest_path)).await?;

        if manifest.submission_count() == 0 {
            warn!("⚠️ 评分清单中没有待评分的提交，程序结束");
            return Ok(());
        }

        logging::log_manifest_loaded(
            manifest.assignments.len(),
            manifest.submission_count(),
            self.config.max_concurrent_gradings,
        );

        self.listen_for_interrupt();

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_gradings.max(1)));
        let total_assignments = manifest.assignments.len();
        let mut stats = GradingStats::default();

        for (idx, assignment) in manifest.assignments.iter().enumerate() {
            if self.cancel.is_cancelled() {
                warn!("⏹️ 已取消，跳过剩余 {} 份作业", total_assignments - idx);
                break;
            }

            let assignment_stats = assignment_processor::process_assignment(
                self.grading_flow.clone(),
                &self.assignment_flow,
                assignment,
                idx + 1,
                total_assignments,
                semaphore.clone(),
                &self.cancel,
            )
            .await;
            stats.merge(&assignment_stats);
        }

        logging::print_final_stats(
            stats.graded,
            &stats.failure_summary(),
            stats.cancelled,
            stats.total,
            &self.config.results_file,
        );

        Ok(())
    }

    fn listen_for_interrupt(&self) {
        let token = self.cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("⏹️ 收到中断信号，正在取消进行中的评分...");
                token.cancel();
            }
        });
    }
}
