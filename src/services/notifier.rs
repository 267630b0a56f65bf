//! 通知服务 - 业务能力层
//!
//! 把事件 POST 到按事件类型配置的 webhook。尽力而为：
//! 任何失败都转换成 `NotifyOutcome { success: false, .. }`，从不向调用方报错。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::clients::http_client::{HttpRequest, HttpTransport, RetryingHttpClient};
use crate::config::Config;
use crate::models::notification::{EventType, NotificationEvent};

/// 通知结果分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyCondition {
    Delivered,
    /// 没有配置 webhook，未发起任何请求
    Unconfigured,
    /// 传输失败或请求体无法序列化
    Failed,
}

/// 通知结果
#[derive(Debug, Clone, PartialEq)]
pub struct NotifyOutcome {
    pub success: bool,
    pub detail: String,
    pub condition: NotifyCondition,
}

impl NotifyOutcome {
    fn delivered() -> Self {
        Self {
            success: true,
            detail: "Notification sent successfully".to_string(),
            condition: NotifyCondition::Delivered,
        }
    }

    fn unconfigured() -> Self {
        Self {
            success: false,
            detail: "Webhook URL not configured".to_string(),
            condition: NotifyCondition::Unconfigured,
        }
    }

    fn failed(detail: impl Into<String>) -> Self {
        Self {
            success: false,
            detail: detail.into(),
            condition: NotifyCondition::Failed,
        }
    }
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, event: NotificationEvent) -> NotifyOutcome;
}

/// webhook 通知器
pub struct Notifier {
    http: RetryingHttpClient,
    new_assignment_url: Option<String>,
    evaluation_complete_url: Option<String>,
    timeout: Duration,
}

impl Notifier {
    /// 使用 webhook 专用的重试策略和超时
    pub fn new(config: &Config, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            http: RetryingHttpClient::new(transport, config.webhook_retry.clone()),
            new_assignment_url: config
                .webhook_url(EventType::NewAssignment)
                .map(str::to_string),
            evaluation_complete_url: config
                .webhook_url(EventType::EvaluationComplete)
                .map(str::to_string),
            timeout: config.webhook_timeout,
        }
    }

    fn endpoint(&self, event_type: EventType) -> Option<&str> {
        match event_type {
            EventType::NewAssignment => self.new_assignment_url.as_deref(),
            EventType::EvaluationComplete => self.evaluation_complete_url.as_deref(),
        }
    }
}

#[async_trait]
impl NotificationSink for Notifier {
    async fn notify(&self, event: NotificationEvent) -> NotifyOutcome {
        let event_type = event.event_type();

        let Some(url) = self.endpoint(event_type) else {
            warn!("⚠️ [通知] {} 的 webhook 未配置，跳过", event_type);
            return NotifyOutcome::unconfigured();
        };

        let payload = match event.payload() {
            Ok(payload) => payload,
            Err(e) => {
                warn!("[通知] {} 请求体序列化失败: {}", event_type, e);
                return NotifyOutcome::failed(e.to_string());
            }
        };

        let request = HttpRequest::post_json(url, payload).with_timeout(self.timeout);
        match self.http.call(&request).await {
            Ok(_) => {
                info!("📨 [通知] {} 已发送", event_type);
                NotifyOutcome::delivered()
            }
            Err(e) => {
                warn!("❌ [通知] {} 发送失败 ({}): {}", event_type, e.kind(), e);
                NotifyOutcome::failed(e.to_string())
            }
        }
    }
}
