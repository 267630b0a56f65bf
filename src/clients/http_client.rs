//! 带重试的 HTTP 客户端
//!
//! 推理接口和 webhook 共用这一层：发一次请求，失败按指数退避重试，
//! 重试耗尽后返回最后一次失败。重试策略是显式的 [`RetryPolicy`] 值，
//! 由客户端内部执行。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::{AttemptError, HttpError};

/// 重试策略
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// 第一次重试前的等待时间
    pub initial_backoff: Duration,
    /// 单次等待上限
    pub max_backoff: Duration,
    /// 最多尝试次数（含第一次），0 按 1 处理
    pub max_attempts: u32,
    /// 是否对 4xx（408 / 429 除外）也重试
    pub retry_client_errors: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(10),
            max_attempts: 5,
            retry_client_errors: false,
        }
    }
}

impl RetryPolicy {
    pub fn new(initial_backoff: Duration, max_backoff: Duration, max_attempts: u32) -> Self {
        Self {
            initial_backoff,
            max_backoff,
            max_attempts,
            retry_client_errors: false,
        }
    }

    /// 实际的尝试上限
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// 第 `retry` 次重试（从 0 开始）前的等待：min(initial * 2^retry, max)
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.checked_pow(retry).unwrap_or(u32::MAX);
        self.initial_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }

    fn should_retry(&self, failure: &AttemptError) -> bool {
        self.retry_client_errors || !failure.is_client_error()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

/// 一次 HTTP 请求的描述
#[derive(Clone, Debug)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    /// query 参数单独存放，日志里不会打印（API key 可能在这里）
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    pub timeout: Duration,
}

impl HttpRequest {
    pub fn post_json(url: impl Into<String>, body: Value) -> Self {
        Self {
            method: HttpMethod::Post,
            url: url.into(),
            headers: vec![("Content-Type".to_string(), "application/json".to_string())],
            query: Vec::new(),
            body: Some(body),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            url: url.into(),
            headers: Vec::new(),
            query: Vec::new(),
            body: None,
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_bearer(self, token: &str) -> Self {
        self.with_header("Authorization", format!("Bearer {}", token))
    }

    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// 用于日志的端点（不含 query）
    pub fn endpoint(&self) -> &str {
        self.url.split('?').next().unwrap_or(&self.url)
    }
}

/// HTTP 响应
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_str(&self.body)
    }
}

/// 传输层：只负责发出一次请求
///
/// 非 2xx 不算传输错误，交给 [`RetryingHttpClient`] 判断。
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, AttemptError>;
}

/// 基于 reqwest 的传输实现
#[derive(Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, AttemptError> {
        let mut builder = match request.method {
            HttpMethod::Get => self.client.get(&request.url),
            HttpMethod::Post => self.client.post(&request.url),
        }
        .timeout(request.timeout);

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| classify_reqwest_error(e, request.timeout))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| classify_reqwest_error(e, request.timeout))?;

        Ok(HttpResponse { status, body })
    }
}

fn classify_reqwest_error(err: reqwest::Error, timeout: Duration) -> AttemptError {
    if err.is_timeout() {
        AttemptError::Timeout(timeout)
    } else {
        AttemptError::Network(err.to_string())
    }
}

/// 带重试的 HTTP 客户端
#[derive(Clone)]
pub struct RetryingHttpClient {
    transport: Arc<dyn HttpTransport>,
    policy: RetryPolicy,
}

impl RetryingHttpClient {
    pub fn new(transport: Arc<dyn HttpTransport>, policy: RetryPolicy) -> Self {
        Self { transport, policy }
    }

    /// 使用默认 reqwest 传输
    pub fn with_reqwest(policy: RetryPolicy) -> Self {
        Self::new(Arc::new(ReqwestTransport::new()), policy)
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// 发出请求，按策略重试
    ///
    /// 成功返回 2xx 响应；失败返回 [`HttpError::Transport`]，携带最后一次失败原因。
    pub async fn call(&self, request: &HttpRequest) -> Result<HttpResponse, HttpError> {
        let max_attempts = self.policy.attempts();
        let endpoint = request.endpoint().to_string();
        let mut attempt = 0;

        loop {
            attempt += 1;
            debug!(
                "[HTTP] {:?} {} (尝试 {}/{})",
                request.method, endpoint, attempt, max_attempts
            );

            let failure = match self.transport.send(request).await {
                Ok(response) if response.is_success() => {
                    debug!("[HTTP] {} 返回 {}", endpoint, response.status);
                    return Ok(response);
                }
                Ok(response) => AttemptError::Status {
                    status: response.status,
                    body: response.body,
                },
                Err(e) => e,
            };

            if attempt >= max_attempts || !self.policy.should_retry(&failure) {
                warn!(
                    "[HTTP] {} 第 {}/{} 次尝试失败，不再重试: {}",
                    endpoint, attempt, max_attempts, failure
                );
                return Err(HttpError::Transport {
                    endpoint,
                    attempts: attempt,
                    last: failure,
                });
            }

            let delay = self.policy.backoff(attempt - 1);
            warn!(
                "[HTTP] {} 第 {}/{} 次尝试失败: {}，{:?} 后重试",
                endpoint, attempt, max_attempts, failure, delay
            );
            sleep(delay).await;
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use tokio::time::Instant;

    use super::*;

    /// 按脚本依次返回结果的传输桩，脚本用完后重复最后一个结果
    pub(crate) struct ScriptedTransport {
        script: Mutex<VecDeque<Result<HttpResponse, AttemptError>>>,
        last: Mutex<Option<Result<HttpResponse, AttemptError>>>,
        calls: Mutex<Vec<(Instant, HttpRequest)>>,
    }

    impl ScriptedTransport {
        pub(crate) fn new(script: Vec<Result<HttpResponse, AttemptError>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                last: Mutex::new(None),
                calls: Mutex::new(Vec::new()),
            })
        }

        pub(crate) fn always(result: Result<HttpResponse, AttemptError>) -> Arc<Self> {
            Self::new(vec![result])
        }

        pub(crate) fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }

        pub(crate) fn requests(&self) -> Vec<HttpRequest> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .map(|(_, r)| r.clone())
                .collect()
        }

        /// 相邻两次调用之间的间隔
        pub(crate) fn gaps(&self) -> Vec<Duration> {
            let calls = self.calls.lock().unwrap();
            calls
                .windows(2)
                .map(|pair| pair[1].0.duration_since(pair[0].0))
                .collect()
        }
    }

    #[async_trait]
    impl HttpTransport for ScriptedTransport {
        async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, AttemptError> {
            self.calls
                .lock()
                .unwrap()
                .push((Instant::now(), request.clone()));

            let next = self.script.lock().unwrap().pop_front();
            let mut last = self.last.lock().unwrap();
            match next {
                Some(result) => {
                    *last = Some(result.clone());
                    result
                }
                None => last
                    .clone()
                    .unwrap_or_else(|| Err(AttemptError::Network("脚本为空".to_string()))),
            }
        }
    }

    pub(crate) fn ok(body: &str) -> Result<HttpResponse, AttemptError> {
        Ok(HttpResponse::new(200, body))
    }

    pub(crate) fn status(code: u16) -> Result<HttpResponse, AttemptError> {
        Ok(HttpResponse::new(code, "error"))
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(Duration::from_secs(1), Duration::from_secs(10), max_attempts)
    }

    fn request() -> HttpRequest {
        HttpRequest::post_json("https://inference.example.com/v1/generate", serde_json::json!({}))
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy::new(Duration::from_secs(1), Duration::from_secs(3), 5);

        assert_eq!(policy.backoff(0), Duration::from_secs(1));
        assert_eq!(policy.backoff(1), Duration::from_secs(2));
        assert_eq!(policy.backoff(2), Duration::from_secs(3));
        assert_eq!(policy.backoff(3), Duration::from_secs(3));
        assert_eq!(policy.backoff(64), Duration::from_secs(3));
    }

    #[test]
    fn test_zero_attempts_still_tries_once() {
        assert_eq!(policy(0).attempts(), 1);
    }

    #[test]
    fn test_endpoint_strips_query() {
        let req = HttpRequest::get("https://example.com/models:generate?key=secret");
        assert_eq!(req.endpoint(), "https://example.com/models:generate");
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_transient_failures() {
        let transport = ScriptedTransport::new(vec![
            status(503),
            Err(AttemptError::Network("connection reset".into())),
            ok(r#"{"ok":true}"#),
        ]);
        let client = RetryingHttpClient::new(transport.clone(), policy(5));

        let response = client.call(&request()).await.unwrap();

        assert_eq!(response.body, r#"{"ok":true}"#);
        assert_eq!(transport.call_count(), 3);

        let gaps = transport.gaps();
        assert_eq!(gaps, vec![Duration::from_secs(1), Duration::from_secs(2)]);
        assert!(gaps.windows(2).all(|w| w[0] <= w[1]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_attempts() {
        let transport = ScriptedTransport::always(status(500));
        let client = RetryingHttpClient::new(transport.clone(), policy(5));

        let err = client.call(&request()).await.unwrap_err();

        assert_eq!(transport.call_count(), 5);
        match err {
            HttpError::Transport { attempts, last, .. } => {
                assert_eq!(attempts, 5);
                assert_eq!(
                    last,
                    AttemptError::Status {
                        status: 500,
                        body: "error".into()
                    }
                );
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(
            transport.gaps(),
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4),
                Duration::from_secs(8),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_errors_are_not_retried() {
        let transport = ScriptedTransport::always(status(400));
        let client = RetryingHttpClient::new(transport.clone(), policy(5));

        let err = client.call(&request()).await.unwrap_err();

        assert_eq!(transport.call_count(), 1);
        assert!(matches!(err, HttpError::Transport { attempts: 1, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_errors_retried_when_policy_allows() {
        let transport = ScriptedTransport::always(status(422));
        let mut policy = policy(3);
        policy.retry_client_errors = true;
        let client = RetryingHttpClient::new(transport.clone(), policy);

        let _ = client.call(&request()).await.unwrap_err();

        assert_eq!(transport.call_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttling_is_retried() {
        let transport = ScriptedTransport::new(vec![status(429), ok("done")]);
        let client = RetryingHttpClient::new(transport.clone(), policy(2));

        let response = client.call(&request()).await.unwrap();

        assert_eq!(response.body, "done");
        assert_eq!(transport.call_count(), 2);
    }

    #[tokio::test]
    async fn test_reqwest_transport_sends_query_and_reads_body() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 8192];
            let n = socket.read(&mut buf).await.unwrap();
            let head = String::from_utf8_lossy(&buf[..n]).to_string();
            let body = r#"{"accepted":true}"#;
            let response = format!(
                "HTTP/1.1 202 Accepted\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            head
        });

        let transport = ReqwestTransport::new();
        let req = HttpRequest::get(format!("http://{}/hook", addr)).with_query("key", "abc");
        let response = transport.send(&req).await.unwrap();

        assert_eq!(response.status, 202);
        assert!(response.is_success());
        assert_eq!(response.body, r#"{"accepted":true}"#);

        let head = server.await.unwrap();
        assert!(head.starts_with("GET /hook?key=abc "));
    }
}
