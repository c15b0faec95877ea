//! Resilient HTTP client for calls to the monitored backend.
//!
//! # Data Flow
//! ```text
//! ApiRequest
//!     → resolve URL, pick per-class timeout, mint x-request-id
//!     → attempt loop:
//!         inject bearer token (unless caller set Authorization)
//!         send with deadline → classify (retries.rs)
//!         success            → observer + recorder → Ok(ApiResponse)
//!         401                → clear token, login hook → Err (no retry)
//!         retryable, budget  → sleep(policy.delay_for(attempt)) → next attempt
//!         otherwise          → Err(ApiError with retry history)
//! ```
//!
//! # Design Decisions
//! - Retry state lives on the stack of each call; concurrent calls never
//!   share a budget
//! - The request id stays the same across retries of one call

use std::fmt;
use std::sync::{Arc, RwLock, Weak};
use std::time::{Duration, Instant};

use axum::body::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use reqwest::Method;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::time;
use url::Url;
use uuid::Uuid;

use crate::config::{ClientConfig, TimeoutConfig};
use crate::observability::metrics;
use crate::observability::recorder::MetricsRecorder;
use crate::resilience::backoff::RetryPolicy;
use crate::resilience::credentials::CredentialStore;
use crate::resilience::errors::{ApiError, ErrorKind, RetryAttempt};
use crate::resilience::retries::{classify_status, classify_transport, should_retry};
use crate::resilience::timeouts::CallClass;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Bytes of an error body kept in the internal detail.
const MAX_DETAIL_BODY: usize = 512;

#[derive(Debug, Error)]
pub enum ClientBuildError {
    #[error("invalid base URL: {0}")]
    BaseUrl(#[from] url::ParseError),

    #[error("failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),
}

/// Receives the outcome of every attempt.
pub trait CallObserver: Send + Sync {
    fn on_success(&self, latency: Duration);
    fn on_failure(&self, kind: ErrorKind);
}

/// One logical call.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    path: String,
    body: Option<serde_json::Value>,
    headers: HeaderMap,
    class: CallClass,
    retry: bool,
    observed: bool,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            headers: HeaderMap::new(),
            class: CallClass::default(),
            retry: true,
            observed: true,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn class(mut self, class: CallClass) -> Self {
        self.class = class;
        self
    }

    /// Make a single attempt regardless of the retry policy.
    pub fn no_retry(mut self) -> Self {
        self.retry = false;
        self
    }

    /// Keep this call's outcome away from the call observer.
    pub(crate) fn unobserved(mut self) -> Self {
        self.observed = false;
        self
    }
}

/// Successful response, body fully read.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub latency: Duration,
    pub attempts: u32,
    pub request_id: String,
}

impl ApiResponse {
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

type UnauthorizedHook = Arc<dyn Fn() + Send + Sync>;

pub struct ResilientClient {
    http: reqwest::Client,
    base_url: Url,
    timeouts: TimeoutConfig,
    policy: RetryPolicy,
    credentials: Arc<dyn CredentialStore>,
    recorder: Option<Arc<MetricsRecorder>>,
    observer: RwLock<Option<Weak<dyn CallObserver>>>,
    on_unauthorized: Option<UnauthorizedHook>,
}

impl ResilientClient {
    pub fn new(config: &ClientConfig, credentials: Arc<dyn CredentialStore>) -> Result<Self, ClientBuildError> {
        let base_url = Url::parse(&config.base_url)?;
        let http = reqwest::Client::builder()
            .user_agent(concat!("uptime-sentinel/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            base_url,
            timeouts: config.timeouts.clone(),
            policy: RetryPolicy::from(&config.retry),
            credentials,
            recorder: None,
            observer: RwLock::new(None),
            on_unauthorized: None,
        })
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_recorder(mut self, recorder: Arc<MetricsRecorder>) -> Self {
        self.recorder = Some(recorder);
        self
    }

    /// Called after a 401 has cleared the stored token.
    pub fn on_unauthorized(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_unauthorized = Some(Arc::new(hook));
        self
    }

    /// Held weakly so an observer may own the client.
    pub fn set_observer(&self, observer: Weak<dyn CallObserver>) {
        *self.observer.write().expect("observer lock poisoned") = Some(observer);
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn credentials(&self) -> &Arc<dyn CredentialStore> {
        &self.credentials
    }

    /// Absolute URLs pass through; anything else is appended to the base.
    pub fn resolve(&self, path: &str) -> Result<Url, url::ParseError> {
        if path.starts_with("http://") || path.starts_with("https://") {
            return Url::parse(path);
        }
        let base = self.base_url.as_str().trim_end_matches('/');
        let path = path.trim_start_matches('/');
        Url::parse(&format!("{}/{}", base, path))
    }

    pub async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        let request_id = Uuid::new_v4().to_string();
        let url = self.resolve(&request.path).map_err(|e| {
            ApiError::new(ErrorKind::Client, None, format!("invalid request path {:?}: {}", request.path, e))
                .with_history(0, Vec::new(), &request_id)
        })?;
        let timeout = request.class.timeout(&self.timeouts);
        let max_attempts = if request.retry { self.policy.max_attempts.max(1) } else { 1 };

        let mut retries = Vec::new();
        let mut attempt = 0;

        loop {
            attempt += 1;
            let started = Instant::now();
            let outcome = self.send_once(&request, &url, timeout, &request_id).await;
            let latency = started.elapsed();

            let error = match outcome {
                Ok(mut response) => {
                    response.latency = latency;
                    response.attempts = attempt;
                    self.observe_success(&request, latency);
                    if attempt > 1 {
                        tracing::info!(request_id = %request_id, attempt, "Request succeeded after retry");
                    }
                    return Ok(response);
                }
                Err(error) => error,
            };

            self.observe_failure(&request, error.kind);

            if error.kind == ErrorKind::Auth {
                self.credentials.clear();
                tracing::warn!(request_id = %request_id, url = %url, "Unauthorized, credentials cleared");
                if let Some(hook) = &self.on_unauthorized {
                    hook();
                }
                self.record_final(false);
                return Err(error.with_history(attempt, retries, &request_id));
            }

            if !should_retry(error.kind, attempt, max_attempts) {
                tracing::warn!(
                    request_id = %request_id,
                    method = %request.method,
                    url = %url,
                    kind = %error.kind,
                    status = ?error.status,
                    attempts = attempt,
                    detail = error.detail(),
                    "Request failed"
                );
                self.record_final(false);
                return Err(error.with_history(attempt, retries, &request_id));
            }

            let delay = self.policy.delay_for(attempt);
            retries.push(RetryAttempt {
                attempt_number: attempt,
                delay_ms: delay.as_millis() as u64,
                cause: error.kind,
            });
            metrics::record_client_retry();
            tracing::warn!(
                request_id = %request_id,
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                kind = %error.kind,
                "Request failed, retrying"
            );
            time::sleep(delay).await;
        }
    }

    async fn send_once(
        &self,
        request: &ApiRequest,
        url: &Url,
        timeout: Duration,
        request_id: &str,
    ) -> Result<ApiResponse, ApiError> {
        let mut builder = self
            .http
            .request(request.method.clone(), url.clone())
            .timeout(timeout)
            .headers(request.headers.clone())
            .header(REQUEST_ID_HEADER, request_id);

        if !request.headers.contains_key(AUTHORIZATION) {
            if let Some(token) = self.credentials.token() {
                builder = builder.bearer_auth(token);
            }
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ApiError::new(classify_transport(&e), None, e.to_string()))?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|e| ApiError::new(classify_transport(&e), Some(status.as_u16()), e.to_string()))?;

        match classify_status(status) {
            None => Ok(ApiResponse {
                status: status.as_u16(),
                headers,
                body,
                latency: Duration::ZERO,
                attempts: 0,
                request_id: request_id.to_string(),
            }),
            Some(kind) => {
                let excerpt = String::from_utf8_lossy(&body[..body.len().min(MAX_DETAIL_BODY)]).into_owned();
                Err(ApiError::new(
                    kind,
                    Some(status.as_u16()),
                    format!("HTTP {} from {}: {}", status, url, excerpt),
                ))
            }
        }
    }

    fn observer(&self) -> Option<Arc<dyn CallObserver>> {
        self.observer
            .read()
            .expect("observer lock poisoned")
            .as_ref()
            .and_then(Weak::upgrade)
    }

    fn observe_success(&self, request: &ApiRequest, latency: Duration) {
        metrics::record_client_request("success");
        self.record_final(true);
        if request.observed {
            if let Some(observer) = self.observer() {
                observer.on_success(latency);
            }
        }
    }

    fn observe_failure(&self, request: &ApiRequest, kind: ErrorKind) {
        metrics::record_client_request(kind.as_str());
        if request.observed {
            if let Some(observer) = self.observer() {
                observer.on_failure(kind);
            }
        }
    }

    fn record_final(&self, success: bool) {
        if let Some(recorder) = &self.recorder {
            recorder.record_outcome(success);
        }
    }

    /// GET the health endpoint with the health-check deadline and retries.
    pub async fn health_check(&self, path: &str) -> Result<ApiResponse, ApiError> {
        self.execute(ApiRequest::get(path).class(CallClass::HealthCheck)).await
    }

    /// One short, unretried GET used to measure reachability and latency.
    pub async fn test_connection(&self, path: &str) -> Result<Duration, ApiError> {
        let request = ApiRequest::get(path)
            .class(CallClass::ConnectionTest)
            .no_retry()
            .unobserved();
        self.execute(request).await.map(|response| response.latency)
    }
}

impl fmt::Debug for ResilientClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResilientClient")
            .field("base_url", &self.base_url.as_str())
            .field("policy", &self.policy)
            .finish()
    }
}
