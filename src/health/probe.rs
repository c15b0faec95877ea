//! Single bounded-timeout probe against the health endpoint.
//!
//! A probe never fails: connection errors, timeouts, non-2xx statuses and
//! unparseable bodies are all folded into a [`HealthCheckResult`] with a
//! specific [`ProbeErrorKind`].

use std::fmt;
use std::time::{Duration, Instant};

use axum::body::{Body, Bytes};
use axum::http::{header, uri::InvalidUri, Method, Request, StatusCode, Uri};
use chrono::{DateTime, Utc};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use serde::{Deserialize, Serialize, Serializer};
use tokio::time;

/// Health payloads larger than this are treated as unparseable.
const MAX_BODY_BYTES: usize = 256 * 1024;

/// Why a probe failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeErrorKind {
    /// No response was received.
    Network,
    /// The endpoint answered with a non-2xx status.
    Http(u16),
    /// The deadline passed before a full response arrived.
    Timeout,
    /// 2xx status, but the body was not JSON.
    InvalidBody,
}

impl fmt::Display for ProbeErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeErrorKind::Network => write!(f, "NETWORK"),
            ProbeErrorKind::Http(code) => write!(f, "HTTP_{}", code),
            ProbeErrorKind::Timeout => write!(f, "TIMEOUT"),
            ProbeErrorKind::InvalidBody => write!(f, "INVALID_BODY"),
        }
    }
}

impl Serialize for ProbeErrorKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Overall status reported by the monitored service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Healthy,
    Degraded,
    Unhealthy,
    #[serde(other)]
    Unknown,
}

/// Process memory figures reported by the service, in bytes.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct MemoryUsage {
    pub used: u64,
    pub total: u64,
    pub external: u64,
}

/// Typed view of the health payload. Every field is optional so that a
/// partially conforming service still yields a successful probe.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthReport {
    pub status: Option<ServiceStatus>,
    /// Service uptime in milliseconds.
    pub uptime: Option<f64>,
    pub database: Option<String>,
    pub memory: Option<MemoryUsage>,
    pub timestamp: Option<String>,
}

/// Outcome of one probe tick.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheckResult {
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    pub response_time_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ProbeErrorKind>,
    /// Internal detail for logs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<HealthReport>,
}

impl HealthCheckResult {
    pub fn succeeded(response_time_ms: u64, body: Option<HealthReport>) -> Self {
        Self {
            timestamp: Utc::now(),
            success: true,
            response_time_ms,
            error_kind: None,
            error_detail: None,
            body,
        }
    }

    pub fn failed(response_time_ms: u64, kind: ProbeErrorKind, detail: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            success: false,
            response_time_ms,
            error_kind: Some(kind),
            error_detail: Some(detail.into()),
            body: None,
        }
    }
}

/// Issues GET requests against a fixed health URL.
#[derive(Clone)]
pub struct HealthProbe {
    url: Uri,
    timeout: Duration,
    client: Client<HttpConnector, Body>,
}

impl HealthProbe {
    /// Create a probe for `url` with a per-probe `timeout`.
    pub fn new(url: &str, timeout: Duration) -> Result<Self, InvalidUri> {
        let url: Uri = url.parse()?;
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());

        Ok(Self {
            url,
            timeout,
            client,
        })
    }

    pub fn url(&self) -> &Uri {
        &self.url
    }

    /// Perform one probe. Always returns a result.
    pub async fn probe(&self) -> HealthCheckResult {
        let started = Instant::now();
        let outcome = time::timeout(self.timeout, self.fetch()).await;
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        match outcome {
            Err(_) => HealthCheckResult::failed(
                elapsed_ms,
                ProbeErrorKind::Timeout,
                format!("no response within {:?}", self.timeout),
            ),
            Ok(Err(detail)) => {
                HealthCheckResult::failed(elapsed_ms, ProbeErrorKind::Network, detail)
            }
            Ok(Ok((status, _))) if !status.is_success() => HealthCheckResult::failed(
                elapsed_ms,
                ProbeErrorKind::Http(status.as_u16()),
                format!("HTTP {}", status),
            ),
            Ok(Ok((_, bytes))) => match serde_json::from_slice::<serde_json::Value>(&bytes) {
                Ok(value) => {
                    let report = serde_json::from_value::<HealthReport>(value).ok();
                    HealthCheckResult::succeeded(elapsed_ms, report)
                }
                Err(e) => HealthCheckResult::failed(
                    elapsed_ms,
                    ProbeErrorKind::InvalidBody,
                    format!("unparseable health payload: {}", e),
                ),
            },
        }
    }

    async fn fetch(&self) -> Result<(StatusCode, Bytes), String> {
        let request = Request::builder()
            .method(Method::GET)
            .uri(self.url.clone())
            .header(header::USER_AGENT, "uptime-sentinel-probe")
            .header(header::ACCEPT, "application/json")
            .body(Body::empty())
            .map_err(|e| format!("failed to build health check request: {}", e))?;

        let response = self
            .client
            .request(request)
            .await
            .map_err(|e| format!("connection error: {}", e))?;

        let status = response.status();
        let bytes = read_body(response.into_body()).await?;
        Ok((status, bytes))
    }
}

async fn read_body(body: hyper::body::Incoming) -> Result<Bytes, String> {
    axum::body::to_bytes(Body::new(body), MAX_BODY_BYTES)
        .await
        .map_err(|e| format!("failed to read health payload: {}", e))
}

impl fmt::Debug for HealthProbe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HealthProbe")
            .field("url", &self.url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_labels() {
        assert_eq!(ProbeErrorKind::Network.to_string(), "NETWORK");
        assert_eq!(ProbeErrorKind::Http(503).to_string(), "HTTP_503");
        assert_eq!(ProbeErrorKind::Timeout.to_string(), "TIMEOUT");
        assert_eq!(
            serde_json::to_value(ProbeErrorKind::Http(404)).unwrap(),
            serde_json::json!("HTTP_404")
        );
    }

    #[test]
    fn test_report_parses_partial_payload() {
        let report: HealthReport = serde_json::from_str(
            r#"{"status":"degraded","uptime":1200,"memory":{"used":1048576}}"#,
        )
        .unwrap();
        assert_eq!(report.status, Some(ServiceStatus::Degraded));
        assert_eq!(report.uptime, Some(1200.0));
        assert_eq!(report.memory.unwrap().used, 1_048_576);
        assert!(report.database.is_none());
    }

    #[test]
    fn test_unknown_status_tolerated() {
        let report: HealthReport = serde_json::from_str(r#"{"status":"error"}"#).unwrap();
        assert_eq!(report.status, Some(ServiceStatus::Unknown));
    }

    #[tokio::test]
    async fn test_probe_connection_refused_is_network_failure() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let probe = HealthProbe::new(&format!("http://{}/health", addr), Duration::from_secs(2)).unwrap();
        let result = probe.probe().await;

        assert!(!result.success);
        assert_eq!(result.error_kind, Some(ProbeErrorKind::Network));
    }
}
