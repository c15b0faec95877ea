//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the
//! supervisor and the client resilience layer. All types derive Serde
//! traits for deserialization from config files; every section has
//! defaults so a minimal (or absent) file is valid.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct SentinelConfig {
    /// Health probing and failure threshold settings.
    pub monitor: MonitorConfig,

    /// How the supervised process is restarted.
    pub restart: RestartConfig,

    /// Log and metrics file locations.
    pub files: FileConfig,

    /// Outbound client resilience settings.
    pub client: ClientConfig,

    /// Client-side connectivity tracking.
    pub connectivity: ConnectivityConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Admin control surface.
    pub admin: AdminConfig,
}

/// Health monitor configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Full URL of the health endpoint to probe.
    pub health_check_url: String,

    /// Period between probes in milliseconds.
    pub check_interval_ms: u64,

    /// Per-probe deadline in milliseconds.
    pub probe_timeout_ms: u64,

    /// Consecutive failures before the process is restarted.
    pub max_failures: u32,

    /// Number of recent probe results kept in memory.
    pub history_size: usize,

    /// Heap usage (MiB) reported by the endpoint above which a warning is logged.
    pub memory_warn_mb: u64,
}

impl MonitorConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            health_check_url: "http://localhost:5000/health".to_string(),
            check_interval_ms: 30_000,
            probe_timeout_ms: 10_000,
            max_failures: 3,
            history_size: 100,
            memory_warn_mb: 500,
        }
    }
}

/// Restart configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RestartConfig {
    /// Shell command that starts a replacement process.
    pub command: String,

    /// Delay between the termination signal and the respawn, in milliseconds.
    pub grace_period_ms: u64,

    /// Pid of an already running process to terminate on the first restart.
    pub supervised_pid: Option<u32>,
}

impl RestartConfig {
    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }
}

impl Default for RestartConfig {
    fn default() -> Self {
        Self {
            command: "npm start".to_string(),
            grace_period_ms: 2_000,
            supervised_pid: None,
        }
    }
}

/// File locations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FileConfig {
    /// Append-only log file.
    pub log_file: PathBuf,

    /// Metrics snapshot, overwritten on every tick.
    pub metrics_file: PathBuf,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            log_file: PathBuf::from("./monitor.log"),
            metrics_file: PathBuf::from("./metrics.json"),
        }
    }
}

/// Outbound client configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL that request paths are resolved against.
    pub base_url: String,

    /// Per-call-class timeouts.
    pub timeouts: TimeoutConfig,

    /// Retry parameters.
    pub retry: RetryConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
            timeouts: TimeoutConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

/// Timeouts per class of outbound call, in milliseconds.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub api_request_ms: u64,
    pub health_check_ms: u64,
    pub upload_ms: u64,
    pub download_ms: u64,
    pub connection_test_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            api_request_ms: 15_000,
            health_check_ms: 10_000,
            upload_ms: 60_000,
            download_ms: 30_000,
            connection_test_ms: 5_000,
        }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per call, including the first one.
    pub max_attempts: u32,

    /// Delay before the first retry in milliseconds.
    pub base_delay_ms: u64,

    /// Upper bound for any single delay in milliseconds.
    pub max_delay_ms: u64,

    /// Growth factor applied per attempt.
    pub backoff_multiplier: f64,

    /// Add up to 10% random jitter on top of the computed delay.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 2_000,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
            jitter: false,
        }
    }
}

/// Connectivity monitor configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ConnectivityConfig {
    /// Period of self-probes while reachable, in milliseconds.
    pub check_interval_ms: u64,

    /// Delay before each reconnect attempt while offline, in milliseconds.
    pub reconnect_interval_ms: u64,

    /// Probe latency at or above which the link is reported degraded.
    pub slow_threshold_ms: u64,

    /// Path probed relative to the client base URL.
    pub health_path: String,
}

impl Default for ConnectivityConfig {
    fn default() -> Self {
        Self {
            check_interval_ms: 30_000,
            reconnect_interval_ms: 30_000,
            slow_threshold_ms: 1_000,
            health_path: "/health".to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log filter (trace, debug, info, warn, error or a full directive).
    pub log_level: String,

    /// Enable the Prometheus scrape endpoint.
    pub metrics_enabled: bool,

    /// Prometheus endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9464".to_string(),
        }
    }
}

/// Admin control surface configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable the admin HTTP surface.
    pub enabled: bool,

    /// Bind address for the admin surface.
    pub bind_address: String,

    /// API key expected as a Bearer token.
    pub api_key: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind_address: "127.0.0.1:8081".to_string(),
            api_key: String::new(),
        }
    }
}
