//! Per-call-class timeouts.
//!
//! # Design Decisions
//! - Every outbound call has a deadline chosen by its class
//! - The deadline applies to each attempt, not to the whole retry sequence
//! - Timed-out attempts are classified as `ErrorKind::Timeout`

use std::time::Duration;

use crate::config::TimeoutConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CallClass {
    #[default]
    ApiRequest,
    HealthCheck,
    Upload,
    Download,
    ConnectionTest,
}

impl CallClass {
    pub fn timeout(&self, config: &TimeoutConfig) -> Duration {
        let ms = match self {
            CallClass::ApiRequest => config.api_request_ms,
            CallClass::HealthCheck => config.health_check_ms,
            CallClass::Upload => config.upload_ms,
            CallClass::Download => config.download_ms,
            CallClass::ConnectionTest => config.connection_test_ms,
        };
        Duration::from_millis(ms)
    }
}
