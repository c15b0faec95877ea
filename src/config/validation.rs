//! Configuration validation.
//!
//! Serde handles syntax; this module checks value ranges and URL shapes.
//! Validation returns every problem found, not just the first.

use thiserror::Error;
use url::Url;

use crate::config::schema::SentinelConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Validate a configuration, collecting all errors.
pub fn validate_config(config: &SentinelConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let monitor = &config.monitor;
    match Url::parse(&monitor.health_check_url) {
        Ok(url) if url.scheme() != "http" => errors.push(ValidationError::new(
            "monitor.health_check_url",
            format!("unsupported scheme '{}', the probe speaks plain http", url.scheme()),
        )),
        Ok(_) => {}
        Err(e) => errors.push(ValidationError::new(
            "monitor.health_check_url",
            format!("invalid URL: {}", e),
        )),
    }
    if monitor.check_interval_ms == 0 {
        errors.push(ValidationError::new("monitor.check_interval_ms", "must be greater than 0"));
    }
    if monitor.probe_timeout_ms == 0 {
        errors.push(ValidationError::new("monitor.probe_timeout_ms", "must be greater than 0"));
    }
    if monitor.max_failures == 0 {
        errors.push(ValidationError::new("monitor.max_failures", "must be at least 1"));
    }
    if monitor.history_size == 0 {
        errors.push(ValidationError::new("monitor.history_size", "must be at least 1"));
    }

    if config.restart.command.trim().is_empty() {
        errors.push(ValidationError::new("restart.command", "must not be empty"));
    }

    let client = &config.client;
    if let Err(e) = Url::parse(&client.base_url) {
        errors.push(ValidationError::new("client.base_url", format!("invalid URL: {}", e)));
    }
    let timeouts = &client.timeouts;
    for (field, value) in [
        ("client.timeouts.api_request_ms", timeouts.api_request_ms),
        ("client.timeouts.health_check_ms", timeouts.health_check_ms),
        ("client.timeouts.upload_ms", timeouts.upload_ms),
        ("client.timeouts.download_ms", timeouts.download_ms),
        ("client.timeouts.connection_test_ms", timeouts.connection_test_ms),
    ] {
        if value == 0 {
            errors.push(ValidationError::new(field, "must be greater than 0"));
        }
    }

    let retry = &client.retry;
    if retry.max_attempts == 0 {
        errors.push(ValidationError::new("client.retry.max_attempts", "must be at least 1"));
    }
    if !retry.backoff_multiplier.is_finite() || retry.backoff_multiplier < 1.0 {
        errors.push(ValidationError::new(
            "client.retry.backoff_multiplier",
            "must be a finite number >= 1",
        ));
    }
    if retry.base_delay_ms > retry.max_delay_ms {
        errors.push(ValidationError::new(
            "client.retry.base_delay_ms",
            format!("must not exceed max_delay_ms ({})", retry.max_delay_ms),
        ));
    }

    let connectivity = &config.connectivity;
    if connectivity.check_interval_ms == 0 {
        errors.push(ValidationError::new("connectivity.check_interval_ms", "must be greater than 0"));
    }
    if connectivity.reconnect_interval_ms == 0 {
        errors.push(ValidationError::new(
            "connectivity.reconnect_interval_ms",
            "must be greater than 0",
        ));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<std::net::SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            "must be a socket address",
        ));
    }

    if config.admin.enabled {
        if config.admin.api_key.is_empty() {
            errors.push(ValidationError::new("admin.api_key", "required when admin is enabled"));
        }
        if config.admin.bind_address.parse::<std::net::SocketAddr>().is_err() {
            errors.push(ValidationError::new("admin.bind_address", "must be a socket address"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
