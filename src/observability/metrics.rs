//! Metrics collection and exposition.
//!
//! # Metrics
//! - `sentinel_probes_total` (counter): probes by outcome
//! - `sentinel_probe_duration_seconds` (histogram): probe latency
//! - `sentinel_consecutive_failures` (gauge): current failure streak
//! - `sentinel_health_state` (gauge): 0=healthy, 1=degraded, 2=critical
//! - `sentinel_restarts_total` (counter): restart attempts by outcome
//! - `sentinel_client_requests_total` (counter): outbound call outcomes by kind
//! - `sentinel_client_retries_total` (counter): retry attempts
//! - `sentinel_connectivity_state` (gauge): 0=online, 1=degraded, 2=reconnecting, 3=offline
//!
//! Recording is a no-op until a recorder is installed, so library users
//! that never call [`init_metrics`] pay nothing.

use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::connectivity::state::ConnectivityState;
use crate::health::state::HealthState;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Prometheus exporter listening");
    Ok(())
}

pub fn record_probe(success: bool, response_time_ms: u64) {
    let outcome = if success { "success" } else { "failure" };
    ::metrics::counter!("sentinel_probes_total", "outcome" => outcome).increment(1);
    ::metrics::histogram!("sentinel_probe_duration_seconds")
        .record(response_time_ms as f64 / 1000.0);
}

pub fn record_health_state(state: HealthState, consecutive_failures: u32) {
    let value = match state {
        HealthState::Healthy => 0.0,
        HealthState::Degraded => 1.0,
        HealthState::Critical => 2.0,
    };
    ::metrics::gauge!("sentinel_health_state").set(value);
    ::metrics::gauge!("sentinel_consecutive_failures").set(f64::from(consecutive_failures));
}

pub fn record_restart(outcome: &'static str) {
    ::metrics::counter!("sentinel_restarts_total", "outcome" => outcome).increment(1);
}

pub fn record_client_request(kind: &'static str) {
    ::metrics::counter!("sentinel_client_requests_total", "kind" => kind).increment(1);
}

pub fn record_client_retry() {
    ::metrics::counter!("sentinel_client_retries_total").increment(1);
}

pub fn record_connectivity(state: ConnectivityState) {
    let value = match state {
        ConnectivityState::Online => 0.0,
        ConnectivityState::Degraded => 1.0,
        ConnectivityState::Reconnecting => 2.0,
        ConnectivityState::Offline => 3.0,
    };
    ::metrics::gauge!("sentinel_connectivity_state").set(value);
}
