//! Connectivity states and published transitions.
//!
//! # State Transitions
//! ```text
//! Online/Degraded → Offline:      probe fails, OS offline, call fails (network/timeout)
//! Offline         → Reconnecting: reconnect timer fires, OS online
//! Reconnecting    → Offline:      reconnect probe fails (timer rescheduled)
//! any             → Online:       probe or call succeeds under the slow threshold
//! any             → Degraded:     probe succeeds at or above the slow threshold
//! ```

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectivityState {
    Online,
    /// Reachable but slow. A quality signal, not a failure.
    Degraded,
    Offline,
    /// A reconnect probe is in flight.
    Reconnecting,
}

impl ConnectivityState {
    /// Whether the backend is currently believed reachable.
    pub fn is_reachable(&self) -> bool {
        matches!(self, ConnectivityState::Online | ConnectivityState::Degraded)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectivityState::Online => "online",
            ConnectivityState::Degraded => "degraded",
            ConnectivityState::Offline => "offline",
            ConnectivityState::Reconnecting => "reconnecting",
        }
    }
}

impl fmt::Display for ConnectivityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Latency bucket of the last successful exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionQuality {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl ConnectionQuality {
    pub fn from_latency(latency: Duration) -> Self {
        match latency.as_millis() {
            0..=99 => ConnectionQuality::Excellent,
            100..=299 => ConnectionQuality::Good,
            300..=999 => ConnectionQuality::Fair,
            _ => ConnectionQuality::Poor,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeReason {
    ProbeSucceeded,
    ProbeSlow,
    ProbeFailed,
    OsOffline,
    OsOnline,
    ReconnectAttempt,
    CallFailed,
    CallSucceeded,
}

/// Published to subscribers on every state change.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectivityChange {
    pub from: ConnectivityState,
    pub to: ConnectivityState,
    pub quality: Option<ConnectionQuality>,
    pub reason: ChangeReason,
    pub at: DateTime<Utc>,
}
