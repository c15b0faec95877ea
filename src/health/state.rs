//! Failure episode state machine.
//!
//! # States
//! - Healthy: no consecutive failures
//! - Degraded: 0 < consecutive failures < max_failures
//! - Critical: consecutive failures >= max_failures
//!
//! # State Transitions
//! ```text
//! any      → Healthy:  a successful probe (counter resets to 0)
//! Healthy  → Degraded: first failure (when max_failures > 1)
//! Degraded → Critical: failures reach max_failures → restart, once
//! Critical → Critical: further failures, no new restart
//! ```
//!
//! The state is a pure function of the counter; only the restart trigger
//! carries memory (armed until it fires, re-armed by a success).

use serde::Serialize;

use crate::health::probe::HealthCheckResult;

/// Health classification of the supervised process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Healthy,
    Degraded,
    Critical,
}

impl HealthState {
    /// Classify a consecutive-failure count against the threshold.
    pub fn classify(consecutive_failures: u32, max_failures: u32) -> Self {
        if consecutive_failures == 0 {
            HealthState::Healthy
        } else if consecutive_failures < max_failures {
            HealthState::Degraded
        } else {
            HealthState::Critical
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HealthState::Healthy => "healthy",
            HealthState::Degraded => "degraded",
            HealthState::Critical => "critical",
        }
    }
}

/// Snapshot of the current failure episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureEpisode {
    pub consecutive_failures: u32,
    pub state: HealthState,
}

/// Result of folding one probe outcome into the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: HealthState,
    pub to: HealthState,
    pub consecutive_failures: u32,
    /// True exactly once per episode: when Critical is first reached.
    pub restart: bool,
}

impl Transition {
    pub fn changed(&self) -> bool {
        self.from != self.to
    }

    /// The episode ended with a success.
    pub fn recovered(&self) -> bool {
        self.from != HealthState::Healthy && self.to == HealthState::Healthy
    }
}

/// Folds probe results into a consecutive-failure counter.
#[derive(Debug)]
pub struct FailureTracker {
    consecutive_failures: u32,
    max_failures: u32,
    armed: bool,
}

impl FailureTracker {
    /// Create a tracker. A threshold of 0 is treated as 1.
    pub fn new(max_failures: u32) -> Self {
        Self {
            consecutive_failures: 0,
            max_failures: max_failures.max(1),
            armed: true,
        }
    }

    pub fn record(&mut self, result: &HealthCheckResult) -> Transition {
        if result.success {
            self.record_success()
        } else {
            self.record_failure()
        }
    }

    pub fn record_success(&mut self) -> Transition {
        let from = self.state();
        self.consecutive_failures = 0;
        self.armed = true;

        Transition {
            from,
            to: HealthState::Healthy,
            consecutive_failures: 0,
            restart: false,
        }
    }

    pub fn record_failure(&mut self) -> Transition {
        let from = self.state();
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        let to = self.state();

        let restart = to == HealthState::Critical && self.armed;
        if restart {
            self.armed = false;
        }

        Transition {
            from,
            to,
            consecutive_failures: self.consecutive_failures,
            restart,
        }
    }

    /// Operator reset: clears the counter and re-arms the restart trigger.
    pub fn reset(&mut self) -> Transition {
        self.record_success()
    }

    pub fn state(&self) -> HealthState {
        HealthState::classify(self.consecutive_failures, self.max_failures)
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn max_failures(&self) -> u32 {
        self.max_failures
    }

    pub fn episode(&self) -> FailureEpisode {
        FailureEpisode {
            consecutive_failures: self.consecutive_failures,
            state: self.state(),
        }
    }
}
