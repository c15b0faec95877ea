//! Running health counters and the derived snapshot.
//!
//! Two different "uptime" figures live here and must not be confused:
//! `uptime_ms` is wall-clock time since the recorder was created, while
//! `uptime_percentage` is the share of probes that succeeded.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::health::probe::HealthCheckResult;

/// Persisted view of the counters. Overwritten on every tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub timestamp: DateTime<Utc>,
    /// Wall-clock milliseconds since monitoring started.
    #[serde(rename = "uptime")]
    pub uptime_ms: u64,
    pub total_checks: u64,
    pub successful_checks: u64,
    pub failed_checks: u64,
    /// Current consecutive failures.
    pub failure_count: u32,
    pub last_health_check: Option<DateTime<Utc>>,
    /// Probe success ratio, 0–100.
    pub uptime_percentage: f64,
    /// 0–100 heuristic of failure ratio and current streak.
    pub health_score: u8,
}

/// Success ratio as a percentage, rounded to two decimals.
/// Defined as 100 when nothing has been checked yet.
pub fn uptime_percentage(successful: u64, total: u64) -> f64 {
    if total == 0 {
        return 100.0;
    }
    let ratio = successful.min(total) as f64 / total as f64 * 100.0;
    (ratio * 100.0).round() / 100.0
}

/// `clamp(0, 100, 100 − failed/total·50 − failure_count·10)`, rounded.
pub fn health_score(total: u64, failed: u64, failure_count: u32) -> u8 {
    if total == 0 {
        return 100;
    }
    let failure_ratio = failed.min(total) as f64 / total as f64;
    let score = 100.0 - failure_ratio * 50.0 - f64::from(failure_count) * 10.0;
    score.clamp(0.0, 100.0).round() as u8
}

#[derive(Debug, Default)]
struct Counters {
    total: u64,
    successful: u64,
    failed: u64,
    failure_count: u32,
    last_check: Option<DateTime<Utc>>,
    history: VecDeque<HealthCheckResult>,
}

/// Accumulates probe and call outcomes.
///
/// One instance per supervisor or client; share it through an `Arc`.
#[derive(Debug)]
pub struct MetricsRecorder {
    started: Instant,
    history_capacity: usize,
    counters: Mutex<Counters>,
}

impl MetricsRecorder {
    pub fn new(history_capacity: usize) -> Self {
        Self {
            started: Instant::now(),
            history_capacity: history_capacity.max(1),
            counters: Mutex::new(Counters::default()),
        }
    }

    fn counters(&self) -> MutexGuard<'_, Counters> {
        self.counters.lock().expect("metrics recorder mutex poisoned")
    }

    /// Fold a probe result into the totals and the bounded history.
    pub fn record(&self, result: &HealthCheckResult) {
        let mut counters = self.counters();
        Self::count(&mut counters, result.success, result.timestamp);

        if counters.history.len() == self.history_capacity {
            counters.history.pop_front();
        }
        counters.history.push_back(result.clone());
    }

    /// Count an outcome that has no probe result attached (outbound calls).
    pub fn record_outcome(&self, success: bool) {
        Self::count(&mut self.counters(), success, Utc::now());
    }

    fn count(counters: &mut Counters, success: bool, at: DateTime<Utc>) {
        counters.total += 1;
        if success {
            counters.successful += 1;
            counters.failure_count = 0;
        } else {
            counters.failed += 1;
            counters.failure_count = counters.failure_count.saturating_add(1);
        }
        counters.last_check = Some(at);
    }

    pub fn reset_failure_count(&self) {
        self.counters().failure_count = 0;
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let counters = self.counters();
        MetricsSnapshot {
            timestamp: Utc::now(),
            uptime_ms: u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX),
            total_checks: counters.total,
            successful_checks: counters.successful,
            failed_checks: counters.failed,
            failure_count: counters.failure_count,
            last_health_check: counters.last_check,
            uptime_percentage: uptime_percentage(counters.successful, counters.total),
            health_score: health_score(counters.total, counters.failed, counters.failure_count),
        }
    }

    /// Most recent probe results, oldest first.
    pub fn history(&self) -> Vec<HealthCheckResult> {
        self.counters().history.iter().cloned().collect()
    }

    pub fn history_len(&self) -> usize {
        self.counters().history.len()
    }
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::probe::ProbeErrorKind;

    fn ok() -> HealthCheckResult {
        HealthCheckResult::succeeded(12, None)
    }

    fn failed() -> HealthCheckResult {
        HealthCheckResult::failed(40, ProbeErrorKind::Http(503), "HTTP 503")
    }

    #[test]
    fn test_uptime_percentage_bounds() {
        assert_eq!(uptime_percentage(0, 0), 100.0);
        assert_eq!(uptime_percentage(3, 4), 75.0);
        assert_eq!(uptime_percentage(1, 3), 33.33);
        for total in 1..50u64 {
            for successful in 0..=total {
                let pct = uptime_percentage(successful, total);
                assert!((0.0..=100.0).contains(&pct));
                let exact = successful as f64 / total as f64 * 100.0;
                assert!((pct - exact).abs() < 0.01);
            }
        }
    }

    #[test]
    fn test_health_score_clamped() {
        assert_eq!(health_score(0, 0, 0), 100);
        assert_eq!(health_score(10, 0, 0), 100);
        assert_eq!(health_score(10, 5, 0), 75);
        assert_eq!(health_score(10, 5, 2), 55);
        assert_eq!(health_score(4, 4, 20), 0);
        for total in 0..30u64 {
            for failed in 0..=total {
                for streak in [0u32, 1, 3, 9, 50, u32::MAX] {
                    assert!(health_score(total, failed, streak) <= 100);
                }
            }
        }
    }

    #[test]
    fn test_recording_updates_counters() {
        let recorder = MetricsRecorder::new(10);
        recorder.record(&ok());
        recorder.record(&failed());
        recorder.record(&failed());

        let snapshot = recorder.snapshot();
        assert_eq!(snapshot.total_checks, 3);
        assert_eq!(snapshot.successful_checks, 1);
        assert_eq!(snapshot.failed_checks, 2);
        assert_eq!(snapshot.failure_count, 2);
        assert_eq!(snapshot.uptime_percentage, 33.33);
        assert!(snapshot.last_health_check.is_some());

        recorder.record(&ok());
        assert_eq!(recorder.snapshot().failure_count, 0);
    }

    #[test]
    fn test_history_is_bounded_fifo() {
        let recorder = MetricsRecorder::new(3);
        for i in 0..5u64 {
            recorder.record(&HealthCheckResult::succeeded(i, None));
        }
        let times: Vec<_> = recorder.history().iter().map(|r| r.response_time_ms).collect();
        assert_eq!(times, vec![2, 3, 4]);
        assert_eq!(recorder.snapshot().total_checks, 5);
    }

    #[test]
    fn test_snapshot_json_field_names() {
        let recorder = MetricsRecorder::default();
        recorder.record(&ok());
        let json = serde_json::to_value(recorder.snapshot()).unwrap();
        for key in [
            "timestamp",
            "uptime",
            "totalChecks",
            "successfulChecks",
            "failedChecks",
            "failureCount",
            "lastHealthCheck",
            "uptimePercentage",
            "healthScore",
        ] {
            assert!(json.get(key).is_some(), "missing {}", key);
        }
    }
}
