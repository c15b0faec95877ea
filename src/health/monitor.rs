//! Supervisor loop: probe on a timer, track failures, restart on Critical.
//!
//! # Responsibilities
//! - Probe once at startup and then every `check_interval`
//! - Keep at most one probe in flight (ticks that overlap are skipped)
//! - Fold results into the recorder and the failure tracker
//! - Hand Critical transitions to the restart controller
//! - Persist the metrics snapshot after every probe and at shutdown
//! - On shutdown, let an in-flight check finish before the final write
//!
//! # Design Decisions
//! - The restart runs inside the check that triggered it, so ticks are
//!   skipped until the replacement has been spawned
//! - The tracker lock is never held across an await
//! - Snapshot writers are serialized; the snapshot is taken under the same
//!   lock so a stale view never overwrites a newer one

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use axum::http::uri::InvalidUri;
use serde::Serialize;
use tokio::sync::Notify;
use tokio::time::{self, MissedTickBehavior};

use crate::config::SentinelConfig;
use crate::health::probe::{HealthCheckResult, HealthProbe, HealthReport, ServiceStatus};
use crate::health::state::{FailureTracker, HealthState};
use crate::lifecycle::ShutdownSignal;
use crate::observability::metrics;
use crate::observability::recorder::{MetricsRecorder, MetricsSnapshot};
use crate::observability::snapshot;
use crate::supervisor::{ProcessControl, RestartController, RestartStats};

const BYTES_PER_MB: u64 = 1024 * 1024;

/// Probe results included in the status view, newest first.
const RECENT_CHECKS_IN_STATUS: usize = 5;

const DRAIN_SLACK: Duration = Duration::from_secs(1);

/// Serializable view returned by the status dump and the admin API.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorStatus {
    pub health_check_url: String,
    pub state: HealthState,
    pub consecutive_failures: u32,
    pub max_failures: u32,
    pub uptime: String,
    pub metrics: MetricsSnapshot,
    pub restarts: RestartStats,
    pub history_len: usize,
    pub recent_checks: Vec<HealthCheckResult>,
    pub check_in_flight: bool,
}

/// Clears the in-flight flag when the check finishes or is cancelled and
/// wakes anyone waiting for the monitor to go idle.
struct InFlight<'a> {
    flag: &'a AtomicBool,
    idle: &'a Notify,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
        self.idle.notify_waiters();
    }
}

pub struct HealthMonitor {
    probe: HealthProbe,
    check_interval: Duration,
    memory_warn_bytes: u64,
    metrics_file: PathBuf,
    tracker: Mutex<FailureTracker>,
    recorder: Arc<MetricsRecorder>,
    restarts: RestartController,
    in_flight: AtomicBool,
    idle: Notify,
    drain_timeout: Duration,
    persist_lock: Mutex<()>,
}

impl HealthMonitor {
    pub fn new(config: &SentinelConfig, control: Arc<dyn ProcessControl>) -> Result<Arc<Self>, InvalidUri> {
        let monitor = &config.monitor;
        let probe = HealthProbe::new(&monitor.health_check_url, monitor.probe_timeout())?;
        let restarts = RestartController::new(
            config.restart.command.clone(),
            config.restart.grace_period(),
            control,
        )
        .with_current_pid(config.restart.supervised_pid);

        Ok(Arc::new(Self {
            probe,
            check_interval: monitor.check_interval(),
            memory_warn_bytes: monitor.memory_warn_mb.saturating_mul(BYTES_PER_MB),
            metrics_file: config.files.metrics_file.clone(),
            tracker: Mutex::new(FailureTracker::new(monitor.max_failures)),
            recorder: Arc::new(MetricsRecorder::new(monitor.history_size)),
            restarts,
            in_flight: AtomicBool::new(false),
            idle: Notify::new(),
            // A check can spend the probe timeout plus two grace sleeps in a restart.
            drain_timeout: monitor.probe_timeout() + config.restart.grace_period() * 2 + DRAIN_SLACK,
            persist_lock: Mutex::new(()),
        }))
    }

    fn tracker(&self) -> MutexGuard<'_, FailureTracker> {
        self.tracker.lock().expect("failure tracker mutex poisoned")
    }

    pub fn recorder(&self) -> &Arc<MetricsRecorder> {
        &self.recorder
    }

    pub fn restarts(&self) -> &RestartController {
        &self.restarts
    }

    /// Run until shutdown, then write the final snapshot.
    pub async fn run(self: Arc<Self>, mut shutdown: ShutdownSignal) {
        tracing::info!(
            url = %self.probe.url(),
            interval_ms = self.check_interval.as_millis() as u64,
            max_failures = self.tracker().max_failures(),
            restart_command = %self.restarts.command(),
            "Health monitor started"
        );

        let mut ticker = time::interval(self.check_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.trigger_check();
                }
                _ = shutdown.recv() => break,
            }
        }

        if !self.wait_idle(self.drain_timeout).await {
            tracing::warn!(
                timeout_ms = self.drain_timeout.as_millis() as u64,
                "Health check still in flight at shutdown"
            );
        }
        self.shutdown_flush();
    }

    /// Start a probe in the background. Returns false when one is already
    /// in flight.
    pub fn trigger_check(self: &Arc<Self>) -> bool {
        if self.in_flight.swap(true, Ordering::AcqRel) {
            tracing::warn!("Previous health check still in flight, skipping");
            return false;
        }

        let monitor = Arc::clone(self);
        tokio::spawn(async move {
            let _guard = monitor.in_flight_guard();
            monitor.run_check().await;
        });
        true
    }

    /// Probe and wait for the outcome. `None` when a probe is already in
    /// flight.
    pub async fn check_once(&self) -> Option<HealthCheckResult> {
        if self.in_flight.swap(true, Ordering::AcqRel) {
            tracing::warn!("Previous health check still in flight, skipping");
            return None;
        }
        let _guard = self.in_flight_guard();
        Some(self.run_check().await)
    }

    fn in_flight_guard(&self) -> InFlight<'_> {
        InFlight {
            flag: &self.in_flight,
            idle: &self.idle,
        }
    }

    /// Wait until no check is in flight. Returns false if `limit` passed first.
    pub async fn wait_idle(&self, limit: Duration) -> bool {
        time::timeout(limit, async {
            loop {
                let notified = self.idle.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();
                if !self.is_checking() {
                    return;
                }
                notified.await;
            }
        })
        .await
        .is_ok()
    }

    pub fn is_checking(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    async fn run_check(&self) -> HealthCheckResult {
        let result = self.probe.probe().await;
        self.handle_result(&result).await;
        result
    }

    async fn handle_result(&self, result: &HealthCheckResult) {
        self.recorder.record(result);
        metrics::record_probe(result.success, result.response_time_ms);

        let transition = self.tracker().record(result);
        metrics::record_health_state(transition.to, transition.consecutive_failures);

        if result.success {
            self.log_success(result);
            if transition.recovered() {
                tracing::info!(previous = transition.from.as_str(), "Service recovered");
                self.restarts.rearm();
            }
        } else {
            tracing::warn!(
                failures = transition.consecutive_failures,
                max_failures = self.tracker().max_failures(),
                error_kind = %result.error_kind.map(|k| k.to_string()).unwrap_or_default(),
                error = result.error_detail.as_deref().unwrap_or(""),
                "Health check failed"
            );
        }

        self.persist_metrics();

        if transition.restart {
            self.restarts.restart().await;
        }
    }

    fn log_success(&self, result: &HealthCheckResult) {
        let report = result.body.clone().unwrap_or_default();
        tracing::info!(
            status = ?report.status,
            response_time_ms = result.response_time_ms,
            service_uptime = %report.uptime.map(format_uptime).unwrap_or_else(|| "unknown".to_string()),
            "Health check passed"
        );
        self.inspect_report(&report);
    }

    fn inspect_report(&self, report: &HealthReport) {
        match report.status {
            Some(ServiceStatus::Degraded) => {
                tracing::warn!("Service reports degraded state, monitoring closely")
            }
            Some(ServiceStatus::Unhealthy) => {
                tracing::warn!("Service reports itself unhealthy")
            }
            _ => {}
        }

        if let Some(memory) = &report.memory {
            if memory.used > self.memory_warn_bytes {
                tracing::warn!(used_mb = memory.used / BYTES_PER_MB, "High memory usage");
            }
        }
    }

    fn persist_metrics(&self) {
        let _writer = self.persist_lock.lock().expect("persist mutex poisoned");
        if let Err(e) = snapshot::write_atomic(&self.metrics_file, &self.recorder.snapshot()) {
            tracing::error!(path = %self.metrics_file.display(), error = %e, "Failed to save metrics");
        }
    }

    /// Operator reset: zero the streak and re-arm the restart trigger.
    pub fn reset_failures(&self) {
        self.tracker().reset();
        self.recorder.reset_failure_count();
        self.restarts.rearm();
        metrics::record_health_state(HealthState::Healthy, 0);
        self.persist_metrics();
        tracing::info!("Failure count reset");
    }

    pub fn status(&self) -> MonitorStatus {
        let episode = self.tracker().episode();
        let metrics = self.recorder.snapshot();
        MonitorStatus {
            health_check_url: self.probe.url().to_string(),
            state: episode.state,
            consecutive_failures: episode.consecutive_failures,
            max_failures: self.tracker().max_failures(),
            uptime: format_uptime(metrics.uptime_ms as f64),
            metrics,
            restarts: self.restarts.stats(),
            history_len: self.recorder.history_len(),
            recent_checks: self
                .recorder
                .history()
                .into_iter()
                .rev()
                .take(RECENT_CHECKS_IN_STATUS)
                .collect(),
            check_in_flight: self.is_checking(),
        }
    }

    /// Write the final snapshot. Called once on the way out.
    pub fn shutdown_flush(&self) {
        tracing::info!("Cleaning up monitor");
        self.persist_metrics();
        tracing::info!(path = %self.metrics_file.display(), "Final metrics saved");
        tracing::info!("Monitor shutdown complete");
    }
}

impl std::fmt::Debug for HealthMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthMonitor")
            .field("probe", &self.probe)
            .field("check_interval", &self.check_interval)
            .field("metrics_file", &self.metrics_file)
            .finish()
    }
}

/// Render milliseconds as `Xd Yh Zm Ws`, dropping leading zero units.
pub fn format_uptime(milliseconds: f64) -> String {
    let seconds = if milliseconds.is_finite() && milliseconds > 0.0 {
        (milliseconds / 1000.0) as u64
    } else {
        0
    };
    let (minutes, hours, days) = (seconds / 60, seconds / 3600, seconds / 86_400);

    if days > 0 {
        format!("{}d {}h {}m {}s", days, hours % 24, minutes % 60, seconds % 60)
    } else if hours > 0 {
        format!("{}h {}m {}s", hours, minutes % 60, seconds % 60)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds % 60)
    } else {
        format!("{}s", seconds)
    }
}
