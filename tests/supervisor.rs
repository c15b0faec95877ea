//! End-to-end tests for the health monitor and restart supervisor.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::net::TcpListener;

use uptime_sentinel::admin::{self, AdminState};
use uptime_sentinel::config::SentinelConfig;
use uptime_sentinel::health::probe::{ProbeErrorKind, ServiceStatus};
use uptime_sentinel::health::HealthState;
use uptime_sentinel::lifecycle::Shutdown;
use uptime_sentinel::observability::recorder::MetricsSnapshot;
use uptime_sentinel::observability::snapshot::read_snapshot;
use uptime_sentinel::supervisor::{ProcessControl, ProcessError, ProcessHandle};
use uptime_sentinel::HealthMonitor;

mod common;
use common::MockReply;

const HEALTHY_BODY: &str = r#"{"status":"healthy","uptime":12.5,"database":"connected"}"#;

/// Records terminate/spawn calls; spawned processes never exit.
#[derive(Default)]
struct RecordingControl {
    terminated: Mutex<Vec<u32>>,
    spawned: Mutex<Vec<String>>,
    next_pid: AtomicU32,
}

impl RecordingControl {
    fn terminated(&self) -> Vec<u32> {
        self.terminated.lock().unwrap().clone()
    }

    fn spawn_count(&self) -> usize {
        self.spawned.lock().unwrap().len()
    }
}

impl ProcessControl for RecordingControl {
    fn terminate(&self, pid: u32) -> Result<(), ProcessError> {
        self.terminated.lock().unwrap().push(pid);
        Ok(())
    }

    fn spawn(&self, command: &str) -> Result<ProcessHandle, ProcessError> {
        self.spawned.lock().unwrap().push(command.to_string());
        Ok(ProcessHandle::detached(500 + self.next_pid.fetch_add(1, Ordering::SeqCst)))
    }

    fn wait_exit(&self, _handle: ProcessHandle) -> BoxFuture<'static, Result<Option<i32>, ProcessError>> {
        Box::pin(futures_util::future::pending())
    }
}

fn config_for(url: String, dir: &Path, max_failures: u32) -> SentinelConfig {
    let mut config = SentinelConfig::default();
    config.monitor.health_check_url = url;
    config.monitor.max_failures = max_failures;
    config.monitor.probe_timeout_ms = 1_000;
    config.restart.command = "service start".to_string();
    config.restart.grace_period_ms = 10;
    config.restart.supervised_pid = Some(4242);
    config.files.metrics_file = dir.join("metrics.json");
    config
}

#[tokio::test]
async fn test_failure_episode_restarts_once_and_rearms_after_recovery() {
    let healthy = Arc::new(AtomicBool::new(false));
    let flag = healthy.clone();
    let backend = common::start_programmable_backend(move |_, _| {
        if flag.load(Ordering::SeqCst) {
            MockReply::ok(HEALTHY_BODY)
        } else {
            MockReply::status(503, r#"{"error":"down"}"#)
        }
    })
    .await;

    let dir = tempfile::tempdir().unwrap();
    let control = Arc::new(RecordingControl::default());
    let monitor = HealthMonitor::new(&config_for(backend.url("/health"), dir.path(), 3), control.clone()).unwrap();

    for expected in 1..=2u32 {
        let result = monitor.check_once().await.unwrap();
        assert!(!result.success);
        assert_eq!(result.error_kind, Some(ProbeErrorKind::Http(503)));
        let status = monitor.status();
        assert_eq!(status.consecutive_failures, expected);
        assert_eq!(status.state, HealthState::Degraded);
    }
    assert_eq!(control.spawn_count(), 0);

    monitor.check_once().await.unwrap();
    assert_eq!(monitor.status().state, HealthState::Critical);
    assert_eq!(control.terminated(), vec![4242]);
    assert_eq!(control.spawn_count(), 1);

    // Still critical: no further restarts in the same episode.
    monitor.check_once().await.unwrap();
    monitor.check_once().await.unwrap();
    assert_eq!(control.spawn_count(), 1);
    assert_eq!(monitor.status().consecutive_failures, 5);

    healthy.store(true, Ordering::SeqCst);
    let result = monitor.check_once().await.unwrap();
    assert!(result.success);
    let status = monitor.status();
    assert_eq!(status.state, HealthState::Healthy);
    assert_eq!(status.consecutive_failures, 0);

    healthy.store(false, Ordering::SeqCst);
    for _ in 0..3 {
        monitor.check_once().await.unwrap();
    }
    assert_eq!(control.spawn_count(), 2);
    // The second restart terminates the process spawned by the first.
    assert_eq!(control.terminated(), vec![4242, 500]);

    let stats = monitor.restarts().stats();
    assert_eq!(stats.restarts_attempted, 2);
    assert_eq!(stats.current_pid, Some(501));
    // Newest first: three failures, the recovery, then the tail of the first episode.
    let recent: Vec<bool> = monitor.status().recent_checks.iter().map(|r| r.success).collect();
    assert_eq!(recent, vec![false, false, false, true, false]);
}

#[tokio::test]
async fn test_overlapping_check_is_skipped() {
    let backend = common::start_programmable_backend(|_, _| {
        MockReply::ok(HEALTHY_BODY).delayed(Duration::from_millis(300))
    })
    .await;

    let dir = tempfile::tempdir().unwrap();
    let monitor = HealthMonitor::new(
        &config_for(backend.url("/health"), dir.path(), 3),
        Arc::new(RecordingControl::default()),
    )
    .unwrap();

    assert!(monitor.trigger_check());
    assert!(monitor.is_checking());
    assert!(!monitor.trigger_check());
    assert!(monitor.check_once().await.is_none());

    tokio::time::timeout(Duration::from_secs(5), async {
        while monitor.is_checking() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .unwrap();

    assert_eq!(backend.request_count(), 1);
    assert_eq!(monitor.recorder().snapshot().total_checks, 1);
}

#[tokio::test]
async fn test_probe_classifies_failures() {
    let dir = tempfile::tempdir().unwrap();
    let control = Arc::new(RecordingControl::default());

    let slow = common::start_programmable_backend(|_, _| {
        MockReply::ok(HEALTHY_BODY).delayed(Duration::from_millis(800))
    })
    .await;
    let mut config = config_for(slow.url("/health"), dir.path(), 3);
    config.monitor.probe_timeout_ms = 100;
    let monitor = HealthMonitor::new(&config, control.clone()).unwrap();
    let result = monitor.check_once().await.unwrap();
    assert_eq!(result.error_kind, Some(ProbeErrorKind::Timeout));

    let garbage = common::start_fixed_backend(200, "<html>ok</html>").await;
    let monitor = HealthMonitor::new(&config_for(garbage.url("/health"), dir.path(), 3), control.clone()).unwrap();
    let result = monitor.check_once().await.unwrap();
    assert!(!result.success);
    assert_eq!(result.error_kind, Some(ProbeErrorKind::InvalidBody));

    let refused = common::closed_port_url("/health").await;
    let monitor = HealthMonitor::new(&config_for(refused, dir.path(), 3), control).unwrap();
    let result = monitor.check_once().await.unwrap();
    assert_eq!(result.error_kind, Some(ProbeErrorKind::Network));
}

#[tokio::test]
async fn test_degraded_payload_counts_as_success() {
    let backend = common::start_fixed_backend(
        200,
        r#"{"status":"degraded","memory":{"used":900000000,"total":1000000000}}"#,
    )
    .await;

    let dir = tempfile::tempdir().unwrap();
    let monitor = HealthMonitor::new(
        &config_for(backend.url("/health"), dir.path(), 3),
        Arc::new(RecordingControl::default()),
    )
    .unwrap();

    let result = monitor.check_once().await.unwrap();
    assert!(result.success);
    let report = result.body.unwrap();
    assert_eq!(report.status, Some(ServiceStatus::Degraded));
    assert_eq!(report.memory.unwrap().used, 900_000_000);
    assert_eq!(monitor.status().state, HealthState::Healthy);

    let request = &backend.requests()[0];
    assert_eq!(request.method, "GET");
    assert_eq!(request.path, "/health");
}

#[tokio::test]
async fn test_metrics_snapshot_persisted_each_check_and_on_shutdown() {
    let backend = common::start_programmable_backend(|index, _| {
        if index == 0 {
            MockReply::ok(HEALTHY_BODY)
        } else {
            MockReply::status(500, "{}")
        }
    })
    .await;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("metrics.json");
    let mut config = config_for(backend.url("/health"), dir.path(), 3);
    config.monitor.check_interval_ms = 60_000;
    let monitor = HealthMonitor::new(&config, Arc::new(RecordingControl::default())).unwrap();

    monitor.check_once().await.unwrap();
    let snapshot: MetricsSnapshot = read_snapshot(&path).unwrap();
    assert_eq!(snapshot.total_checks, 1);
    assert_eq!(snapshot.successful_checks, 1);
    assert_eq!(snapshot.health_score, 100);

    monitor.check_once().await.unwrap();
    let snapshot: MetricsSnapshot = read_snapshot(&path).unwrap();
    assert_eq!(snapshot.total_checks, 2);
    assert_eq!(snapshot.failed_checks, 1);
    assert_eq!(snapshot.failure_count, 1);
    assert!((snapshot.uptime_percentage - 50.0).abs() < 0.01);

    std::fs::remove_file(&path).unwrap();
    let shutdown = Shutdown::new();
    let task = tokio::spawn(monitor.clone().run(shutdown.subscribe()));
    // The first tick fires immediately; let it finish before stopping.
    tokio::time::sleep(Duration::from_millis(200)).await;
    shutdown.trigger();
    tokio::time::timeout(Duration::from_secs(5), task).await.unwrap().unwrap();

    let snapshot: MetricsSnapshot = read_snapshot(&path).unwrap();
    assert_eq!(snapshot.total_checks, 3);
}

#[tokio::test]
async fn test_admin_api_over_http() {
    let backend = common::start_fixed_backend(200, HEALTHY_BODY).await;
    let dir = tempfile::tempdir().unwrap();
    let monitor = HealthMonitor::new(
        &config_for(backend.url("/health"), dir.path(), 3),
        Arc::new(RecordingControl::default()),
    )
    .unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let server = tokio::spawn(admin::serve(
        listener,
        AdminState::new(monitor.clone(), "test-key"),
        shutdown.subscribe(),
    ));

    let client = reqwest::Client::new();
    let response = client
        .post(format!("http://{}/admin/check", addr))
        .bearer_auth("test-key")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::ACCEPTED);

    tokio::time::timeout(Duration::from_secs(5), async {
        while monitor.recorder().snapshot().total_checks == 0 {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .unwrap();

    let status: serde_json::Value = client
        .get(format!("http://{}/admin/status", addr))
        .bearer_auth("test-key")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["state"], "healthy");
    assert_eq!(status["metrics"]["totalChecks"], 1);

    let response = client
        .get(format!("http://{}/admin/metrics", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::UNAUTHORIZED);

    shutdown.trigger();
    tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_shutdown_waits_for_in_flight_check_before_final_snapshot() {
    let backend = common::start_programmable_backend(|_, _| {
        MockReply::ok(HEALTHY_BODY).delayed(Duration::from_millis(400))
    })
    .await;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("metrics.json");
    let mut config = config_for(backend.url("/health"), dir.path(), 3);
    config.monitor.check_interval_ms = 60_000;
    let monitor = HealthMonitor::new(&config, Arc::new(RecordingControl::default())).unwrap();

    let shutdown = Shutdown::new();
    let task = tokio::spawn(monitor.clone().run(shutdown.subscribe()));

    // The immediate first tick is now waiting on the slow endpoint.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(monitor.is_checking());
    shutdown.trigger();
    tokio::time::timeout(Duration::from_secs(5), task).await.unwrap().unwrap();

    assert!(!monitor.is_checking());
    let snapshot: MetricsSnapshot = read_snapshot(&path).unwrap();
    assert_eq!(snapshot.total_checks, 1);
    assert_eq!(snapshot.successful_checks, 1);
}
