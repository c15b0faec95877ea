//! Restart sequence for the supervised process.
//!
//! # Sequence
//! ```text
//! terminate(current pid) → sleep(grace) → spawn(command)
//!     → spawn ok:     record pid, watch exit code in the background
//!     → spawn failed: sleep(grace), spawn once more
//!     → failed again: fatal, no further spawns this episode
//! ```
//!
//! # Design Decisions
//! - Only one restart runs at a time; concurrent triggers are dropped
//! - The fatal latch is cleared only when the episode ends (`rearm`)

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time;

use crate::observability::metrics;
use crate::supervisor::process::ProcessControl;

/// Spawn failures within one episode that make it fatal.
const MAX_SPAWN_FAILURES: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartOutcome {
    /// A replacement is running under `pid`.
    Restarted { pid: u32 },
    /// Another restart is still running.
    AlreadyInProgress,
    /// The episode already went fatal.
    Suppressed,
    /// Spawning failed twice; automatic restarts stop until the episode ends.
    Fatal,
}

/// Counters exposed through the status dump.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestartStats {
    pub restarts_attempted: u64,
    pub successful_spawns: u64,
    pub last_restart: Option<DateTime<Utc>>,
    pub fatal: bool,
    pub current_pid: Option<u32>,
    pub last_exit_code: Option<i32>,
}

#[derive(Debug, Default)]
struct RestartState {
    spawn_failures: u32,
    stats: RestartStats,
}

fn lock(state: &Mutex<RestartState>) -> MutexGuard<'_, RestartState> {
    state.lock().expect("restart state mutex poisoned")
}

/// Terminates and respawns the supervised process.
pub struct RestartController {
    command: String,
    grace_period: Duration,
    control: Arc<dyn ProcessControl>,
    in_progress: tokio::sync::Mutex<()>,
    state: Arc<Mutex<RestartState>>,
}

impl RestartController {
    pub fn new(command: impl Into<String>, grace_period: Duration, control: Arc<dyn ProcessControl>) -> Self {
        Self {
            command: command.into(),
            grace_period,
            control,
            in_progress: tokio::sync::Mutex::new(()),
            state: Arc::new(Mutex::new(RestartState::default())),
        }
    }

    /// Set the pid terminated by the first restart.
    pub fn with_current_pid(self, pid: Option<u32>) -> Self {
        lock(&self.state).stats.current_pid = pid;
        self
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn is_restarting(&self) -> bool {
        self.in_progress.try_lock().is_err()
    }

    pub fn stats(&self) -> RestartStats {
        lock(&self.state).stats.clone()
    }

    /// Clear the per-episode spawn failures and the fatal latch.
    pub fn rearm(&self) {
        let mut state = lock(&self.state);
        if state.stats.fatal {
            tracing::info!("Restart capability re-armed after recovery");
        }
        state.spawn_failures = 0;
        state.stats.fatal = false;
    }

    pub async fn restart(&self) -> RestartOutcome {
        let Ok(_guard) = self.in_progress.try_lock() else {
            tracing::warn!("Restart already in progress, ignoring trigger");
            return RestartOutcome::AlreadyInProgress;
        };

        let previous = {
            let mut state = lock(&self.state);
            if state.stats.fatal {
                tracing::warn!("Restart suppressed: spawning already failed fatally in this episode");
                return RestartOutcome::Suppressed;
            }
            state.stats.restarts_attempted += 1;
            state.stats.last_restart = Some(Utc::now());
            state.stats.current_pid
        };

        metrics::record_restart("attempted");
        tracing::warn!(command = %self.command, "Max failures reached, initiating restart");

        match previous {
            Some(pid) => match self.control.terminate(pid) {
                Ok(()) => tracing::info!(pid, "Sent termination signal"),
                Err(e) => tracing::warn!(pid, error = %e, "Failed to terminate supervised process"),
            },
            None => tracing::debug!("No supervised pid known, skipping termination"),
        }

        time::sleep(self.grace_period).await;

        loop {
            match self.control.spawn(&self.command) {
                Ok(handle) => {
                    let pid = handle.pid();
                    {
                        let mut state = lock(&self.state);
                        state.stats.current_pid = Some(pid);
                        state.stats.successful_spawns += 1;
                    }
                    metrics::record_restart("spawned");
                    tracing::info!(pid, command = %self.command, "Replacement process started");

                    let exit = self.control.wait_exit(handle);
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        match exit.await {
                            Ok(code) => {
                                tracing::info!(pid, exit_code = ?code, "Restarted process exited");
                                let mut state = lock(&state);
                                state.stats.last_exit_code = code;
                                if state.stats.current_pid == Some(pid) {
                                    state.stats.current_pid = None;
                                }
                            }
                            Err(e) => tracing::warn!(pid, error = %e, "Cannot observe restarted process"),
                        }
                    });

                    return RestartOutcome::Restarted { pid };
                }
                Err(e) => {
                    let (failures, fatal) = {
                        let mut state = lock(&self.state);
                        state.spawn_failures += 1;
                        state.stats.fatal = state.spawn_failures >= MAX_SPAWN_FAILURES;
                        (state.spawn_failures, state.stats.fatal)
                    };

                    if fatal {
                        metrics::record_restart("fatal");
                        tracing::error!(
                            failures,
                            error = %e,
                            "FATAL: replacement process failed to spawn twice, automatic restarts stopped for this episode"
                        );
                        return RestartOutcome::Fatal;
                    }

                    metrics::record_restart("spawn_failed");
                    tracing::error!(failures, error = %e, "Failed to spawn replacement process, retrying");
                    time::sleep(self.grace_period).await;
                }
            }
        }
    }
}

impl std::fmt::Debug for RestartController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestartController")
            .field("command", &self.command)
            .field("grace_period", &self.grace_period)
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::supervisor::process::{ProcessError, ProcessHandle};
    use futures_util::future::BoxFuture;
    use std::collections::VecDeque;
    use std::io;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Scripted process control: spawn outcomes are popped from a queue,
    /// defaulting to success. Spawned processes never exit.
    #[derive(Default)]
    pub(crate) struct MockControl {
        pub terminated: Mutex<Vec<u32>>,
        pub spawned: Mutex<Vec<String>>,
        pub spawn_script: Mutex<VecDeque<bool>>,
        next_pid: AtomicU32,
    }

    impl MockControl {
        pub fn failing_spawns(count: usize) -> Self {
            let control = Self::default();
            control.spawn_script.lock().unwrap().extend(std::iter::repeat(false).take(count));
            control
        }

        pub fn spawn_calls(&self) -> usize {
            self.spawned.lock().unwrap().len()
        }
    }

    impl ProcessControl for MockControl {
        fn terminate(&self, pid: u32) -> Result<(), ProcessError> {
            self.terminated.lock().unwrap().push(pid);
            Ok(())
        }

        fn spawn(&self, command: &str) -> Result<ProcessHandle, ProcessError> {
            self.spawned.lock().unwrap().push(command.to_string());
            if self.spawn_script.lock().unwrap().pop_front().unwrap_or(true) {
                Ok(ProcessHandle::detached(1000 + self.next_pid.fetch_add(1, Ordering::SeqCst)))
            } else {
                Err(ProcessError::Spawn {
                    command: command.to_string(),
                    source: io::Error::new(io::ErrorKind::NotFound, "no such command"),
                })
            }
        }

        fn wait_exit(&self, _handle: ProcessHandle) -> BoxFuture<'static, Result<Option<i32>, ProcessError>> {
            Box::pin(futures_util::future::pending())
        }
    }

    fn controller(control: Arc<MockControl>) -> RestartController {
        RestartController::new("npm start", Duration::from_secs(2), control)
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_terminates_waits_and_spawns() {
        let control = Arc::new(MockControl::default());
        let restarts = controller(control.clone()).with_current_pid(Some(77));

        let started = time::Instant::now();
        let outcome = restarts.restart().await;

        assert_eq!(outcome, RestartOutcome::Restarted { pid: 1000 });
        assert!(started.elapsed() >= Duration::from_secs(2));
        assert_eq!(*control.terminated.lock().unwrap(), vec![77]);
        assert_eq!(*control.spawned.lock().unwrap(), vec!["npm start".to_string()]);

        let stats = restarts.stats();
        assert_eq!(stats.restarts_attempted, 1);
        assert_eq!(stats.successful_spawns, 1);
        assert_eq!(stats.current_pid, Some(1000));
        assert!(stats.last_restart.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_restart_terminates_replacement() {
        let control = Arc::new(MockControl::default());
        let restarts = controller(control.clone());

        restarts.restart().await;
        restarts.restart().await;

        assert_eq!(*control.terminated.lock().unwrap(), vec![1000]);
        assert_eq!(restarts.stats().current_pid, Some(1001));
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_spawn_failure_is_retried() {
        let control = Arc::new(MockControl::failing_spawns(1));
        let restarts = controller(control.clone());

        assert!(matches!(restarts.restart().await, RestartOutcome::Restarted { .. }));
        assert_eq!(control.spawn_calls(), 2);
        assert!(!restarts.stats().fatal);
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_spawn_failures_are_fatal_until_rearmed() {
        let control = Arc::new(MockControl::failing_spawns(2));
        let restarts = controller(control.clone());

        assert_eq!(restarts.restart().await, RestartOutcome::Fatal);
        assert_eq!(control.spawn_calls(), 2);
        assert!(restarts.stats().fatal);

        assert_eq!(restarts.restart().await, RestartOutcome::Suppressed);
        assert_eq!(control.spawn_calls(), 2);

        restarts.rearm();
        assert!(matches!(restarts.restart().await, RestartOutcome::Restarted { .. }));
        assert_eq!(control.spawn_calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_trigger_is_dropped() {
        let control = Arc::new(MockControl::default());
        let restarts = Arc::new(controller(control.clone()));

        let first = tokio::spawn({
            let restarts = restarts.clone();
            async move { restarts.restart().await }
        });
        while !restarts.is_restarting() {
            tokio::task::yield_now().await;
        }

        assert_eq!(restarts.restart().await, RestartOutcome::AlreadyInProgress);
        assert!(matches!(first.await.unwrap(), RestartOutcome::Restarted { .. }));
        assert_eq!(control.spawn_calls(), 1);
    }
}
