//! Client-side connectivity state machine.
//!
//! # Responsibilities
//! - Probe the backend on a fixed cadence while reachable
//! - React to OS online/offline events and to real call outcomes
//! - Own the single reconnect timer while offline
//! - Publish every state change to subscribers
//!
//! # Design Decisions
//! - State, quality and the reconnect timer change under one lock, so the
//!   "at most one pending timer" rule holds across concurrent events
//! - Timers carry a generation; a timer that fires after being replaced
//!   does nothing
//! - Listeners run after the lock is released

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use chrono::Utc;
use futures_util::future::BoxFuture;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

use crate::config::ConnectivityConfig;
use crate::connectivity::state::{ChangeReason, ConnectionQuality, ConnectivityChange, ConnectivityState};
use crate::connectivity::subscribers::{Subscribers, Subscription};
use crate::lifecycle::ShutdownSignal;
use crate::observability::metrics;
use crate::resilience::client::{CallObserver, ResilientClient};
use crate::resilience::errors::ErrorKind;

/// One reachability measurement.
pub trait ConnectivityProbe: Send + Sync {
    /// Round-trip latency on success, failure class otherwise.
    fn probe(&self) -> BoxFuture<'_, Result<Duration, ErrorKind>>;
}

/// Probes a path on the backend through the resilient client.
#[derive(Debug)]
pub struct EndpointProbe {
    client: Arc<ResilientClient>,
    path: String,
}

impl EndpointProbe {
    pub fn new(client: Arc<ResilientClient>, path: impl Into<String>) -> Self {
        Self {
            client,
            path: path.into(),
        }
    }
}

impl ConnectivityProbe for EndpointProbe {
    fn probe(&self) -> BoxFuture<'_, Result<Duration, ErrorKind>> {
        Box::pin(async move {
            self.client
                .test_connection(&self.path)
                .await
                .map_err(|e| e.kind)
        })
    }
}

struct ReconnectTimer {
    generation: u64,
    handle: JoinHandle<()>,
}

struct Inner {
    state: ConnectivityState,
    quality: Option<ConnectionQuality>,
    reconnect: Option<ReconnectTimer>,
    next_generation: u64,
}

pub struct ConnectivityMonitor {
    probe: Arc<dyn ConnectivityProbe>,
    check_interval: Duration,
    reconnect_interval: Duration,
    slow_threshold: Duration,
    inner: Mutex<Inner>,
    subscribers: Subscribers<ConnectivityChange>,
    probing: AtomicBool,
    resumed: Notify,
    me: Weak<ConnectivityMonitor>,
}

/// Clears the probing flag when a probe finishes or is cancelled.
struct Probing<'a>(&'a AtomicBool);

impl Drop for Probing<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl ConnectivityMonitor {
    /// Starts `Online`, matching an OS that reports a network.
    pub fn new(probe: Arc<dyn ConnectivityProbe>, config: &ConnectivityConfig) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            probe,
            check_interval: Duration::from_millis(config.check_interval_ms),
            reconnect_interval: Duration::from_millis(config.reconnect_interval_ms),
            slow_threshold: Duration::from_millis(config.slow_threshold_ms),
            inner: Mutex::new(Inner {
                state: ConnectivityState::Online,
                quality: None,
                reconnect: None,
                next_generation: 0,
            }),
            subscribers: Subscribers::new(),
            probing: AtomicBool::new(false),
            resumed: Notify::new(),
            me: me.clone(),
        })
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().expect("connectivity mutex poisoned")
    }

    pub fn state(&self) -> ConnectivityState {
        self.inner().state
    }

    pub fn quality(&self) -> Option<ConnectionQuality> {
        self.inner().quality
    }

    pub fn has_pending_reconnect(&self) -> bool {
        self.inner().reconnect.is_some()
    }

    pub fn subscribe(&self, listener: impl Fn(&ConnectivityChange) + Send + Sync + 'static) -> Subscription {
        self.subscribers.subscribe(listener)
    }

    /// Probe on the configured cadence until shutdown. Ticks are skipped
    /// while offline; the cadence restarts when connectivity returns.
    pub async fn run(self: Arc<Self>, mut shutdown: ShutdownSignal) {
        let mut ticker = time::interval(self.check_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if self.state().is_reachable() {
                        self.check_now().await;
                    } else {
                        tracing::trace!("Offline, periodic probe suspended");
                    }
                }
                _ = self.resumed.notified() => {
                    ticker.reset();
                }
                _ = shutdown.recv() => break,
            }
        }

        self.cancel_reconnect();
        tracing::debug!("Connectivity monitor stopped");
    }

    /// Probe now and fold the outcome in. Skipped if a probe is already
    /// in flight.
    pub async fn check_now(&self) -> ConnectivityState {
        let Some(_probing) = self.begin_probe() else {
            tracing::debug!("Connectivity probe already in flight, skipping");
            return self.state();
        };

        match self.probe.probe().await {
            Ok(latency) => self.apply_success(latency, ChangeReason::ProbeSucceeded),
            Err(kind) => {
                tracing::warn!(kind = %kind, "Connectivity probe failed");
                self.go_offline(ChangeReason::ProbeFailed);
            }
        }
        self.state()
    }

    /// The OS reports the network is gone.
    pub fn notify_os_offline(&self) {
        tracing::warn!("OS reports network offline");
        self.go_offline(ChangeReason::OsOffline);
    }

    /// The OS reports the network is back; confirm with a probe.
    pub async fn notify_os_online(&self) -> ConnectivityState {
        tracing::info!("OS reports network online, verifying");
        self.attempt_reconnect(ChangeReason::OsOnline).await
    }

    fn begin_probe(&self) -> Option<Probing<'_>> {
        if self.probing.swap(true, Ordering::AcqRel) {
            None
        } else {
            Some(Probing(&self.probing))
        }
    }

    async fn attempt_reconnect(&self, reason: ChangeReason) -> ConnectivityState {
        let Some(_probing) = self.begin_probe() else {
            return self.state();
        };

        if !self.state().is_reachable() {
            self.transition(ConnectivityState::Reconnecting, None, reason);
        }

        match self.probe.probe().await {
            Ok(latency) => self.apply_success(latency, reason),
            Err(kind) => {
                tracing::info!(kind = %kind, "Reconnect attempt failed");
                self.go_offline(reason);
            }
        }
        self.state()
    }

    async fn fire_reconnect(&self, generation: u64) {
        {
            let mut inner = self.inner();
            match &inner.reconnect {
                Some(timer) if timer.generation == generation => {
                    inner.reconnect = None;
                }
                _ => return,
            }
        }
        self.attempt_reconnect(ChangeReason::ReconnectAttempt).await;
    }

    fn apply_success(&self, latency: Duration, reason: ChangeReason) {
        let quality = ConnectionQuality::from_latency(latency);
        let (to, reason) = if latency >= self.slow_threshold {
            (ConnectivityState::Degraded, ChangeReason::ProbeSlow)
        } else {
            (ConnectivityState::Online, reason)
        };
        self.transition(to, Some(quality), reason);
    }

    fn go_offline(&self, reason: ChangeReason) {
        self.transition(ConnectivityState::Offline, None, reason);
    }

    /// Apply a state change and its timer side effects, then publish.
    fn transition(&self, to: ConnectivityState, quality: Option<ConnectionQuality>, reason: ChangeReason) {
        let change = {
            let mut inner = self.inner();
            let from = inner.state;
            inner.state = to;
            if quality.is_some() {
                inner.quality = quality;
            }

            match to {
                ConnectivityState::Offline => self.schedule_reconnect(&mut inner),
                ConnectivityState::Online | ConnectivityState::Degraded => {
                    if let Some(timer) = inner.reconnect.take() {
                        timer.handle.abort();
                    }
                }
                ConnectivityState::Reconnecting => {}
            }

            if from == to {
                return;
            }
            ConnectivityChange {
                from,
                to,
                quality: inner.quality,
                reason,
                at: Utc::now(),
            }
        };

        metrics::record_connectivity(change.to);
        tracing::info!(
            from = change.from.as_str(),
            to = change.to.as_str(),
            reason = ?change.reason,
            quality = ?change.quality,
            "Connectivity changed"
        );
        if change.to.is_reachable() && !change.from.is_reachable() {
            self.resumed.notify_one();
        }
        self.subscribers.publish(&change);
    }

    /// Replace any pending reconnect timer with a fresh one.
    fn schedule_reconnect(&self, inner: &mut Inner) {
        if let Some(old) = inner.reconnect.take() {
            old.handle.abort();
        }
        inner.next_generation += 1;
        let generation = inner.next_generation;

        let me = self.me.clone();
        let delay = self.reconnect_interval;
        let handle = tokio::spawn(async move {
            time::sleep(delay).await;
            if let Some(monitor) = me.upgrade() {
                monitor.fire_reconnect(generation).await;
            }
        });

        inner.reconnect = Some(ReconnectTimer { generation, handle });
        tracing::debug!(generation, delay_ms = delay.as_millis() as u64, "Reconnect scheduled");
    }

    fn cancel_reconnect(&self) {
        if let Some(timer) = self.inner().reconnect.take() {
            timer.handle.abort();
        }
    }
}

impl CallObserver for ConnectivityMonitor {
    fn on_success(&self, latency: Duration) {
        if !self.state().is_reachable() {
            self.apply_success(latency, ChangeReason::CallSucceeded);
        }
    }

    fn on_failure(&self, kind: ErrorKind) {
        if matches!(kind, ErrorKind::Network | ErrorKind::Timeout) && self.state().is_reachable() {
            self.go_offline(ChangeReason::CallFailed);
        }
    }
}

impl Drop for ConnectivityMonitor {
    fn drop(&mut self) {
        if let Ok(inner) = self.inner.get_mut() {
            if let Some(timer) = inner.reconnect.take() {
                timer.handle.abort();
            }
        }
    }
}

impl std::fmt::Debug for ConnectivityMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectivityMonitor")
            .field("state", &self.state())
            .field("check_interval", &self.check_interval)
            .field("reconnect_interval", &self.reconnect_interval)
            .finish()
    }
}
