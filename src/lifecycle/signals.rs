//! OS signal handling.
//!
//! # Responsibilities
//! - Register signal handlers (SIGTERM, SIGINT, SIGUSR1, SIGUSR2)
//! - Translate signals to [`SignalEvent`]s on a channel
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - The router only translates; the binary decides what each event does
//! - Non-unix platforms only get Ctrl-C

use std::io;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Internal events produced by OS signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalEvent {
    /// SIGTERM or SIGINT: flush state and exit.
    Shutdown,
    /// SIGUSR1: print the current status.
    StatusDump,
    /// SIGUSR2: probe immediately.
    ForceCheck,
}

/// Install handlers and forward events until the receiver goes away.
#[cfg(unix)]
pub fn spawn_signal_router(events: mpsc::Sender<SignalEvent>) -> io::Result<JoinHandle<()>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut status = signal(SignalKind::user_defined1())?;
    let mut force_check = signal(SignalKind::user_defined2())?;

    Ok(tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                Some(()) = terminate.recv() => {
                    tracing::info!("SIGTERM received, shutting down gracefully");
                    SignalEvent::Shutdown
                }
                Some(()) = interrupt.recv() => {
                    tracing::info!("SIGINT received, shutting down gracefully");
                    SignalEvent::Shutdown
                }
                Some(()) = status.recv() => SignalEvent::StatusDump,
                Some(()) = force_check.recv() => {
                    tracing::info!("SIGUSR2 received, forcing health check");
                    SignalEvent::ForceCheck
                }
                else => break,
            };

            if events.send(event).await.is_err() {
                break;
            }
        }
    }))
}

#[cfg(not(unix))]
pub fn spawn_signal_router(events: mpsc::Sender<SignalEvent>) -> io::Result<JoinHandle<()>> {
    Ok(tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Ctrl-C received, shutting down gracefully");
            let _ = events.send(SignalEvent::Shutdown).await;
        }
    }))
}
