//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → SignalEvent::Shutdown   → shutdown.rs trigger
//!     SIGUSR1        → SignalEvent::StatusDump → print status
//!     SIGUSR2        → SignalEvent::ForceCheck → immediate probe
//!
//! Shutdown (shutdown.rs):
//!     trigger → monitor loop exits → final snapshot → admin server drains → exit 0
//! ```

pub mod shutdown;
pub mod signals;

pub use shutdown::{Shutdown, ShutdownSignal};
pub use signals::{spawn_signal_router, SignalEvent};
