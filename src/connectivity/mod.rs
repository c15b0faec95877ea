//! Client-side connectivity subsystem.
//!
//! # Data Flow
//! ```text
//! Inputs:
//!     periodic self-probe (monitor.rs → ConnectivityProbe)
//!     OS online/offline events (notify_os_online / notify_os_offline)
//!     ResilientClient outcomes (CallObserver)
//!         → monitor.rs state machine (state.rs)
//!         → subscribers.rs (synchronous publish to listeners)
//! ```

pub mod monitor;
pub mod state;
pub mod subscribers;

pub use monitor::{ConnectivityMonitor, ConnectivityProbe, EndpointProbe};
pub use state::{ChangeReason, ConnectionQuality, ConnectivityChange, ConnectivityState};
pub use subscribers::{Subscribers, Subscription};
