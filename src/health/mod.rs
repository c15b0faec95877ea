//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! monitor.rs (timer, one probe in flight at most)
//!     → probe.rs (GET health URL, normalize to HealthCheckResult)
//!     → observability::recorder (counters + history)
//!     → state.rs (FailureTracker: Healthy / Degraded / Critical)
//!     → supervisor::restart (once per failure episode)
//!     → observability::snapshot (metrics file)
//! ```
//!
//! # Design Decisions
//! - A probe never errors; every outcome is a tagged result
//! - Any success ends the episode, whatever the prior state
//! - Health state is a pure function of the consecutive-failure count

pub mod monitor;
pub mod probe;
pub mod state;

pub use monitor::{HealthMonitor, MonitorStatus};
pub use probe::{HealthCheckResult, HealthProbe, ProbeErrorKind};
pub use state::{FailureTracker, HealthState};
