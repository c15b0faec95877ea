//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Probe results and client call outcomes:
//!     → recorder.rs (running counters, bounded history, derived scores)
//!     → snapshot.rs (atomic JSON snapshot on disk)
//!     → metrics.rs  (Prometheus counters and gauges, when enabled)
//!
//! Every subsystem:
//!     → logging.rs (console + bracketed log file)
//! ```
//!
//! # Design Decisions
//! - The snapshot file is overwritten, never appended
//! - The log file is appended, never truncated
//! - Prometheus export is optional; recording without a recorder is free

pub mod logging;
pub mod metrics;
pub mod recorder;
pub mod snapshot;
