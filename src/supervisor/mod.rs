//! Process supervision subsystem.
//!
//! # Data Flow
//! ```text
//! FailureTracker transition (restart = true)
//!     → restart.rs (single-flight restart sequence)
//!     → process.rs (terminate / spawn / wait_exit capability)
//! ```

pub mod process;
pub mod restart;

pub use process::{ProcessControl, ProcessError, ProcessHandle, SystemProcessControl};
pub use restart::{RestartController, RestartOutcome, RestartStats};
