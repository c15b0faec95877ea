//! Resilience subsystem for outbound calls.
//!
//! # Data Flow
//! ```text
//! ApiRequest → client.rs
//!     → credentials.rs (bearer token, cleared on 401)
//!     → timeouts.rs (deadline per call class)
//!     → On failure: retries.rs (classify, check budget)
//!                   backoff.rs (delay before the next attempt)
//!     → errors.rs (ApiError + user-facing message once retries are exhausted)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every call has a deadline
//! - Retries apply to network errors, timeouts, 5xx and 429 only
//! - Each call owns its retry counter; there is no global budget

pub mod backoff;
pub mod client;
pub mod credentials;
pub mod errors;
pub mod retries;
pub mod timeouts;

pub use backoff::RetryPolicy;
pub use client::{ApiRequest, ApiResponse, CallObserver, ResilientClient};
pub use credentials::{CredentialStore, MemoryCredentials};
pub use errors::{ApiError, ErrorKind, RetryAttempt};
pub use timeouts::CallClass;
