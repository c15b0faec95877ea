//! Retry classification.
//!
//! # Responsibilities
//! - Map HTTP statuses and transport failures onto [`ErrorKind`]
//! - Decide whether another attempt is allowed
//!
//! # Design Decisions
//! - Connection errors, timeouts, 5xx and 429 are retryable
//! - 401 is never retried; it invalidates credentials instead
//! - The attempt budget is per call, never shared

use reqwest::StatusCode;

use crate::resilience::errors::ErrorKind;

/// Classify a response status. `None` means success.
pub fn classify_status(status: StatusCode) -> Option<ErrorKind> {
    if status.is_success() || status.is_redirection() || status.is_informational() {
        return None;
    }
    Some(match status.as_u16() {
        401 => ErrorKind::Auth,
        429 => ErrorKind::RateLimited,
        500..=599 => ErrorKind::Server,
        _ => ErrorKind::Client,
    })
}

/// Classify a transport-level failure (no usable response).
pub fn classify_transport(error: &reqwest::Error) -> ErrorKind {
    if error.is_timeout() {
        ErrorKind::Timeout
    } else {
        ErrorKind::Network
    }
}

/// Whether attempt `attempt` (1-based) that failed with `kind` may be retried.
pub fn should_retry(kind: ErrorKind, attempt: u32, max_attempts: u32) -> bool {
    kind.is_retryable() && attempt < max_attempts
}
