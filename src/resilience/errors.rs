//! Error taxonomy for outbound calls.
//!
//! Every failed call is normalized into an [`ApiError`]. Its `Display` is the
//! user-facing message for the status class; transport detail is kept in a
//! private field that is only logged.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Classification of a failed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// No response was received.
    Network,
    /// The per-call deadline passed.
    Timeout,
    /// HTTP 5xx.
    Server,
    /// HTTP 429.
    RateLimited,
    /// HTTP 4xx other than 401 and 429.
    Client,
    /// HTTP 401.
    Auth,
}

impl ErrorKind {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::Network | ErrorKind::Timeout | ErrorKind::Server | ErrorKind::RateLimited
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Network => "network",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Server => "server",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::Client => "client",
            ErrorKind::Auth => "auth",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One failed attempt of a call. Lives only as long as the call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryAttempt {
    pub attempt_number: u32,
    /// Delay slept after this attempt before the next one.
    pub delay_ms: u64,
    pub cause: ErrorKind,
}

/// Message shown to end users for a failure class.
pub fn user_message(kind: ErrorKind, status: Option<u16>) -> &'static str {
    match (kind, status) {
        (ErrorKind::Network, _) => {
            "Unable to reach the server. Please check your internet connection."
        }
        (ErrorKind::Timeout, _) => "The request took too long to complete. Please try again.",
        (_, Some(400)) => "The request was invalid. Please check your input and try again.",
        (_, Some(401)) | (ErrorKind::Auth, _) => "Your session has expired. Please log in again.",
        (_, Some(403)) => "You do not have permission to perform this action.",
        (_, Some(404)) => "The requested resource was not found.",
        (_, Some(429)) | (ErrorKind::RateLimited, _) => {
            "Too many requests. Please wait a moment and try again."
        }
        (ErrorKind::Server, _) => "The server encountered an error. Please try again later.",
        (ErrorKind::Client, _) => "The request could not be completed.",
    }
}

/// Normalized failure of an outbound call.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ApiError {
    pub kind: ErrorKind,
    pub status: Option<u16>,
    /// User-facing message for the status class.
    pub message: &'static str,
    pub is_network_error: bool,
    pub is_timeout_error: bool,
    pub retryable: bool,
    /// Total attempts made, including the first.
    pub attempts: u32,
    /// Failed attempts that were followed by a retry.
    pub retries: Vec<RetryAttempt>,
    pub request_id: String,
    /// Credentials were cleared; the caller should send the user to login.
    pub redirect_to_login: bool,
    detail: String,
}

impl ApiError {
    pub fn new(kind: ErrorKind, status: Option<u16>, detail: impl Into<String>) -> Self {
        Self {
            kind,
            status,
            message: user_message(kind, status),
            is_network_error: kind == ErrorKind::Network,
            is_timeout_error: kind == ErrorKind::Timeout,
            retryable: kind.is_retryable(),
            attempts: 1,
            retries: Vec::new(),
            request_id: String::new(),
            redirect_to_login: kind == ErrorKind::Auth,
            detail: detail.into(),
        }
    }

    /// Internal diagnostic text. Log it, never show it.
    pub fn detail(&self) -> &str {
        &self.detail
    }

    pub(crate) fn with_history(mut self, attempts: u32, retries: Vec<RetryAttempt>, request_id: &str) -> Self {
        self.attempts = attempts;
        self.retries = retries;
        self.request_id = request_id.to_string();
        self
    }
}
