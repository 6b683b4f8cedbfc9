//! Backend error types
//!
//! Every failure talking to the external service ends up here. None of
//! them are fatal: the view turns them into recoverable notices.

use thiserror::Error;

/// Errors that can occur when talking to the backend service
#[derive(Error, Debug)]
pub enum BackendError {
    /// Connection refused or DNS failure
    #[error("Backend unavailable")]
    Unavailable,

    /// Request did not complete in time
    #[error("Request timeout")]
    Timeout,

    /// Transport-level failure
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Non-success status from the REST or auth API
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    /// Backend asked us to slow down and retries ran out
    #[error("Rate limited")]
    RateLimited,

    /// Missing or rejected credentials
    #[error("Not authorized: {0}")]
    Unauthorized(String),

    /// Response body did not have the expected shape
    #[error("Decode error: {0}")]
    Decode(String),

    /// Realtime channel protocol failure
    #[error("Realtime error: {0}")]
    Realtime(String),

    /// Channel or subscription already closed
    #[error("Subscription closed")]
    Closed,

    /// The task running the call panicked or was cancelled
    #[error("Call aborted: {0}")]
    Aborted(String),
}

impl BackendError {
    /// Whether a retry may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            BackendError::Unavailable | BackendError::Timeout | BackendError::RateLimited => true,
            BackendError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Classify a reqwest error the way the retry loop needs it
    pub(crate) fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            BackendError::Timeout
        } else if err.is_connect() {
            BackendError::Unavailable
        } else {
            BackendError::Request(err)
        }
    }
}

impl From<serde_json::Error> for BackendError {
    fn from(err: serde_json::Error) -> Self {
        BackendError::Decode(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for BackendError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        BackendError::Realtime(err.to_string())
    }
}

/// Result type alias for backend operations
pub type BackendResult<T> = Result<T, BackendError>;
