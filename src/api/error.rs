use thiserror::Error;

use crate::retry::RetryAction;

/// Errors returned by a [`FeedApi`](super::FeedApi) implementation.
///
/// Only [`ApiError::Connection`] is transient; everything else propagates
/// to the caller on the first occurrence.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Not authorized (HTTP {status}): {url}")]
    Unauthorized { status: u16, url: String },

    #[error("HTTP error {status} for {url}")]
    Status { status: u16, url: String },

    #[error("Unexpected response: {0}")]
    Decode(String),

    #[error(transparent)]
    Http(reqwest::Error),
}

impl ApiError {
    /// Classify a reqwest failure. Connect, timeout and mid-body failures
    /// (typically a reset connection) are transient.
    pub fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_connect() || e.is_timeout() || e.is_body() {
            ApiError::Connection(e.to_string())
        } else {
            ApiError::Http(e)
        }
    }

    /// Map a non-success HTTP status to a typed error.
    pub fn from_status(status: u16, url: &str) -> Self {
        match status {
            404 => ApiError::NotFound(url.to_string()),
            401 | 403 => ApiError::Unauthorized {
                status,
                url: url.to_string(),
            },
            _ => ApiError::Status {
                status,
                url: url.to_string(),
            },
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, ApiError::Connection(_))
    }
}

/// Retry classifier shared by every remote call site.
pub fn classify(e: &ApiError) -> RetryAction {
    if e.is_transient() {
        RetryAction::Retry
    } else {
        RetryAction::Abort
    }
}
