use thiserror::Error;

use crate::api::ApiError;

/// Per-photo download failure.
///
/// Failures are reported for the single file and never stop other workers.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("Fetching {url}: {source}")]
    Fetch { url: String, source: ApiError },

    #[error("Disk error: {0}")]
    Disk(#[from] std::io::Error),
}

impl DownloadError {
    /// Whether this error is transient and worth retrying.
    ///
    /// Only connectivity failures are; HTTP statuses and local disk errors
    /// would fail the same way again.
    pub fn is_retryable(&self) -> bool {
        match self {
            DownloadError::Fetch { source, .. } => source.is_transient(),
            DownloadError::Disk(_) => false,
        }
    }
}
