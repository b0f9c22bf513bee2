//! Sync error types.

use littlelemon_storage::StorageError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur while syncing or querying the menu.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The menu could not be fetched (bad status, refused connection, ...).
    #[error("menu fetch failed: {0}")]
    Fetch(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The response did not have the expected shape.
    #[error("unexpected menu format: {0}")]
    Format(String),

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("storage error: {0}")]
    Storage(StorageError),
}

impl SyncError {
    /// Transport failures are worth another attempt; malformed payloads are not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Fetch(_) | Self::Http(_))
    }
}

impl From<StorageError> for SyncError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Unavailable(msg) => Self::StoreUnavailable(msg),
            other => Self::Storage(other),
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        Self::Format(format!("invalid JSON: {err}"))
    }
}
