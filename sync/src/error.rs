use errors::{MirrorError, RemoteError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Remote store error: {0}")]
    Remote(#[from] RemoteError),
    #[error("Local mirror error: {0}")]
    Mirror(#[from] MirrorError),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Internal error: {0}")]
    Internal(String)
}

impl SyncError {
    /// Only an unreachable remote is worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::Remote(err) if err.is_unavailable())
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
