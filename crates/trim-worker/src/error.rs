//! Worker error types.

use thiserror::Error;
use trim_storage::PublishError;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Invalid request: {0}")]
    Validation(#[from] trim_models::ValidationError),

    #[error("Media error: {0}")]
    Media(#[from] trim_media::MediaError),

    #[error("Storage error: {0}")]
    Storage(#[from] trim_storage::StorageError),

    /// Work was published but local cleanup failed afterwards.
    #[error("Cleanup failed after publishing {url}: {message}")]
    Cleanup { url: String, message: String },

    #[error("Job cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl WorkerError {
    pub fn cleanup(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Cleanup {
            url: url.into(),
            message: message.into(),
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

impl From<PublishError> for WorkerError {
    fn from(err: PublishError) -> Self {
        match err {
            PublishError::Upload(e) => Self::Storage(e),
            PublishError::Cleanup { url, source } => Self::cleanup(url, source.to_string()),
        }
    }
}
