use carebridge_core::CoreError;
use carebridge_store::StoreError;
use thiserror::Error;
use uuid::Uuid;

/// Errors surfaced by the bulk job pipeline.
#[derive(Debug, Error)]
pub enum BulkError {
    #[error("Job not found: {0}")]
    JobNotFound(Uuid),

    #[error("Unsupported resource type: {0}")]
    UnsupportedResourceType(String),

    #[error("Invalid job request: {0}")]
    InvalidRequest(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl BulkError {
    /// Create a new InvalidRequest error
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }
}

/// Convenience result type for bulk operations.
pub type Result<T> = std::result::Result<T, BulkError>;
