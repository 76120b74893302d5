//! Error types for the resource store access layer.

use std::time::Duration;

/// Errors that can occur while talking to the resource store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backend could not be reached or answered with a server error.
    #[error("Resource store unavailable: {message}")]
    Unavailable {
        /// Description of the transport-level failure.
        message: String,
    },

    /// The backend answered, but the requested resource does not exist.
    #[error("Resource not found: {resource_type}/{id}")]
    NotFound {
        /// The type of resource that was not found.
        resource_type: String,
        /// The ID of the resource that was not found.
        id: String,
    },

    /// The call exceeded the per-call deadline.
    #[error("Resource store call timed out after {0:?}")]
    Timeout(Duration),

    /// The circuit breaker is open; no network attempt was made.
    #[error("Circuit open, retry in {retry_after_secs}s")]
    CircuitOpen {
        /// Remaining cool-down in whole seconds, for client backoff.
        retry_after_secs: u64,
    },

    /// The record being written is malformed.
    #[error("Invalid record: {message}")]
    InvalidRecord {
        /// Description of why the record is invalid.
        message: String,
    },

    /// A payload could not be serialized or parsed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StoreError {
    /// Creates a new `Unavailable` error.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    /// Creates a new `NotFound` error.
    #[must_use]
    pub fn not_found(resource_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource_type: resource_type.into(),
            id: id.into(),
        }
    }

    /// Creates a new `InvalidRecord` error.
    #[must_use]
    pub fn invalid_record(message: impl Into<String>) -> Self {
        Self::InvalidRecord {
            message: message.into(),
        }
    }

    /// Whether this failure counts toward the circuit breaker.
    ///
    /// The breaker only tracks infrastructure-level failures: transport
    /// errors, 5xx responses and per-call timeouts. Business absence,
    /// malformed payloads and breaker rejections themselves never count.
    /// All call sites go through this one predicate.
    pub fn is_infrastructure_failure(&self) -> bool {
        matches!(self, Self::Unavailable { .. } | Self::Timeout(_))
    }
}

/// Convenience result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
