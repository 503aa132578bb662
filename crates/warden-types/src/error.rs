//! Shared error types for the Warden governance layer.

use thiserror::Error;

/// Top-level error type for the Warden system.
#[derive(Error, Debug)]
pub enum WardenError {
    /// A policy bundle failed validation at load time.
    #[error("Invalid policy configuration: {0}")]
    ConfigInvalid(String),

    /// A storage backend could not be reached or mutated.
    #[error("Storage error: {0}")]
    Storage(String),

    /// The requested session has no state on disk.
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// Signing or key reconstruction failed.
    #[error("Signing error: {0}")]
    Signing(String),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// An I/O error occurred.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// An internal error occurred.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for WardenError {
    fn from(e: serde_json::Error) -> Self {
        WardenError::Serialization(e.to_string())
    }
}

/// Alias for Result with WardenError.
pub type WardenResult<T> = Result<T, WardenError>;
