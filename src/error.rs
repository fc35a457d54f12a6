//! Error types for the Tollgate engine.

use thiserror::Error;

/// Main error type for Tollgate operations.
#[derive(Error, Debug)]
pub enum TollgateError {
    /// The configured classification field or scope could not be resolved
    /// from the request.
    #[error("request could not be classified: {0}")]
    Unclassifiable(String),

    /// Storage driver errors
    #[error("storage error: {0}")]
    Storage(String),

    /// Token list serialization errors
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Remote counter store errors
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

/// Result type alias for Tollgate operations.
pub type Result<T> = std::result::Result<T, TollgateError>;
