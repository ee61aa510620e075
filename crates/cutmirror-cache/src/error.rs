//! Cache error types.

use thiserror::Error;

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Errors that can occur during cache operations.
///
/// Read paths never surface `Corrupt` or `SchemaMismatch` to callers: both
/// are converted into a miss after the entry is deleted.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Corrupt cache entry: {0}")]
    Corrupt(String),

    #[error("Schema version mismatch: stored {stored}, expected {expected}")]
    SchemaMismatch { stored: u32, expected: u32 },

    #[error("Invalid cache key: {0}")]
    InvalidKey(String),

    #[error("Serialization failed: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Background task failed: {0}")]
    Task(String),
}

impl CacheError {
    pub fn corrupt(msg: impl Into<String>) -> Self {
        Self::Corrupt(msg.into())
    }

    pub fn invalid_key(msg: impl Into<String>) -> Self {
        Self::InvalidKey(msg.into())
    }

    /// Whether the entry should be discarded and recomputed.
    pub fn is_stale_entry(&self) -> bool {
        matches!(
            self,
            CacheError::Corrupt(_) | CacheError::SchemaMismatch { .. } | CacheError::Json(_)
        )
    }
}

impl From<tokio::task::JoinError> for CacheError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::Task(e.to_string())
    }
}
