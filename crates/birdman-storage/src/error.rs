//! Storage error types

use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid data format
    #[error("invalid data format: {0}")]
    InvalidFormat(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;
