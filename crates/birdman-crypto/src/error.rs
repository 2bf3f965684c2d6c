//! Crypto errors

use thiserror::Error;

/// Hashing or canonicalization error
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Value could not be converted to JSON
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}
