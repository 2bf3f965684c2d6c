//! SHA-256 hashing

use crate::canonical::canonicalize;
use crate::error::CryptoError;
use birdman_primitives::ObjectId;
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Compute SHA-256 hash of the input data
pub fn sha256(data: &[u8]) -> ObjectId {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let result = hasher.finalize();
    ObjectId::from_bytes(result.into())
}

/// Content address of a value: `sha256(canonicalize(value))`.
pub fn hash_canonical<T: Serialize + ?Sized>(value: &T) -> Result<ObjectId, CryptoError> {
    let preimage = canonicalize(value)?;
    Ok(sha256(preimage.as_bytes()))
}
