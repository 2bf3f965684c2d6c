//! # birdman-crypto
//!
//! Hashing primitives for the Birdman gossip node.
//!
//! - SHA-256 hashing
//! - Canonical JSON serialization (the hashing preimage)
//! - Content addressing of serializable values

#![warn(missing_docs)]
#![warn(clippy::all)]

mod canonical;
mod error;
mod hash;

pub use canonical::{canonicalize, canonicalize_value};
pub use error::CryptoError;
pub use hash::{hash_canonical, sha256};
