//! # birdman-primitives
//!
//! Primitive types for the Birdman gossip node.
//!
//! This crate provides the two identities everything else is keyed by:
//! - [`ObjectId`]: content hash of an application object
//! - [`PeerAddress`]: canonical `host:port` address of a peer

#![warn(missing_docs)]
#![warn(clippy::all)]

mod address;
mod object_id;

pub use address::{AddressError, AddressFamily, PeerAddress};
pub use object_id::{is_hex_bytes, HashError, ObjectId};
