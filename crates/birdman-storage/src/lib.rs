//! # birdman-storage
//!
//! Durable state for the Birdman gossip node.
//!
//! This crate provides:
//! - [`AppendLog`] - line-oriented append-only persistence (file or memory)
//! - [`PeerRegistry`] - known peer addresses, keyed by canonical string
//! - [`ObjectStore`] - content-addressed application objects
//!
//! Both stores replay their log in full when opened and only ever append
//! afterwards. Nothing is rewritten or removed.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod log;
mod objects;
mod peers;

pub use error::{StorageError, StorageResult};
pub use log::{AppendLog, FileLog, MemoryLog};
pub use objects::ObjectStore;
pub use peers::PeerRegistry;

/// File name of the peer log inside the data directory
pub const PEERS_FILENAME: &str = "peers.txt";

/// File name of the object log inside the data directory
pub const OBJECTS_FILENAME: &str = "objects.txt";
