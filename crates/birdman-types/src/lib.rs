//! # birdman-types
//!
//! Wire types for the Birdman gossip protocol.
//!
//! This crate provides:
//! - [`Message`] - the line-delimited JSON control messages
//! - [`ApplicationObject`] - transactions and blocks, identified by content hash
//! - [`validation`] - structural validation rules for both
//! - [`version`] - protocol version constants and the supported range check

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
pub mod message;
pub mod object;
pub mod validation;
pub mod version;

pub use error::{DecodeError, ValidationError};
pub use message::{Envelope, Message};
pub use object::{
    ApplicationObject, Block, Created, ObjectBody, Outpoint, Transaction, TransactionInput,
    TransactionOutput,
};
pub use validation::{validate_block, validate_message, validate_object, validate_transaction};
pub use version::{
    is_supported_version, parse_version, Version, NODE_AGENT, PROTOCOL_VERSION,
    SUPPORTED_VERSION_RANGE,
};
