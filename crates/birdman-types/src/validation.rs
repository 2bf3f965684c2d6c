//! Structural validation
//!
//! Pure predicates over decoded messages and objects. Schema-level checks
//! (field presence, JSON types, non-negative integers) already happen during
//! decoding; these rules cover the shapes serde cannot express.

use crate::error::ValidationError;
use crate::message::Message;
use crate::object::{ApplicationObject, Block, ObjectBody, Transaction};
use crate::version::parse_version;
use birdman_primitives::is_hex_bytes;

/// Longest accepted `miner` / `note`
pub const MAX_TEXT_LEN: usize = 128;

const NOT_HASH: &str = "is not a 32-byte hex string";

fn check_hex(
    field: impl Into<String>,
    value: &str,
    bytes: usize,
    reason: &'static str,
) -> Result<(), ValidationError> {
    if is_hex_bytes(value, bytes) {
        Ok(())
    } else {
        Err(ValidationError::new(field, reason))
    }
}

fn check_text(field: &str, value: Option<&str>) -> Result<(), ValidationError> {
    let Some(value) = value else {
        return Ok(());
    };
    if value.len() > MAX_TEXT_LEN {
        return Err(ValidationError::new(field, "is longer than 128 characters"));
    }
    if !value.bytes().all(|b| (0x20..=0x7e).contains(&b)) {
        return Err(ValidationError::new(field, "is not printable ASCII"));
    }
    Ok(())
}

/// Validate a decoded message.
pub fn validate_message(message: &Message) -> Result<(), ValidationError> {
    match message {
        Message::Hello { version, .. } => {
            if parse_version(version).is_none() {
                return Err(ValidationError::new("version", "is not a semantic version"));
            }
            Ok(())
        }
        Message::Error { error } => {
            if error.is_empty() {
                return Err(ValidationError::new("error", "is empty"));
            }
            Ok(())
        }
        Message::GetPeers | Message::Peers { .. } => Ok(()),
        Message::GetObject { objectid } | Message::IHaveObject { objectid } => {
            check_hex("objectid", objectid, 32, NOT_HASH)
        }
        Message::Object { object } => validate_object(object),
    }
}

/// Validate an application object.
pub fn validate_object(object: &ApplicationObject) -> Result<(), ValidationError> {
    match object.body() {
        ObjectBody::Transaction(tx) => validate_transaction(tx),
        ObjectBody::Block(block) => validate_block(block),
    }
}

/// Validate a transaction.
pub fn validate_transaction(tx: &Transaction) -> Result<(), ValidationError> {
    for (i, input) in tx.inputs.iter().enumerate() {
        check_hex(format!("inputs[{}].outpoint.txid", i), &input.outpoint.txid, 32, NOT_HASH)?;
        check_hex(format!("inputs[{}].sig", i), &input.sig, 64, "is not a 64-byte hex string")?;
    }
    for (i, output) in tx.outputs.iter().enumerate() {
        check_hex(format!("outputs[{}].pubkey", i), &output.pubkey, 32, NOT_HASH)?;
    }
    Ok(())
}

/// Validate a block.
pub fn validate_block(block: &Block) -> Result<(), ValidationError> {
    for (i, txid) in block.txids.iter().enumerate() {
        check_hex(format!("txids[{}]", i), txid, 32, NOT_HASH)?;
    }
    check_hex("nonce", &block.nonce, 32, NOT_HASH)?;
    if let Some(previd) = &block.previd {
        check_hex("previd", previd, 32, NOT_HASH)?;
    }
    if block.created.as_seconds().is_none() {
        return Err(ValidationError::new("created", "is not a valid UNIX timestamp"));
    }
    check_hex("T", &block.target, 32, NOT_HASH)?;
    check_text("miner", block.miner.as_deref())?;
    check_text("note", block.note.as_deref())?;
    Ok(())
}
