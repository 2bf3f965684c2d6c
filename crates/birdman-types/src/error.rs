//! Decoding and validation errors

use thiserror::Error;

/// A structural rule failed for one field.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("\"{field}\" {reason}")]
pub struct ValidationError {
    /// Path of the offending field, e.g. `inputs[0].sig`
    pub field: String,
    /// What is wrong with it
    pub reason: &'static str,
}

impl ValidationError {
    /// Create a new validation error
    pub fn new(field: impl Into<String>, reason: &'static str) -> Self {
        Self {
            field: field.into(),
            reason,
        }
    }
}

/// Failure to turn one line into a [`crate::Message`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Line is not JSON
    #[error("could not parse message: {0}")]
    Parse(String),

    /// Missing, non-string or unknown `type`
    #[error("unsupported message type: {0:?}")]
    UnsupportedType(Option<String>),

    /// Known `type` but the payload does not fit its schema
    #[error("malformed payload for message of type '{message_type}': {detail}")]
    Malformed {
        /// Message type discriminant
        message_type: &'static str,
        /// Schema mismatch description
        detail: String,
    },
}
