//! Network error types

use birdman_storage::StorageError;
use birdman_types::{DecodeError, Message, ValidationError};
use thiserror::Error;

/// Misbehaviour by a remote peer.
///
/// The display text of each variant is exactly what goes out in the `error`
/// message sent before the connection is closed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Line was not JSON
    #[error("Could not parse message")]
    Parse,

    /// Missing or unknown `type`
    #[error("Unsupported message type received")]
    UnsupportedType,

    /// Something other than `hello` arrived first
    #[error("Received non-hello message before handshake")]
    HandshakeRequired,

    /// Payload does not fit the schema or validation rules of its type
    #[error(
        "Received malformed payload for message of type '{message_type}'{}",
        detail_suffix(.detail)
    )]
    Malformed {
        /// Message type discriminant
        message_type: &'static str,
        /// What was wrong
        detail: Option<String>,
    },

    /// `hello` announced a version outside the supported range
    #[error("Unsupported node version received")]
    UnsupportedVersion,
}

fn detail_suffix(detail: &Option<String>) -> String {
    detail.as_ref().map(|d| format!(": {}", d)).unwrap_or_default()
}

impl ProtocolError {
    /// Malformed payload with a validation failure as detail
    pub fn malformed(message_type: &'static str, err: ValidationError) -> Self {
        ProtocolError::Malformed {
            message_type,
            detail: Some(err.to_string()),
        }
    }

    /// The `error` message reporting this violation
    pub fn to_message(&self) -> Message {
        Message::error(self.to_string())
    }
}

impl From<DecodeError> for ProtocolError {
    fn from(err: DecodeError) -> Self {
        match err {
            DecodeError::Parse(_) => ProtocolError::Parse,
            DecodeError::UnsupportedType(_) => ProtocolError::UnsupportedType,
            DecodeError::Malformed {
                message_type,
                detail,
            } => ProtocolError::Malformed {
                message_type,
                detail: Some(detail),
            },
        }
    }
}

/// Errors that can occur in the network layer.
#[derive(Error, Debug)]
pub enum NetworkError {
    /// IO error during network operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Line framing or encoding error
    #[error("Codec error: {0}")]
    Codec(String),

    /// Remote peer broke the protocol
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Peer registry or object store failure
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Connection failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Connect timed out
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Connection already closed
    #[error("Connection closed")]
    ConnectionClosed,

    /// Service already running
    #[error("Service already running")]
    AlreadyRunning,
}

/// Result type for network operations.
pub type NetworkResult<T> = Result<T, NetworkError>;
