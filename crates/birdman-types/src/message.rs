//! Wire messages
//!
//! Every line on the wire is one JSON object whose `type` field selects one
//! of the [`Message`] variants below.

use crate::error::DecodeError;
use crate::object::ApplicationObject;
use crate::version::{NODE_AGENT, PROTOCOL_VERSION};
use birdman_crypto::{canonicalize, CryptoError};
use birdman_primitives::ObjectId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Gossip protocol message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Message {
    /// Handshake
    Hello {
        /// Protocol version of the sender
        version: String,
        /// Free-form client name
        #[serde(default, skip_serializing_if = "Option::is_none")]
        agent: Option<String>,
    },
    /// Error report; the sender closes the connection afterwards
    Error {
        /// Description
        error: String,
    },
    /// Request for the peer list
    GetPeers,
    /// Known peer addresses
    Peers {
        /// Canonical `host:port` strings
        peers: Vec<String>,
    },
    /// Request for one object body
    GetObject {
        /// Hex object id
        objectid: String,
    },
    /// Announcement that the sender holds an object
    IHaveObject {
        /// Hex object id
        objectid: String,
    },
    /// Object body
    Object {
        /// The object
        object: ApplicationObject,
    },
}

impl Message {
    /// All `type` discriminants this node understands
    pub const TYPES: [&'static str; 7] = [
        "hello",
        "error",
        "getpeers",
        "peers",
        "getobject",
        "ihaveobject",
        "object",
    ];

    /// This node's own `hello`
    pub fn hello() -> Self {
        Message::Hello {
            version: PROTOCOL_VERSION.to_string(),
            agent: Some(NODE_AGENT.to_string()),
        }
    }

    /// `error` message with the given text
    pub fn error(error: impl Into<String>) -> Self {
        Message::Error {
            error: error.into(),
        }
    }

    /// `getobject` for an id
    pub fn get_object(id: &ObjectId) -> Self {
        Message::GetObject {
            objectid: id.to_hex(),
        }
    }

    /// `ihaveobject` for an id
    pub fn i_have_object(id: &ObjectId) -> Self {
        Message::IHaveObject {
            objectid: id.to_hex(),
        }
    }

    /// The `type` discriminant
    pub fn type_name(&self) -> &'static str {
        match self {
            Message::Hello { .. } => "hello",
            Message::Error { .. } => "error",
            Message::GetPeers => "getpeers",
            Message::Peers { .. } => "peers",
            Message::GetObject { .. } => "getobject",
            Message::IHaveObject { .. } => "ihaveobject",
            Message::Object { .. } => "object",
        }
    }

    /// Decode one line.
    ///
    /// Fails with [`DecodeError::Parse`] if the line is not JSON, with
    /// [`DecodeError::UnsupportedType`] if `type` is missing or unknown, and
    /// with [`DecodeError::Malformed`] if the payload does not match the
    /// schema of its type.
    pub fn decode(line: &str) -> Result<Self, DecodeError> {
        Envelope::parse(line)?.decode()
    }

    /// Canonical JSON form, without the trailing newline
    pub fn encode(&self) -> Result<String, CryptoError> {
        canonicalize(self)
    }
}

/// A line parsed as JSON whose `type` is known, before its payload is read.
///
/// Lets a caller act on the message type (for example, to refuse anything
/// but `hello` on a fresh connection) without deserializing the body.
#[derive(Debug, Clone)]
pub struct Envelope {
    message_type: &'static str,
    value: Value,
}

impl Envelope {
    /// Parse `line` and look up its `type`.
    pub fn parse(line: &str) -> Result<Self, DecodeError> {
        let value: Value =
            serde_json::from_str(line).map_err(|e| DecodeError::Parse(e.to_string()))?;

        let message_type = match value.get("type") {
            Some(Value::String(t)) => Message::TYPES
                .iter()
                .copied()
                .find(|known| *known == t.as_str())
                .ok_or_else(|| DecodeError::UnsupportedType(Some(t.clone())))?,
            _ => return Err(DecodeError::UnsupportedType(None)),
        };

        Ok(Self {
            message_type,
            value,
        })
    }

    /// The `type` discriminant
    pub fn message_type(&self) -> &'static str {
        self.message_type
    }

    /// Deserialize the payload against the schema of its type.
    pub fn decode(self) -> Result<Message, DecodeError> {
        let message_type = self.message_type;
        serde_json::from_value(self.value).map_err(|e| DecodeError::Malformed {
            message_type,
            detail: e.to_string(),
        })
    }
}
