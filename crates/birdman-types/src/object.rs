//! Application objects: transactions and blocks
//!
//! Objects are content-addressed. The identifier is never taken from the
//! sender; it is recomputed from the canonical form of the JSON object as it
//! was received, including any fields the schema below does not describe.

use birdman_crypto::{canonicalize_value, sha256, CryptoError};
use birdman_primitives::ObjectId;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Reference to one output of an earlier transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outpoint {
    /// Id of the transaction holding the output
    pub txid: String,
    /// Output index within that transaction
    pub index: u64,
}

/// Transaction input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionInput {
    /// Output being spent
    pub outpoint: Outpoint,
    /// Signature, 64 bytes hex encoded
    pub sig: String,
}

/// Transaction output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionOutput {
    /// Recipient public key, 32 bytes hex encoded
    pub pubkey: String,
    /// Amount
    pub value: u64,
}

/// Transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Inputs
    pub inputs: Vec<TransactionInput>,
    /// Outputs
    pub outputs: Vec<TransactionOutput>,
}

/// Block creation time, either a JSON number or a decimal string of seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Created {
    /// Seconds since the UNIX epoch
    Seconds(u64),
    /// Seconds since the UNIX epoch, as text
    Text(String),
}

impl Created {
    /// Latest instant a JavaScript `Date` can represent, in seconds.
    pub const MAX_SECONDS: u64 = 8_640_000_000_000;

    /// Timestamp in seconds, if it is a positive value in range.
    pub fn as_seconds(&self) -> Option<u64> {
        let secs = match self {
            Created::Seconds(secs) => *secs,
            Created::Text(text) => {
                if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
                    return None;
                }
                text.parse().ok()?
            }
        };
        (secs > 0 && secs <= Self::MAX_SECONDS).then_some(secs)
    }
}

/// Block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Ids of the transactions confirmed by this block
    pub txids: Vec<String>,
    /// Proof-of-work nonce
    pub nonce: String,
    /// Parent block id, `null` for the genesis block
    pub previd: Option<String>,
    /// Creation time
    pub created: Created,
    /// Proof-of-work target
    #[serde(rename = "T")]
    pub target: String,
    /// Optional miner name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub miner: Option<String>,
    /// Optional free-form note
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Typed schema of an application object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ObjectBody {
    /// Transaction
    Transaction(Transaction),
    /// Block
    Block(Block),
}

impl ObjectBody {
    /// Value of the `type` tag
    pub fn kind(&self) -> &'static str {
        match self {
            ObjectBody::Transaction(_) => "transaction",
            ObjectBody::Block(_) => "block",
        }
    }
}

impl From<Transaction> for ObjectBody {
    fn from(tx: Transaction) -> Self {
        ObjectBody::Transaction(tx)
    }
}

impl From<Block> for ObjectBody {
    fn from(block: Block) -> Self {
        ObjectBody::Block(block)
    }
}

/// Object carried by `object` messages and held in the object store.
///
/// Holds the JSON exactly as received next to its typed view. Identity,
/// storage and relaying all use the received JSON.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationObject {
    body: ObjectBody,
    raw: Value,
}

impl ApplicationObject {
    /// Build an object from its typed form
    pub fn new(body: impl Into<ObjectBody>) -> Result<Self, CryptoError> {
        let body = body.into();
        let raw = serde_json::to_value(&body)?;
        Ok(Self { body, raw })
    }

    /// Interpret a received JSON value, keeping it verbatim
    pub fn from_value(raw: Value) -> Result<Self, serde_json::Error> {
        let body = ObjectBody::deserialize(&raw)?;
        Ok(Self { body, raw })
    }

    /// Typed view
    pub fn body(&self) -> &ObjectBody {
        &self.body
    }

    /// JSON as received
    pub fn as_value(&self) -> &Value {
        &self.raw
    }

    /// Value of the `type` tag
    pub fn kind(&self) -> &'static str {
        self.body.kind()
    }

    /// Canonical JSON form, the hashing preimage
    pub fn canonical_json(&self) -> String {
        canonicalize_value(&self.raw)
    }

    /// Content address of this object
    pub fn id(&self) -> ObjectId {
        sha256(self.canonical_json().as_bytes())
    }
}

impl Serialize for ApplicationObject {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.raw.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ApplicationObject {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        Self::from_value(raw).map_err(serde::de::Error::custom)
    }
}
