//! # birdman-network
//!
//! Gossip protocol and TCP transport for the Birdman node.
//!
//! This crate provides:
//! - Line framing of canonical JSON messages
//! - The per-connection handshake and message state machine
//! - Peer discovery and flood announcement of new objects
//! - The TCP listener/dialer driving it all
//!
//! ## Architecture
//!
//! ```text
//! +-------------------+
//! |  NetworkService   |  <- listener, dialer, one task pair per socket
//! +-------------------+
//!          |
//! +-------------------+
//! |  MessageHandler   |  <- one per connection
//! +-------------------+
//!          |
//! +--------------------------------------------------+
//! | PeerRegistry | ObjectStore | ConnectionRegistry  |
//! +--------------------------------------------------+
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! use birdman_network::{NetworkConfig, NetworkService};
//!
//! let config = NetworkConfig::default()
//!     .with_listen_addr("0.0.0.0:18018".parse()?);
//! let mut service = NetworkService::new(config, peers, objects);
//! let bound = service.start().await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod codec;
mod connection;
mod error;
mod handler;
mod service;

pub use codec::{MessageCodec, DEFAULT_MAX_LINE_LENGTH};
pub use connection::{Connection, ConnectionId, ConnectionRegistry, Outbound, PeerConnection};
pub use error::{NetworkError, NetworkResult, ProtocolError};
pub use handler::{Dialer, HandshakeState, MessageHandler, NodeContext};
pub use service::{
    NetworkCommand, NetworkConfig, NetworkService, DEFAULT_CONNECTION_TIMEOUT, DEFAULT_PORT,
};
