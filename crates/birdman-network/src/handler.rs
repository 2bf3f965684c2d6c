//! Per-connection protocol state machine
//!
//! ```text
//!   AwaitingHandshake --hello--> Established
//! ```
//!
//! The initiating side sends `hello` as soon as the handler is created. The
//! first message accepted from the remote side must be `hello`; anything else
//! is a protocol violation. Once established, the peer is recorded in the
//! registry, the connection joins the gossip fan-out set and `getpeers` is
//! sent to start discovery.

use crate::connection::{Connection, ConnectionRegistry};
use crate::error::{NetworkResult, ProtocolError};
use birdman_primitives::{ObjectId, PeerAddress};
use birdman_storage::{ObjectStore, PeerRegistry};
use birdman_types::{is_supported_version, validate_message, ApplicationObject, Envelope, Message};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Initiates outbound connections on behalf of the protocol layer.
pub trait Dialer: Send + Sync {
    /// Connect to `addr` in the background
    fn dial(&self, addr: PeerAddress);
}

/// Shared state every handler works against.
pub struct NodeContext {
    /// Known peers
    pub peers: Arc<PeerRegistry>,
    /// Known objects
    pub objects: Arc<ObjectStore>,
    /// Live handshaken connections
    pub connections: Arc<ConnectionRegistry>,
    /// Outbound connector
    pub dialer: Arc<dyn Dialer>,
    /// Address this node advertises to others
    pub advertised: Option<PeerAddress>,
}

impl NodeContext {
    /// Check if `addr` is this node's own advertised address
    pub fn is_self(&self, addr: &PeerAddress) -> bool {
        self.advertised.as_ref() == Some(addr)
    }
}

/// Handshake progress of one connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    /// No `hello` accepted yet
    AwaitingHandshake,
    /// `hello` accepted
    Established,
}

/// Protocol handler bound to one connection.
pub struct MessageHandler {
    conn: Arc<dyn Connection>,
    ctx: Arc<NodeContext>,
    state: HandshakeState,
    initiator: bool,
}

impl MessageHandler {
    /// Create a handler. An `initiator` sends `hello` immediately.
    pub fn new(
        conn: Arc<dyn Connection>,
        ctx: Arc<NodeContext>,
        initiator: bool,
    ) -> NetworkResult<Self> {
        if initiator {
            conn.send(Message::hello())?;
        }
        Ok(Self {
            conn,
            ctx,
            state: HandshakeState::AwaitingHandshake,
            initiator,
        })
    }

    /// Current handshake state
    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// Whether this side opened the connection
    pub fn is_initiator(&self) -> bool {
        self.initiator
    }

    /// The connection this handler drives
    pub fn connection(&self) -> &Arc<dyn Connection> {
        &self.conn
    }

    /// Decode and handle one wire line.
    ///
    /// Before the handshake only the `type` is read; a non-`hello` line is
    /// refused without looking at its payload.
    pub fn handle_line(&mut self, line: &str) -> NetworkResult<()> {
        let envelope = Envelope::parse(line).map_err(ProtocolError::from)?;
        self.check_handshake(envelope.message_type())?;
        let message = envelope.decode().map_err(ProtocolError::from)?;
        self.handle_message(message)
    }

    /// Handle one decoded message.
    ///
    /// An `Err` must be reported to the peer (for protocol errors) and the
    /// connection closed by the caller.
    pub fn handle_message(&mut self, message: Message) -> NetworkResult<()> {
        debug!("Received {} from {}", message.type_name(), self.conn.address());

        self.check_handshake(message.type_name())?;

        validate_message(&message).map_err(|e| ProtocolError::malformed(message.type_name(), e))?;

        match message {
            Message::Hello { version, agent } => self.on_hello(&version, agent.as_deref()),
            Message::Error { error } => {
                warn!("Peer {} reported error: {}", self.conn.address(), error);
                self.conn.close();
                Ok(())
            }
            Message::GetPeers => self.on_get_peers(),
            Message::Peers { peers } => self.on_peers(&peers),
            Message::GetObject { objectid } => self.on_get_object(&objectid),
            Message::IHaveObject { objectid } => self.on_i_have_object(&objectid),
            Message::Object { object } => self.on_object(object),
        }
    }

    fn check_handshake(&self, message_type: &str) -> NetworkResult<()> {
        if self.state == HandshakeState::AwaitingHandshake && message_type != "hello" {
            return Err(ProtocolError::HandshakeRequired.into());
        }
        Ok(())
    }

    fn on_hello(&mut self, version: &str, agent: Option<&str>) -> NetworkResult<()> {
        if self.state == HandshakeState::Established {
            debug!("Ignoring repeated hello from {}", self.conn.address());
            return Ok(());
        }
        if !is_supported_version(version) {
            return Err(ProtocolError::UnsupportedVersion.into());
        }

        if !self.initiator {
            self.conn.send(Message::hello())?;
        }
        self.state = HandshakeState::Established;
        info!(
            "Handshake with {} complete (version {}, agent {})",
            self.conn.address(),
            version,
            agent.unwrap_or("unknown")
        );

        self.ctx.connections.insert(self.conn.clone());
        let addr = self.conn.address();
        if addr.is_valid() && !self.ctx.is_self(addr) {
            self.ctx.peers.set(addr.clone())?;
        }

        self.conn.send(Message::GetPeers)
    }

    fn on_get_peers(&self) -> NetworkResult<()> {
        let mut peers = self.ctx.peers.keys();
        if let Some(own) = &self.ctx.advertised {
            let own = own.to_string();
            if !peers.contains(&own) {
                peers.push(own);
            }
        }
        self.conn.send(Message::Peers { peers })
    }

    fn on_peers(&self, peers: &[String]) -> NetworkResult<()> {
        for entry in peers {
            if self.ctx.peers.has(entry) {
                continue;
            }
            let addr = match PeerAddress::parse(entry) {
                Ok(addr) if addr.is_valid() => addr,
                Ok(_) | Err(_) => {
                    warn!("Ignoring invalid peer {:?} from {}", entry, self.conn.address());
                    continue;
                }
            };
            if self.ctx.is_self(&addr) {
                continue;
            }
            if self.ctx.peers.set(addr.clone())? {
                self.ctx.dialer.dial(addr);
            }
        }
        Ok(())
    }

    fn parse_id(objectid: &str, message_type: &'static str) -> NetworkResult<ObjectId> {
        ObjectId::from_hex(objectid).map_err(|e| {
            ProtocolError::Malformed {
                message_type,
                detail: Some(e.to_string()),
            }
            .into()
        })
    }

    fn on_get_object(&self, objectid: &str) -> NetworkResult<()> {
        let id = Self::parse_id(objectid, "getobject")?;
        match self.ctx.objects.get(&id) {
            Some(object) => self.conn.send(Message::Object { object }),
            None => {
                debug!("Peer {} asked for unknown object {}", self.conn.address(), id);
                Ok(())
            }
        }
    }

    fn on_i_have_object(&self, objectid: &str) -> NetworkResult<()> {
        let id = Self::parse_id(objectid, "ihaveobject")?;
        if self.ctx.objects.has(&id) {
            return Ok(());
        }
        self.conn.send(Message::get_object(&id))
    }

    fn on_object(&self, object: ApplicationObject) -> NetworkResult<()> {
        let (id, inserted) = self.ctx.objects.insert(object)?;
        if inserted {
            let reached = self
                .ctx
                .connections
                .broadcast_except(self.conn.id(), &Message::i_have_object(&id));
            debug!("Announced object {} to {} peers", id, reached);
        }
        Ok(())
    }
}
