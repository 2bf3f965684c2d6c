//! Live connections and the fan-out registry

use crate::error::{NetworkError, NetworkResult};
use birdman_primitives::PeerAddress;
use birdman_types::Message;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

/// Process-unique connection number
pub type ConnectionId = u64;

/// One side of a peer connection, as seen by the protocol layer.
pub trait Connection: Send + Sync {
    /// Connection number
    fn id(&self) -> ConnectionId;

    /// Address of the remote peer
    fn address(&self) -> &PeerAddress;

    /// Queue a message for sending
    fn send(&self, message: Message) -> NetworkResult<()>;

    /// Flush queued messages, then terminate the connection
    fn close(&self);
}

/// Work item for a connection's writer task.
#[derive(Debug)]
pub enum Outbound {
    /// Write one message
    Message(Message),
    /// Stop writing and shut the socket down
    Close,
}

/// Connection handle backed by a writer task.
pub struct PeerConnection {
    id: ConnectionId,
    address: PeerAddress,
    sender: mpsc::UnboundedSender<Outbound>,
    closed: watch::Sender<bool>,
}

impl PeerConnection {
    /// Create a handle feeding `sender`
    pub fn new(
        id: ConnectionId,
        address: PeerAddress,
        sender: mpsc::UnboundedSender<Outbound>,
    ) -> Self {
        let (closed, _) = watch::channel(false);
        Self {
            id,
            address,
            sender,
            closed,
        }
    }

    /// Watch for [`Connection::close`] being called
    pub fn closed(&self) -> watch::Receiver<bool> {
        self.closed.subscribe()
    }

    /// Check if the connection has been closed
    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }
}

impl Connection for PeerConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn address(&self) -> &PeerAddress {
        &self.address
    }

    fn send(&self, message: Message) -> NetworkResult<()> {
        if self.is_closed() {
            return Err(NetworkError::ConnectionClosed);
        }
        debug!("Sending {} to {}", message.type_name(), self.address);
        self.sender
            .send(Outbound::Message(message))
            .map_err(|_| NetworkError::ConnectionClosed)
    }

    fn close(&self) {
        if !self.closed.send_replace(true) {
            let _ = self.sender.send(Outbound::Close);
        }
    }
}

/// Set of live, handshaken connections used for gossip fan-out.
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, Arc<dyn Connection>>,
    next_id: AtomicU64,
}

impl ConnectionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Allocate a fresh connection number
    pub fn next_id(&self) -> ConnectionId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Add a connection
    pub fn insert(&self, conn: Arc<dyn Connection>) {
        self.connections.insert(conn.id(), conn);
    }

    /// Remove a connection
    pub fn remove(&self, id: ConnectionId) -> Option<Arc<dyn Connection>> {
        self.connections.remove(&id).map(|(_, conn)| conn)
    }

    /// Check if a connection is registered
    pub fn contains(&self, id: ConnectionId) -> bool {
        self.connections.contains_key(&id)
    }

    /// Number of registered connections
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Snapshot of all registered connections
    pub fn snapshot(&self) -> Vec<Arc<dyn Connection>> {
        self.connections.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Send `message` to every connection except `except`.
    ///
    /// Iterates over a snapshot, so connections added or removed meanwhile
    /// may or may not be reached. Returns the number of successful sends.
    pub fn broadcast_except(&self, except: ConnectionId, message: &Message) -> usize {
        let targets: Vec<Arc<dyn Connection>> = self
            .connections
            .iter()
            .filter(|entry| *entry.key() != except)
            .map(|entry| entry.value().clone())
            .collect();

        let mut sent = 0;
        for conn in targets {
            match conn.send(message.clone()) {
                Ok(()) => sent += 1,
                Err(e) => warn!(
                    "Failed to send {} to {}: {}",
                    message.type_name(),
                    conn.address(),
                    e
                ),
            }
        }
        sent
    }

    /// Close every connection
    pub fn close_all(&self) {
        for conn in self.snapshot() {
            conn.close();
        }
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
