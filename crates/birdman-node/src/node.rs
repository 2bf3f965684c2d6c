//! Node orchestration for birdman-node

use crate::config::NodeConfig;
use birdman_network::{NetworkError, NetworkService};
use birdman_storage::{
    AppendLog, FileLog, ObjectStore, PeerRegistry, StorageError, OBJECTS_FILENAME, PEERS_FILENAME,
};
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{watch, RwLock};
use tracing::info;

/// Node error types
#[derive(Debug, Error)]
pub enum NodeError {
    /// Storage error
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    /// Network error
    #[error("network error: {0}")]
    Network(#[from] NetworkError),
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for node operations
pub type NodeResult<T> = Result<T, NodeError>;

/// Birdman gossip node
pub struct Node {
    peers: Arc<PeerRegistry>,
    objects: Arc<ObjectStore>,
    network: RwLock<NetworkService>,
    local_addr: RwLock<Option<SocketAddr>>,
    shutdown: watch::Sender<bool>,
}

impl Node {
    /// Create a new node, replaying the peer and object logs from the data directory
    pub fn new(config: NodeConfig) -> NodeResult<Self> {
        std::fs::create_dir_all(&config.datadir)?;

        let peer_log: Arc<dyn AppendLog> =
            Arc::new(FileLog::open(config.datadir.join(PEERS_FILENAME))?);
        let object_log: Arc<dyn AppendLog> =
            Arc::new(FileLog::open(config.datadir.join(OBJECTS_FILENAME))?);

        let peers = Arc::new(PeerRegistry::open(peer_log)?);
        let objects = Arc::new(ObjectStore::open(object_log)?);
        info!(
            "Loaded {} peers and {} objects from {:?}",
            peers.len(),
            objects.len(),
            config.datadir
        );

        let network = NetworkService::new(config.network.clone(), peers.clone(), objects.clone());
        let (shutdown, _) = watch::channel(false);

        Ok(Self {
            peers,
            objects,
            network: RwLock::new(network),
            local_addr: RwLock::new(None),
            shutdown,
        })
    }

    /// Get the peer registry
    pub fn peers(&self) -> &Arc<PeerRegistry> {
        &self.peers
    }

    /// Get the object store
    pub fn objects(&self) -> &Arc<ObjectStore> {
        &self.objects
    }

    /// Bound listen address, once running
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.read().await
    }

    /// Start networking and run until [`Node::stop`] is called
    pub async fn run(&self) -> NodeResult<()> {
        let mut shutdown = self.shutdown.subscribe();
        if *shutdown.borrow() {
            return Ok(());
        }

        let addr = self.network.write().await.start().await?;
        *self.local_addr.write().await = Some(addr);
        info!("Node running on {}", addr);

        while !*shutdown.borrow() {
            if shutdown.changed().await.is_err() {
                break;
            }
        }

        self.network.read().await.stop();
        *self.local_addr.write().await = None;
        info!("Node stopped");
        Ok(())
    }

    /// Stop the node
    pub async fn stop(&self) {
        self.shutdown.send_replace(true);
    }
}
