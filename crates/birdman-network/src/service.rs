//! TCP transport driving one [`MessageHandler`] per connection

use futures::{SinkExt, StreamExt};
use parking_lot::RwLock;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, error, info, warn};

use crate::codec::{MessageCodec, DEFAULT_MAX_LINE_LENGTH};
use crate::connection::{Connection, ConnectionRegistry, Outbound, PeerConnection};
use crate::error::{NetworkError, NetworkResult};
use crate::handler::{Dialer, MessageHandler, NodeContext};
use birdman_primitives::PeerAddress;
use birdman_storage::{ObjectStore, PeerRegistry};

/// Default listening port
pub const DEFAULT_PORT: u16 = 18018;

/// Default outbound connect timeout
pub const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration for the network service.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Address to listen on
    pub listen_addr: SocketAddr,
    /// Address announced to other peers
    pub advertised_address: Option<PeerAddress>,
    /// Peers registered and dialled at startup
    pub bootnodes: Vec<PeerAddress>,
    /// Longest accepted line in bytes
    pub max_line_length: usize,
    /// Outbound connect timeout
    pub connection_timeout: Duration,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            advertised_address: None,
            bootnodes: Vec::new(),
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            connection_timeout: DEFAULT_CONNECTION_TIMEOUT,
        }
    }
}

impl NetworkConfig {
    /// Sets the listen address.
    pub fn with_listen_addr(mut self, addr: SocketAddr) -> Self {
        self.listen_addr = addr;
        self
    }

    /// Sets the advertised address.
    pub fn with_advertised_address(mut self, addr: PeerAddress) -> Self {
        self.advertised_address = Some(addr);
        self
    }

    /// Sets the bootstrap peers.
    pub fn with_bootnodes(mut self, nodes: Vec<PeerAddress>) -> Self {
        self.bootnodes = nodes;
        self
    }

    /// Sets the maximum line length.
    pub fn with_max_line_length(mut self, max: usize) -> Self {
        self.max_line_length = max;
        self
    }

    /// Sets the connect timeout.
    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }
}

/// Commands to send to the network service.
#[derive(Debug)]
pub enum NetworkCommand {
    /// Connect to a peer
    Connect(PeerAddress),
    /// Shutdown the service
    Shutdown,
}

/// [`Dialer`] that forwards to the service's command loop.
struct CommandDialer {
    tx: mpsc::UnboundedSender<NetworkCommand>,
}

impl Dialer for CommandDialer {
    fn dial(&self, addr: PeerAddress) {
        if self.tx.send(NetworkCommand::Connect(addr)).is_err() {
            debug!("Dial requested after shutdown");
        }
    }
}

/// The gossip node's network service.
pub struct NetworkService {
    config: NetworkConfig,
    ctx: Arc<NodeContext>,
    command_tx: mpsc::UnboundedSender<NetworkCommand>,
    command_rx: Option<mpsc::UnboundedReceiver<NetworkCommand>>,
    shutdown: watch::Sender<bool>,
    running: Arc<RwLock<bool>>,
}

impl NetworkService {
    /// Creates a service over the given stores.
    pub fn new(
        config: NetworkConfig,
        peers: Arc<PeerRegistry>,
        objects: Arc<ObjectStore>,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (shutdown, _) = watch::channel(false);
        let ctx = Arc::new(NodeContext {
            peers,
            objects,
            connections: Arc::new(ConnectionRegistry::new()),
            dialer: Arc::new(CommandDialer {
                tx: command_tx.clone(),
            }),
            advertised: config.advertised_address.clone(),
        });
        Self {
            config,
            ctx,
            command_tx,
            command_rx: Some(command_rx),
            shutdown,
            running: Arc::new(RwLock::new(false)),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    /// Returns the known peers.
    pub fn peers(&self) -> &Arc<PeerRegistry> {
        &self.ctx.peers
    }

    /// Returns the object store.
    pub fn objects(&self) -> &Arc<ObjectStore> {
        &self.ctx.objects
    }

    /// Returns the live handshaken connections.
    pub fn connections(&self) -> &Arc<ConnectionRegistry> {
        &self.ctx.connections
    }

    /// Check if running
    pub fn is_running(&self) -> bool {
        *self.running.read()
    }

    /// Starts listening, registers bootnodes and dials every known peer.
    ///
    /// Returns the bound listen address.
    pub async fn start(&mut self) -> NetworkResult<SocketAddr> {
        if *self.running.read() {
            return Err(NetworkError::AlreadyRunning);
        }
        let command_rx = self.command_rx.take().ok_or(NetworkError::AlreadyRunning)?;

        let listener = TcpListener::bind(&self.config.listen_addr).await?;
        let local_addr = listener.local_addr()?;
        info!("Network service listening on {}", local_addr);
        if let Some(adv) = &self.config.advertised_address {
            info!("Advertising {}", adv);
        }

        *self.running.write() = true;

        let ctx = self.ctx.clone();
        let config = self.config.clone();
        let shutdown = self.shutdown.subscribe();
        tokio::spawn(async move {
            Self::accept_connections(listener, ctx, config, shutdown).await;
        });

        let ctx = self.ctx.clone();
        let config = self.config.clone();
        let shutdown = self.shutdown.subscribe();
        tokio::spawn(async move {
            Self::run_command_loop(command_rx, ctx, config, shutdown).await;
        });

        for node in &self.config.bootnodes {
            self.ctx.peers.set(node.clone())?;
        }
        for addr in self.ctx.peers.addresses() {
            self.ctx.dialer.dial(addr);
        }

        Ok(local_addr)
    }

    /// Stops the service and closes every connection.
    pub fn stop(&self) {
        if !self.is_running() {
            return;
        }
        let _ = self.command_tx.send(NetworkCommand::Shutdown);
        self.shutdown.send_replace(true);
        self.ctx.connections.close_all();
        *self.running.write() = false;
        info!("Network service stopped");
    }

    /// Accepts incoming connections.
    async fn accept_connections(
        listener: TcpListener,
        ctx: Arc<NodeContext>,
        config: NetworkConfig,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        debug!("Accepted connection from {}", addr);
                        let address = PeerAddress::from_socket_addr(addr);
                        tokio::spawn(Self::handle_connection(
                            stream,
                            address,
                            false,
                            ctx.clone(),
                            config.max_line_length,
                            shutdown.clone(),
                        ));
                    }
                    Err(e) => {
                        error!("Accept error: {}", e);
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                },
                _ = shutdown.changed() => break,
            }
        }
        debug!("Accept loop terminated");
    }

    /// Serves dial requests until shutdown.
    async fn run_command_loop(
        mut command_rx: mpsc::UnboundedReceiver<NetworkCommand>,
        ctx: Arc<NodeContext>,
        config: NetworkConfig,
        shutdown: watch::Receiver<bool>,
    ) {
        while let Some(cmd) = command_rx.recv().await {
            match cmd {
                NetworkCommand::Connect(addr) => {
                    if ctx.is_self(&addr) {
                        debug!("Not dialling own address {}", addr);
                        continue;
                    }
                    let ctx = ctx.clone();
                    let timeout = config.connection_timeout;
                    let max_line_length = config.max_line_length;
                    let shutdown = shutdown.clone();
                    tokio::spawn(async move {
                        match Self::dial(&addr, timeout).await {
                            Ok(stream) => {
                                Self::handle_connection(
                                    stream,
                                    addr,
                                    true,
                                    ctx,
                                    max_line_length,
                                    shutdown,
                                )
                                .await
                            }
                            Err(e) => warn!("Failed to connect to {}: {}", addr, e),
                        }
                    });
                }
                NetworkCommand::Shutdown => break,
            }
        }
        info!("Network command loop terminated");
    }

    async fn dial(addr: &PeerAddress, timeout: Duration) -> NetworkResult<TcpStream> {
        info!("Connecting to {}", addr);
        let connect = TcpStream::connect((addr.host(), addr.port()));
        match tokio::time::timeout(timeout, connect).await {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(e)) => Err(NetworkError::ConnectionFailed(e.to_string())),
            Err(_) => Err(NetworkError::Timeout(format!("connecting to {}", addr))),
        }
    }

    /// Handles a single peer connection until either side closes it.
    async fn handle_connection(
        stream: TcpStream,
        address: PeerAddress,
        initiator: bool,
        ctx: Arc<NodeContext>,
        max_line_length: usize,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let id = ctx.connections.next_id();
        let (read_half, write_half) = stream.into_split();
        let mut reader = FramedRead::new(read_half, MessageCodec::with_max_length(max_line_length));
        let mut writer =
            FramedWrite::new(write_half, MessageCodec::with_max_length(max_line_length));

        let (out_tx, mut out_rx) = mpsc::unbounded_channel();
        let peer = Arc::new(PeerConnection::new(id, address.clone(), out_tx));
        let mut closed = peer.closed();
        let conn: Arc<dyn Connection> = peer;
        info!(
            "Connection {} {} {}",
            id,
            if initiator { "to" } else { "from" },
            address
        );

        // Writer task
        let writer_address = address.clone();
        tokio::spawn(async move {
            while let Some(outbound) = out_rx.recv().await {
                match outbound {
                    Outbound::Message(msg) => {
                        if let Err(e) = writer.send(msg).await {
                            debug!("Write to {} failed: {}", writer_address, e);
                            break;
                        }
                    }
                    Outbound::Close => break,
                }
            }
            let _ = writer.close().await;
        });

        let mut handler = match MessageHandler::new(conn.clone(), ctx.clone(), initiator) {
            Ok(handler) => handler,
            Err(e) => {
                warn!("Could not start handshake with {}: {}", address, e);
                conn.close();
                return;
            }
        };

        loop {
            if *closed.borrow() || *shutdown.borrow() {
                break;
            }
            let frame = tokio::select! {
                frame = reader.next() => frame,
                res = closed.changed() => {
                    if res.is_err() {
                        break;
                    }
                    continue;
                }
                res = shutdown.changed() => {
                    if res.is_err() {
                        break;
                    }
                    continue;
                }
            };
            match frame {
                Some(Ok(line)) => {
                    let (returned, result) = match Self::dispatch(handler, line).await {
                        Some(outcome) => outcome,
                        None => break,
                    };
                    handler = returned;
                    if let Err(e) = result {
                        report_failure(conn.as_ref(), e);
                        break;
                    }
                }
                Some(Err(e)) => {
                    warn!("Read error from {}: {}", address, e);
                    break;
                }
                None => {
                    debug!("Peer {} closed the connection", address);
                    break;
                }
            }
        }

        conn.close();
        ctx.connections.remove(id);
        info!("Connection {} with {} closed", id, address);
    }

    /// Runs one line through the handler on the blocking pool, since storing
    /// a new peer or object waits for the log to reach disk.
    async fn dispatch(
        mut handler: MessageHandler,
        line: String,
    ) -> Option<(MessageHandler, NetworkResult<()>)> {
        let task = tokio::task::spawn_blocking(move || {
            let result = handler.handle_line(&line);
            (handler, result)
        });
        match task.await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                error!("Message handler task failed: {}", e);
                None
            }
        }
    }
}

/// Reports a handler failure to the peer where appropriate.
fn report_failure(conn: &dyn Connection, err: NetworkError) {
    match err {
        NetworkError::Protocol(violation) => {
            warn!("Protocol violation by {}: {}", conn.address(), violation);
            if let Err(e) = conn.send(violation.to_message()) {
                debug!("Could not report error to {}: {}", conn.address(), e);
            }
        }
        other => error!("Failed handling message from {}: {}", conn.address(), other),
    }
    conn.close();
}

#[cfg(test)]
mod tests {
    use super::*;
    use birdman_storage::MemoryLog;

    fn stores() -> (Arc<PeerRegistry>, Arc<ObjectStore>) {
        (
            Arc::new(PeerRegistry::open(Arc::new(MemoryLog::new())).unwrap()),
            Arc::new(ObjectStore::open(Arc::new(MemoryLog::new())).unwrap()),
        )
    }

    fn local_config() -> NetworkConfig {
        NetworkConfig::default().with_listen_addr("127.0.0.1:0".parse().unwrap())
    }

    // ==================== Config ====================

    #[test]
    fn test_config_default() {
        let config = NetworkConfig::default();
        assert_eq!(config.listen_addr.port(), DEFAULT_PORT);
        assert_eq!(config.max_line_length, DEFAULT_MAX_LINE_LENGTH);
        assert_eq!(config.connection_timeout, Duration::from_secs(10));
        assert!(config.bootnodes.is_empty());
        assert!(config.advertised_address.is_none());
    }

    #[test]
    fn test_config_builder() {
        let adv = PeerAddress::parse("node.example.com:18018").unwrap();
        let boot = PeerAddress::parse("1.2.3.4:18018").unwrap();
        let config = NetworkConfig::default()
            .with_listen_addr("127.0.0.1:9999".parse().unwrap())
            .with_advertised_address(adv.clone())
            .with_bootnodes(vec![boot.clone()])
            .with_max_line_length(4096)
            .with_connection_timeout(Duration::from_secs(3));
        assert_eq!(config.listen_addr.port(), 9999);
        assert_eq!(config.advertised_address, Some(adv));
        assert_eq!(config.bootnodes, vec![boot]);
        assert_eq!(config.max_line_length, 4096);
        assert_eq!(config.connection_timeout, Duration::from_secs(3));
    }

    // ==================== Lifecycle ====================

    #[tokio::test]
    async fn test_service_start_stop() {
        let (peers, objects) = stores();
        let mut service = NetworkService::new(local_config(), peers, objects);
        assert!(!service.is_running());

        let addr = service.start().await.unwrap();
        assert_ne!(addr.port(), 0);
        assert!(service.is_running());

        service.stop();
        assert!(!service.is_running());
    }

    #[tokio::test]
    async fn test_service_double_start() {
        let (peers, objects) = stores();
        let mut service = NetworkService::new(local_config(), peers, objects);
        service.start().await.unwrap();
        assert!(matches!(service.start().await, Err(NetworkError::AlreadyRunning)));
        service.stop();
    }

    #[tokio::test]
    async fn test_bootnodes_registered_on_start() {
        let (peers, objects) = stores();
        let boot = PeerAddress::parse("127.0.0.1:1").unwrap();
        let config = local_config()
            .with_bootnodes(vec![boot])
            .with_connection_timeout(Duration::from_millis(200));
        let mut service = NetworkService::new(config, peers.clone(), objects);
        service.start().await.unwrap();
        assert!(peers.has("127.0.0.1:1"));
        service.stop();
    }
}
