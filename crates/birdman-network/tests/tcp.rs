//! End-to-end tests over real TCP sockets

use birdman_network::{NetworkConfig, NetworkService};
use birdman_primitives::PeerAddress;
use birdman_storage::{MemoryLog, ObjectStore, PeerRegistry};
use birdman_types::{ApplicationObject, Message, Transaction, TransactionOutput};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

async fn spawn_service(bootnodes: Vec<PeerAddress>) -> (NetworkService, SocketAddr) {
    let port = free_port();
    let listen: SocketAddr = format!("127.0.0.1:{}", port).parse().unwrap();
    let config = NetworkConfig::default()
        .with_listen_addr(listen)
        .with_advertised_address(PeerAddress::from_socket_addr(listen))
        .with_bootnodes(bootnodes)
        .with_connection_timeout(Duration::from_secs(2));
    let peers = Arc::new(PeerRegistry::open(Arc::new(MemoryLog::new())).unwrap());
    let objects = Arc::new(ObjectStore::open(Arc::new(MemoryLog::new())).unwrap());
    let mut service = NetworkService::new(config, peers, objects);
    let bound = service.start().await.unwrap();
    (service, bound)
}

async fn wait_until(what: &str, cond: impl Fn() -> bool) {
    for _ in 0..250 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("timed out waiting for {}", what);
}

struct Client {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl Client {
    async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (read, writer) = stream.into_split();
        Self {
            lines: BufReader::new(read).lines(),
            writer,
        }
    }

    async fn send_line(&mut self, line: &str) {
        self.writer.write_all(line.as_bytes()).await.unwrap();
        self.writer.write_all(b"\n").await.unwrap();
    }

    async fn recv(&mut self) -> Option<Message> {
        let line = tokio::time::timeout(Duration::from_secs(5), self.lines.next_line())
            .await
            .expect("no reply")
            .unwrap()?;
        Some(Message::decode(&line).unwrap())
    }

    async fn handshake(&mut self) {
        self.send_line(r#"{"type":"hello","version":"0.5.1","agent":"test"}"#).await;
        assert!(matches!(self.recv().await, Some(Message::Hello { .. })));
        assert_eq!(self.recv().await, Some(Message::GetPeers));
    }
}

fn transaction() -> ApplicationObject {
    ApplicationObject::new(Transaction {
        inputs: vec![],
        outputs: vec![TransactionOutput {
            pubkey: "3f".repeat(32),
            value: 50_000_000_000,
        }],
    })
    .unwrap()
}

// ==================== Node to node ====================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_two_services_handshake() {
    let (b, b_addr) = spawn_service(vec![]).await;
    let b_key = PeerAddress::from_socket_addr(b_addr);
    let (a, _a_addr) = spawn_service(vec![b_key.clone()]).await;

    wait_until("both sides established", || {
        !a.connections().is_empty() && !b.connections().is_empty()
    })
    .await;
    assert!(a.peers().has(&b_key.to_string()));

    a.stop();
    b.stop();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_object_propagates_between_services() {
    let (b, b_addr) = spawn_service(vec![]).await;
    let (a, a_addr) = spawn_service(vec![PeerAddress::from_socket_addr(b_addr)]).await;
    wait_until("link up", || {
        !a.connections().is_empty() && !b.connections().is_empty()
    })
    .await;

    let mut client = Client::connect(a_addr).await;
    client.handshake().await;
    let object = transaction();
    let line = Message::Object {
        object: object.clone(),
    }
    .encode()
    .unwrap();
    client.send_line(&line).await;

    let id = object.id();
    wait_until("object on b", || b.objects().has(&id)).await;
    assert!(a.objects().has(&id));

    a.stop();
    b.stop();
}

// ==================== Raw clients ====================

#[tokio::test]
async fn test_garbage_gets_error_and_close() {
    let (service, addr) = spawn_service(vec![]).await;
    let mut client = Client::connect(addr).await;
    client.send_line("not json").await;
    assert_eq!(client.recv().await, Some(Message::error("Could not parse message")));
    assert_eq!(client.recv().await, None);
    service.stop();
}

#[tokio::test]
async fn test_non_hello_first_is_rejected() {
    let (service, addr) = spawn_service(vec![]).await;
    let mut client = Client::connect(addr).await;
    client.send_line(r#"{"type":"getpeers"}"#).await;
    assert_eq!(
        client.recv().await,
        Some(Message::error("Received non-hello message before handshake"))
    );
    assert_eq!(client.recv().await, None);
    assert!(service.peers().is_empty());
    service.stop();
}

#[tokio::test]
async fn test_proxy_preamble_skipped() {
    let (service, addr) = spawn_service(vec![]).await;
    let mut client = Client::connect(addr).await;
    client.send_line("PROXY TCP4 192.0.2.1 192.0.2.2 56324 18018").await;
    client.handshake().await;
    assert_eq!(service.connections().len(), 1);
    service.stop();
}

#[tokio::test]
async fn test_getpeers_and_getobject_round_trip() {
    let (service, addr) = spawn_service(vec![]).await;
    let (id, _) = service.objects().insert(transaction()).unwrap();

    let mut client = Client::connect(addr).await;
    client.handshake().await;

    client.send_line(r#"{"type":"getpeers"}"#).await;
    match client.recv().await {
        Some(Message::Peers { peers }) => {
            assert!(peers.contains(&PeerAddress::from_socket_addr(addr).to_string()));
        }
        other => panic!("unexpected {:?}", other),
    }

    client
        .send_line(&format!(r#"{{"type":"getobject","objectid":"{}"}}"#, id))
        .await;
    assert_eq!(
        client.recv().await,
        Some(Message::Object {
            object: transaction()
        })
    );
    service.stop();
}
