//! In-memory gossip mesh tests
//!
//! Handlers are wired together through a shared FIFO instead of sockets, so
//! propagation is deterministic and can be pumped to quiescence.

use birdman_network::{
    Connection, ConnectionId, ConnectionRegistry, Dialer, MessageCodec, MessageHandler,
    NetworkError, NetworkResult, NodeContext,
};
use birdman_primitives::PeerAddress;
use birdman_storage::{MemoryLog, ObjectStore, PeerRegistry};
use birdman_types::{ApplicationObject, Block, Created, Message};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

type Wire = Arc<Mutex<VecDeque<(usize, String)>>>;

struct MemoryConnection {
    id: ConnectionId,
    address: PeerAddress,
    target: Option<usize>,
    wire: Wire,
    closed: AtomicBool,
}

impl Connection for MemoryConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn address(&self) -> &PeerAddress {
        &self.address
    }

    fn send(&self, message: Message) -> NetworkResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(NetworkError::ConnectionClosed);
        }
        let line = MessageCodec::encode_message(&message)?;
        if let Some(target) = self.target {
            self.wire.lock().push_back((target, line.trim_end().to_string()));
        }
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct RecordingDialer {
    dialed: Mutex<Vec<String>>,
}

impl Dialer for RecordingDialer {
    fn dial(&self, addr: PeerAddress) {
        self.dialed.lock().push(addr.to_string());
    }
}

fn address(node: usize) -> PeerAddress {
    PeerAddress::parse(&format!("10.0.0.{}:18018", node + 1)).unwrap()
}

struct Mesh {
    nodes: Vec<Arc<NodeContext>>,
    dialers: Vec<Arc<RecordingDialer>>,
    handlers: Vec<MessageHandler>,
    wire: Wire,
}

impl Mesh {
    fn new(n: usize) -> Self {
        let mut mesh = Mesh {
            nodes: Vec::new(),
            dialers: Vec::new(),
            handlers: Vec::new(),
            wire: Wire::default(),
        };
        for _ in 0..n {
            mesh.add_node();
        }
        for a in 0..n {
            for b in (a + 1)..n {
                mesh.link(a, b);
            }
        }
        mesh
    }

    fn add_node(&mut self) -> usize {
        let index = self.nodes.len();
        let dialer = Arc::new(RecordingDialer::default());
        self.nodes.push(Arc::new(NodeContext {
            peers: Arc::new(PeerRegistry::open(Arc::new(MemoryLog::new())).unwrap()),
            objects: Arc::new(ObjectStore::open(Arc::new(MemoryLog::new())).unwrap()),
            connections: Arc::new(ConnectionRegistry::new()),
            dialer: dialer.clone(),
            advertised: Some(address(index)),
        }));
        self.dialers.push(dialer);
        index
    }

    fn connection(
        &self,
        id: usize,
        address: PeerAddress,
        target: Option<usize>,
    ) -> Arc<MemoryConnection> {
        Arc::new(MemoryConnection {
            id: id as ConnectionId,
            address,
            target,
            wire: self.wire.clone(),
            closed: AtomicBool::new(false),
        })
    }

    /// `a` dials `b`
    fn link(&mut self, a: usize, b: usize) {
        let out_link = self.handlers.len();
        let in_link = out_link + 1;
        let out_conn = self.connection(out_link, address(b), Some(in_link));
        let in_conn = self.connection(in_link, address(a), Some(out_link));
        let initiator = MessageHandler::new(out_conn, self.nodes[a].clone(), true).unwrap();
        let responder = MessageHandler::new(in_conn, self.nodes[b].clone(), false).unwrap();
        self.handlers.push(initiator);
        self.handlers.push(responder);
    }

    /// Deliver `object` to `node` from an outside client.
    fn inject(&mut self, node: usize, object: &ApplicationObject) {
        let link = self.handlers.len();
        let client = PeerAddress::parse("10.9.9.9:18018").unwrap();
        let conn = self.connection(link, client, None);
        let mut handler = MessageHandler::new(conn, self.nodes[node].clone(), false).unwrap();
        handler.handle_message(Message::hello()).unwrap();
        handler
            .handle_message(Message::Object {
                object: object.clone(),
            })
            .unwrap();
        self.handlers.push(handler);
    }

    /// Deliver queued lines until nothing is left in flight.
    fn pump(&mut self) -> Vec<String> {
        let mut delivered = Vec::new();
        loop {
            let next = self.wire.lock().pop_front();
            let Some((link, line)) = next else {
                break;
            };
            if let Err(e) = self.handlers[link].handle_line(&line) {
                panic!("link {} rejected {}: {}", link, line, e);
            }
            delivered.push(line);
            assert!(delivered.len() < 1_000, "gossip did not terminate");
        }
        delivered
    }
}

fn block() -> ApplicationObject {
    ApplicationObject::new(Block {
        txids: vec![],
        nonce: "0".repeat(63) + "7",
        previd: None,
        created: Created::Seconds(1_671_062_400),
        target: format!("00000000abc{}", "0".repeat(53)),
        miner: Some("Marabu".into()),
        note: Some("The New York Times 2022-12-13".into()),
    })
    .unwrap()
}

fn count_type(lines: &[String], message_type: &str) -> usize {
    lines
        .iter()
        .filter(|line| {
            let value: serde_json::Value = serde_json::from_str(line).unwrap();
            value["type"] == message_type
        })
        .count()
}

// ==================== Handshake ====================

#[test]
fn test_mesh_handshake_registers_all_peers() {
    let mut mesh = Mesh::new(3);
    let delivered = mesh.pump();

    assert_eq!(count_type(&delivered, "hello"), 6);
    for (i, node) in mesh.nodes.iter().enumerate() {
        assert_eq!(node.connections.len(), 2, "node {}", i);
        for j in 0..3 {
            if i != j {
                assert!(node.peers.has(&address(j).to_string()), "node {} misses {}", i, j);
            }
        }
        assert!(!node.peers.has(&address(i).to_string()));
    }
}

#[test]
fn test_readvertised_peers_dialed_at_most_once() {
    let mut mesh = Mesh::new(3);
    mesh.pump();
    for dialer in &mesh.dialers {
        let dialed = dialer.dialed.lock().clone();
        let mut unique = dialed.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), dialed.len());
    }
}

// ==================== Discovery ====================

#[test]
fn test_new_node_discovers_mesh_through_one_peer() {
    let mut mesh = Mesh::new(3);
    mesh.pump();

    let newcomer = mesh.add_node();
    mesh.link(newcomer, 0);
    mesh.pump();

    let mut dialed = mesh.dialers[newcomer].dialed.lock().clone();
    dialed.sort();
    assert_eq!(dialed, vec![address(1).to_string(), address(2).to_string()]);
    assert!(mesh.nodes[newcomer].peers.has(&address(1).to_string()));
}

// ==================== Propagation ====================

#[test]
fn test_object_reaches_every_node() {
    let mut mesh = Mesh::new(3);
    mesh.pump();

    let object = block();
    let id = object.id();
    mesh.inject(0, &object);
    let delivered = mesh.pump();

    for (i, node) in mesh.nodes.iter().enumerate() {
        assert!(node.objects.has(&id), "node {} lacks object", i);
        assert_eq!(node.objects.get(&id), Some(object.clone()));
    }
    let announcements = count_type(&delivered, "ihaveobject");
    assert!(announcements >= 2);
    assert!(announcements <= 3 * 2, "{} announcements", announcements);
    assert_eq!(count_type(&delivered, "getobject"), 2);
}

#[test]
fn test_known_object_is_not_reannounced() {
    let mut mesh = Mesh::new(3);
    mesh.pump();
    let object = block();
    mesh.inject(0, &object);
    mesh.pump();

    mesh.inject(1, &object);
    let delivered = mesh.pump();
    assert_eq!(count_type(&delivered, "ihaveobject"), 0);
    assert_eq!(count_type(&delivered, "object"), 0);
}
