//! Known peer addresses

use crate::error::StorageResult;
use crate::log::AppendLog;
use birdman_primitives::PeerAddress;
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Durable set of peer addresses keyed by their canonical string.
///
/// Entries are never removed. [`PeerRegistry::set`] is first-writer-wins:
/// writers are serialized through the commit lock, so the membership check,
/// the log append and the insert form one step. Readers only wait for the
/// in-memory insert, never for the log.
pub struct PeerRegistry {
    peers: RwLock<BTreeMap<String, PeerAddress>>,
    commit: Mutex<()>,
    log: Arc<dyn AppendLog>,
}

impl PeerRegistry {
    /// Open the registry, replaying every line of `log`.
    ///
    /// Lines that do not hold a valid address are skipped with a warning.
    pub fn open(log: Arc<dyn AppendLog>) -> StorageResult<Self> {
        let mut peers = BTreeMap::new();
        for line in log.read_lines()? {
            let line = line.trim();
            match PeerAddress::parse(line) {
                Ok(addr) if addr.is_valid() => {
                    peers.insert(addr.to_string(), addr);
                }
                Ok(_) => warn!("Skipping invalid peer address in log: {}", line),
                Err(e) => warn!("Skipping unparseable peer log line {:?}: {}", line, e),
            }
        }
        debug!("Loaded {} known peers", peers.len());
        Ok(Self {
            peers: RwLock::new(peers),
            commit: Mutex::new(()),
            log,
        })
    }

    /// Look up a peer by canonical string
    pub fn get(&self, key: &str) -> Option<PeerAddress> {
        self.peers.read().get(key).cloned()
    }

    /// Check if a peer is known
    pub fn has(&self, key: &str) -> bool {
        self.peers.read().contains_key(key)
    }

    /// Record a peer.
    ///
    /// Returns `Ok(true)` if the peer was new and has been appended to the
    /// log, `Ok(false)` if it was already known.
    pub fn set(&self, addr: PeerAddress) -> StorageResult<bool> {
        let key = addr.to_string();
        let _commit = self.commit.lock();
        if self.has(&key) {
            return Ok(false);
        }
        self.log.append(&key)?;
        info!("Learned new peer {}", key);
        self.peers.write().insert(key, addr);
        Ok(true)
    }

    /// Canonical strings of all known peers, sorted
    pub fn keys(&self) -> Vec<String> {
        self.peers.read().keys().cloned().collect()
    }

    /// All known peers
    pub fn addresses(&self) -> Vec<PeerAddress> {
        self.peers.read().values().cloned().collect()
    }

    /// Number of known peers
    pub fn len(&self) -> usize {
        self.peers.read().len()
    }

    /// Check if no peer is known
    pub fn is_empty(&self) -> bool {
        self.peers.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::{FileLog, MemoryLog};
    use std::thread;
    use tempfile::TempDir;

    fn addr(s: &str) -> PeerAddress {
        PeerAddress::parse(s).unwrap()
    }

    // ==================== Basic operations ====================

    #[test]
    fn test_set_get_has() {
        let log = Arc::new(MemoryLog::new());
        let registry = PeerRegistry::open(log.clone()).unwrap();
        assert!(registry.is_empty());

        assert!(registry.set(addr("10.0.0.1:18018")).unwrap());
        assert!(registry.has("10.0.0.1:18018"));
        assert_eq!(registry.get("10.0.0.1:18018"), Some(addr("10.0.0.1:18018")));
        assert!(registry.get("10.0.0.2:18018").is_none());
        assert_eq!(log.read_lines().unwrap(), vec!["10.0.0.1:18018"]);
    }

    #[test]
    fn test_set_is_idempotent() {
        let log = Arc::new(MemoryLog::new());
        let registry = PeerRegistry::open(log.clone()).unwrap();
        assert!(registry.set(addr("node.example.com:18018")).unwrap());
        assert!(!registry.set(addr("node.example.com:18018")).unwrap());
        assert_eq!(registry.len(), 1);
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_keys_are_canonical_strings() {
        let registry = PeerRegistry::open(Arc::new(MemoryLog::new())).unwrap();
        registry.set(addr("[::1]:18018")).unwrap();
        registry.set(addr("1.2.3.4:1")).unwrap();
        assert_eq!(registry.keys(), vec!["1.2.3.4:1", "[::1]:18018"]);
        assert_eq!(registry.addresses().len(), 2);
    }

    // ==================== Replay ====================

    #[test]
    fn test_replay_skips_corrupt_lines() {
        let log = Arc::new(MemoryLog::with_lines([
            "1.2.3.4:18018",
            "garbage",
            "bad_host!:18018",
            "1.2.3.4:18018",
            "[::1]:1",
        ]));
        let registry = PeerRegistry::open(log).unwrap();
        assert_eq!(registry.keys(), vec!["1.2.3.4:18018", "[::1]:1"]);
    }

    #[test]
    fn test_file_backed_replay() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(crate::PEERS_FILENAME);
        {
            let registry = PeerRegistry::open(Arc::new(FileLog::open(&path).unwrap())).unwrap();
            registry.set(addr("5.6.7.8:18018")).unwrap();
        }
        let registry = PeerRegistry::open(Arc::new(FileLog::open(&path).unwrap())).unwrap();
        assert!(registry.has("5.6.7.8:18018"));
        assert!(!registry.set(addr("5.6.7.8:18018")).unwrap());
    }

    // ==================== Concurrency ====================

    #[test]
    fn test_concurrent_set_single_winner() {
        let log = Arc::new(MemoryLog::new());
        let registry = Arc::new(PeerRegistry::open(log.clone()).unwrap());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                thread::spawn(move || registry.set(addr("9.9.9.9:18018")).unwrap())
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|inserted| *inserted)
            .count();
        assert_eq!(winners, 1);
        assert_eq!(log.len(), 1);
    }
}
