//! Content-addressed object store

use crate::error::{StorageError, StorageResult};
use crate::log::AppendLog;
use birdman_primitives::ObjectId;
use birdman_types::ApplicationObject;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Durable map from object id to object.
///
/// Each stored object is logged as `id:canonical-json`. Objects are never
/// overwritten or removed.
pub struct ObjectStore {
    objects: RwLock<HashMap<ObjectId, ApplicationObject>>,
    commit: Mutex<()>,
    log: Arc<dyn AppendLog>,
}

/// Split one log line into its id and object.
fn parse_line(line: &str) -> StorageResult<(ObjectId, ApplicationObject)> {
    let (id, json) = line
        .split_once(':')
        .ok_or_else(|| StorageError::InvalidFormat("missing ':' separator".into()))?;
    let id = ObjectId::from_hex(id).map_err(|e| StorageError::InvalidFormat(e.to_string()))?;
    let object: ApplicationObject =
        serde_json::from_str(json).map_err(|e| StorageError::InvalidFormat(e.to_string()))?;
    if object.id() != id {
        return Err(StorageError::InvalidFormat(format!(
            "object does not hash to {}",
            id
        )));
    }
    Ok((id, object))
}

impl ObjectStore {
    /// Open the store, replaying every line of `log`.
    ///
    /// Corrupt lines, including ones whose object does not hash to the
    /// recorded id, are skipped with a warning.
    pub fn open(log: Arc<dyn AppendLog>) -> StorageResult<Self> {
        let mut objects = HashMap::new();
        for (n, line) in log.read_lines()?.iter().enumerate() {
            match parse_line(line) {
                Ok((id, object)) => {
                    objects.entry(id).or_insert(object);
                }
                Err(e) => warn!("Skipping corrupt object log line {}: {}", n + 1, e),
            }
        }
        debug!("Loaded {} known objects", objects.len());
        Ok(Self {
            objects: RwLock::new(objects),
            commit: Mutex::new(()),
            log,
        })
    }

    /// Look up an object
    pub fn get(&self, id: &ObjectId) -> Option<ApplicationObject> {
        self.objects.read().get(id).cloned()
    }

    /// Check if an object is known
    pub fn has(&self, id: &ObjectId) -> bool {
        self.objects.read().contains_key(id)
    }

    /// Store `object` under `id`.
    ///
    /// Returns `Ok(true)` if the object was new and has been logged,
    /// `Ok(false)` if the id was already present. The object becomes visible
    /// to readers only after its log line is durable.
    pub fn set(&self, id: ObjectId, object: ApplicationObject) -> StorageResult<bool> {
        let _commit = self.commit.lock();
        if self.has(&id) {
            return Ok(false);
        }
        let line = format!("{}:{}", id, object.canonical_json());
        self.log.append(&line)?;
        info!("Stored new {} {}", object.kind(), id);
        self.objects.write().insert(id, object);
        Ok(true)
    }

    /// Compute the id of `object` and store it.
    ///
    /// Returns the id together with whether the object was new.
    pub fn insert(&self, object: ApplicationObject) -> StorageResult<(ObjectId, bool)> {
        let id = object.id();
        let inserted = self.set(id, object)?;
        Ok((id, inserted))
    }

    /// Ids of all stored objects
    pub fn keys(&self) -> Vec<ObjectId> {
        self.objects.read().keys().copied().collect()
    }

    /// Number of stored objects
    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    /// Check if the store is empty
    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }
}
