//! Local replica access.
//!
//! The engine reads and writes local rows only through [`LocalReplica`].
//! Grouped writes go through [`LocalReplica::apply_batch`], which must make
//! the whole batch visible at once.

use crate::error::{SyncError, SyncResult};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;
use subtrack_storage::KeyValueStore;
use subtrack_sync_protocol::{Subscription, SubscriptionPatch};
use tracing::{debug, warn};

/// Storage key of the replica snapshot.
pub const REPLICA_KEY: &str = "subscriptions";

/// Kind of row change observed by subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeType {
    /// A row was created.
    Insert,
    /// An existing row was replaced or patched.
    Update,
    /// A row was removed.
    Delete,
}

/// A row change notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicaChange {
    /// Id of the changed row.
    pub entity_id: String,
    /// What happened to it.
    pub change_type: ChangeType,
}

impl ReplicaChange {
    fn new(entity_id: impl Into<String>, change_type: ChangeType) -> Self {
        Self {
            entity_id: entity_id.into(),
            change_type,
        }
    }
}

/// One mutation inside a grouped write.
#[derive(Debug, Clone, PartialEq)]
pub enum RowMutation {
    /// Inserts or replaces a row.
    Set(Subscription),
    /// Removes a row by id; a missing row is a no-op.
    Delete(String),
    /// Patches an existing row and re-stamps its timestamps with `at`.
    ///
    /// Skipped when the row does not exist.
    Patch {
        /// Row id.
        id: String,
        /// Fields to change.
        patch: SubscriptionPatch,
        /// Modification instant.
        at: DateTime<Utc>,
    },
}

/// Row-level access to the local subscription store.
pub trait LocalReplica: Send + Sync {
    /// Reads one row.
    fn get(&self, id: &str) -> SyncResult<Option<Subscription>>;

    /// Inserts or replaces one row.
    fn set(&self, subscription: Subscription) -> SyncResult<()>;

    /// Removes one row. Returns true if it existed.
    fn delete(&self, id: &str) -> SyncResult<bool>;

    /// Lists every row id.
    fn ids(&self) -> SyncResult<Vec<String>>;

    /// Reads every row.
    fn all(&self) -> SyncResult<Vec<Subscription>> {
        let mut rows = Vec::new();
        for id in self.ids()? {
            if let Some(row) = self.get(&id)? {
                rows.push(row);
            }
        }
        Ok(rows)
    }

    /// Applies a group of mutations as one write.
    fn apply_batch(&self, mutations: Vec<RowMutation>) -> SyncResult<()>;

    /// Returns a receiver of row changes made after this call.
    fn subscribe(&self) -> Receiver<ReplicaChange>;
}

/// In-memory replica with an optional persisted snapshot.
///
/// With a store attached, the full row set is written as a JSON array under
/// [`REPLICA_KEY`] after every mutation. A failed snapshot write is logged
/// and the in-memory state stays authoritative.
pub struct MemoryReplica {
    rows: RwLock<BTreeMap<String, Subscription>>,
    store: Option<Arc<dyn KeyValueStore>>,
    subscribers: Mutex<Vec<Sender<ReplicaChange>>>,
}

impl MemoryReplica {
    /// Creates an empty, unpersisted replica.
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(BTreeMap::new()),
            store: None,
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Opens a replica backed by `store`, loading the existing snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read or the snapshot is not
    /// a valid subscription array.
    pub fn with_store(store: Arc<dyn KeyValueStore>) -> SyncResult<Self> {
        let mut rows = BTreeMap::new();
        if let Some(bytes) = store.get(REPLICA_KEY)? {
            let loaded: Vec<Subscription> = serde_json::from_slice(&bytes)
                .map_err(|e| SyncError::Replica(format!("corrupt replica snapshot: {e}")))?;
            for row in loaded {
                rows.insert(row.id.clone(), row);
            }
            debug!(rows = rows.len(), "loaded replica snapshot");
        }

        Ok(Self {
            rows: RwLock::new(rows),
            store: Some(store),
            subscribers: Mutex::new(Vec::new()),
        })
    }

    /// Returns the number of rows.
    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    /// Returns true if there are no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }

    fn mutate(&self, mutations: Vec<RowMutation>) -> Vec<ReplicaChange> {
        let mut rows = self.rows.write();
        let mut changes = Vec::new();

        for mutation in mutations {
            match mutation {
                RowMutation::Set(row) => {
                    let change_type = if rows.contains_key(&row.id) {
                        ChangeType::Update
                    } else {
                        ChangeType::Insert
                    };
                    changes.push(ReplicaChange::new(row.id.clone(), change_type));
                    rows.insert(row.id.clone(), row);
                }
                RowMutation::Delete(id) => {
                    if rows.remove(&id).is_some() {
                        changes.push(ReplicaChange::new(id, ChangeType::Delete));
                    }
                }
                RowMutation::Patch { id, patch, at } => {
                    if let Some(row) = rows.get_mut(&id) {
                        row.apply_patch(&patch);
                        row.touch(at);
                        changes.push(ReplicaChange::new(id, ChangeType::Update));
                    }
                }
            }
        }

        if !changes.is_empty() {
            self.persist(&rows);
        }
        changes
    }

    fn persist(&self, rows: &BTreeMap<String, Subscription>) {
        let Some(store) = &self.store else {
            return;
        };
        let snapshot: Vec<&Subscription> = rows.values().collect();
        let bytes = match serde_json::to_vec(&snapshot) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "failed to encode replica snapshot");
                return;
            }
        };
        if let Err(e) = store.put(REPLICA_KEY, &bytes) {
            warn!(error = %e, "failed to persist replica snapshot");
        }
    }

    fn notify(&self, changes: Vec<ReplicaChange>) {
        if changes.is_empty() {
            return;
        }
        let mut subscribers = self.subscribers.lock();
        for change in changes {
            subscribers.retain(|tx| tx.send(change.clone()).is_ok());
        }
    }
}

impl Default for MemoryReplica {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryReplica {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryReplica")
            .field("rows", &self.rows.read().len())
            .field("persisted", &self.store.is_some())
            .finish()
    }
}

impl LocalReplica for MemoryReplica {
    fn get(&self, id: &str) -> SyncResult<Option<Subscription>> {
        Ok(self.rows.read().get(id).cloned())
    }

    fn set(&self, subscription: Subscription) -> SyncResult<()> {
        self.apply_batch(vec![RowMutation::Set(subscription)])
    }

    fn delete(&self, id: &str) -> SyncResult<bool> {
        let changes = self.mutate(vec![RowMutation::Delete(id.to_string())]);
        let existed = !changes.is_empty();
        self.notify(changes);
        Ok(existed)
    }

    fn ids(&self) -> SyncResult<Vec<String>> {
        Ok(self.rows.read().keys().cloned().collect())
    }

    fn all(&self) -> SyncResult<Vec<Subscription>> {
        Ok(self.rows.read().values().cloned().collect())
    }

    fn apply_batch(&self, mutations: Vec<RowMutation>) -> SyncResult<()> {
        let changes = self.mutate(mutations);
        self.notify(changes);
        Ok(())
    }

    fn subscribe(&self) -> Receiver<ReplicaChange> {
        let (tx, rx) = channel();
        self.subscribers.lock().push(tx);
        rx
    }
}
