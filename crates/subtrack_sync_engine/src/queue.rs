//! Durable operation log.
//!
//! The log is the ordered list of local mutations that have not reached the
//! remote store yet. Insertion order is processing order; operations are
//! never reordered or coalesced.
//!
//! Every mutation rewrites the whole list as a JSON array under
//! [`QUEUE_KEY`]. Storage failures are logged and swallowed so that a failing
//! disk never blocks the local edit that produced the operation.
//!
//! Operations dropped after exhausting their retry budget move to a separate
//! dead-letter list under [`DEAD_LETTER_KEY`], where they can be inspected or
//! re-queued by hand. The dead-letter list is not capped; it only shrinks
//! through [`OperationLog::retry_dead_letter`] and
//! [`OperationLog::clear_dead_letters`].

use chrono::Utc;
use parking_lot::RwLock;
use std::sync::Arc;
use subtrack_storage::{InMemoryStore, KeyValueStore};
use subtrack_sync_protocol::{EntityType, NewOperation, OperationKind, SyncOperation};
use tracing::{debug, warn};

/// Storage key of the pending operation list.
pub const QUEUE_KEY: &str = "subscription_sync_queue";

/// Storage key of the dead-letter list.
pub const DEAD_LETTER_KEY: &str = "subscription_sync_dead_letters";

/// Ordered, persisted list of pending operations.
pub struct OperationLog {
    store: Arc<dyn KeyValueStore>,
    pending: RwLock<Vec<SyncOperation>>,
    dead_letters: RwLock<Vec<SyncOperation>>,
}

impl OperationLog {
    /// Opens the log stored in `store`.
    ///
    /// A list that cannot be read or parsed is logged and replaced by an
    /// empty one.
    pub fn open(store: Arc<dyn KeyValueStore>) -> Self {
        let pending = load(store.as_ref(), QUEUE_KEY);
        let dead_letters = load(store.as_ref(), DEAD_LETTER_KEY);
        debug!(
            pending = pending.len(),
            dead_letters = dead_letters.len(),
            "operation log opened"
        );

        Self {
            store,
            pending: RwLock::new(pending),
            dead_letters: RwLock::new(dead_letters),
        }
    }

    /// Creates a log backed by a fresh in-memory store.
    pub fn in_memory() -> Self {
        Self::open(Arc::new(InMemoryStore::new()))
    }

    /// Appends a new operation and persists the log.
    ///
    /// Assigns the operation id, the enqueue timestamp and a zero attempt
    /// counter. Returns a copy of the stored operation.
    pub fn enqueue(&self, request: NewOperation) -> SyncOperation {
        let operation = SyncOperation::from_request(request, Utc::now());
        debug!(
            op_id = %operation.id,
            entity_id = %operation.entity_id,
            kind = %operation.kind,
            "operation enqueued"
        );

        let mut pending = self.pending.write();
        pending.push(operation.clone());
        self.persist(QUEUE_KEY, &pending);
        operation
    }

    /// Returns a snapshot of the pending operations in processing order.
    pub fn all(&self) -> Vec<SyncOperation> {
        self.pending.read().clone()
    }

    /// Returns the pending operation with the given id.
    pub fn get(&self, op_id: &str) -> Option<SyncOperation> {
        self.pending.read().iter().find(|op| op.id == op_id).cloned()
    }

    /// Removes an operation. Removing a missing id is a no-op.
    ///
    /// Returns true if something was removed.
    pub fn remove(&self, op_id: &str) -> bool {
        let mut pending = self.pending.write();
        let before = pending.len();
        pending.retain(|op| op.id != op_id);
        if pending.len() == before {
            return false;
        }
        self.persist(QUEUE_KEY, &pending);
        true
    }

    /// Increments the attempt counter and stores the last error.
    ///
    /// Returns the updated operation, or `None` if it is no longer queued.
    pub fn record_attempt(&self, op_id: &str, error: Option<String>) -> Option<SyncOperation> {
        let mut pending = self.pending.write();
        let operation = pending.iter_mut().find(|op| op.id == op_id)?;
        operation.record_failure(error);
        let updated = operation.clone();
        self.persist(QUEUE_KEY, &pending);
        Some(updated)
    }

    /// Empties the log.
    pub fn clear(&self) {
        let mut pending = self.pending.write();
        pending.clear();
        self.persist(QUEUE_KEY, &pending);
    }

    /// Returns the number of pending operations.
    pub fn size(&self) -> usize {
        self.pending.read().len()
    }

    /// Returns true if nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.pending.read().is_empty()
    }

    /// Returns true if a CREATE for the entity is still queued.
    pub fn pending_create(&self, entity_type: EntityType, entity_id: &str) -> bool {
        self.pending
            .read()
            .iter()
            .any(|op| op.kind == OperationKind::Create && op.targets(entity_type, entity_id))
    }

    /// Returns true if any operation for the entity is still queued.
    pub fn has_pending(&self, entity_type: EntityType, entity_id: &str) -> bool {
        self.pending
            .read()
            .iter()
            .any(|op| op.targets(entity_type, entity_id))
    }

    /// Points every queued operation for `old_id` at `new_id`.
    ///
    /// Used when the remote store assigned its own id to a created entity.
    /// Returns the number of operations changed.
    pub fn rekey(&self, old_id: &str, new_id: &str) -> usize {
        let mut pending = self.pending.write();
        let mut changed = 0;
        for operation in pending.iter_mut().filter(|op| op.entity_id == old_id) {
            operation.entity_id = new_id.to_string();
            changed += 1;
        }
        if changed > 0 {
            self.persist(QUEUE_KEY, &pending);
        }
        changed
    }

    /// Moves an operation from the pending list to the dead-letter list.
    ///
    /// Returns the moved operation, or `None` if it was not pending.
    pub fn dead_letter(&self, op_id: &str) -> Option<SyncOperation> {
        let mut pending = self.pending.write();
        let index = pending.iter().position(|op| op.id == op_id)?;
        let operation = pending.remove(index);
        self.persist(QUEUE_KEY, &pending);
        drop(pending);

        let mut dead = self.dead_letters.write();
        dead.push(operation.clone());
        self.persist(DEAD_LETTER_KEY, &dead);
        Some(operation)
    }

    /// Returns the dropped operations, oldest first.
    pub fn dead_letters(&self) -> Vec<SyncOperation> {
        self.dead_letters.read().clone()
    }

    /// Re-queues a dropped operation at the end of the log with its attempt
    /// counter reset.
    ///
    /// Returns false if no dead letter has that id.
    pub fn retry_dead_letter(&self, op_id: &str) -> bool {
        let mut dead = self.dead_letters.write();
        let Some(index) = dead.iter().position(|op| op.id == op_id) else {
            return false;
        };
        let mut operation = dead.remove(index);
        self.persist(DEAD_LETTER_KEY, &dead);
        drop(dead);

        operation.reset_attempts();
        debug!(op_id = %operation.id, entity_id = %operation.entity_id, "dead letter re-queued");
        let mut pending = self.pending.write();
        pending.push(operation);
        self.persist(QUEUE_KEY, &pending);
        true
    }

    /// Discards every dead letter.
    pub fn clear_dead_letters(&self) {
        let mut dead = self.dead_letters.write();
        dead.clear();
        self.persist(DEAD_LETTER_KEY, &dead);
    }

    fn persist(&self, key: &str, operations: &[SyncOperation]) {
        let bytes = match serde_json::to_vec(operations) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(key, error = %e, "failed to encode operation log");
                return;
            }
        };
        if let Err(e) = self.store.put(key, &bytes) {
            warn!(key, error = %e, "failed to persist operation log");
        }
    }
}

impl std::fmt::Debug for OperationLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationLog")
            .field("pending", &self.pending.read().len())
            .field("dead_letters", &self.dead_letters.read().len())
            .finish()
    }
}

fn load(store: &dyn KeyValueStore, key: &str) -> Vec<SyncOperation> {
    let bytes = match store.get(key) {
        Ok(Some(bytes)) => bytes,
        Ok(None) => return Vec::new(),
        Err(e) => {
            warn!(key, error = %e, "failed to read operation log, starting empty");
            return Vec::new();
        }
    };
    match serde_json::from_slice(&bytes) {
        Ok(operations) => operations,
        Err(e) => {
            warn!(key, error = %e, "operation log is corrupt, starting empty");
            Vec::new()
        }
    }
}
