//! In-memory remote store.
//!
//! [`InMemoryRemote`] behaves like the REST service behind the HTTP gateway:
//! it stamps `updated_at` on every write, rejects duplicate creates and
//! unknown updates, and treats deletes as idempotent. Failure knobs let
//! tests script outages.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use subtrack_sync_engine::{RemoteGateway, SyncError, SyncResult};
use subtrack_sync_protocol::{
    OperationKind, ProtocolError, Subscription, SubscriptionPatch, SyncOperation,
};
use uuid::Uuid;

/// An in-memory implementation of the remote subscription store.
#[derive(Debug)]
pub struct InMemoryRemote {
    rows: Mutex<BTreeMap<String, Subscription>>,
    reachable: AtomicBool,
    assign_ids: AtomicBool,
    clock: Mutex<Option<DateTime<Utc>>>,
    fail_next: AtomicUsize,
    failing_entities: Mutex<HashSet<String>>,
    applied: Mutex<Vec<SyncOperation>>,
    probes: AtomicUsize,
    fetches: AtomicUsize,
}

impl InMemoryRemote {
    /// Creates an empty, reachable remote.
    pub fn new() -> Self {
        Self {
            rows: Mutex::new(BTreeMap::new()),
            reachable: AtomicBool::new(true),
            assign_ids: AtomicBool::new(false),
            clock: Mutex::new(None),
            fail_next: AtomicUsize::new(0),
            failing_entities: Mutex::new(HashSet::new()),
            applied: Mutex::new(Vec::new()),
            probes: AtomicUsize::new(0),
            fetches: AtomicUsize::new(0),
        }
    }

    /// Creates a remote holding `rows` as they are.
    pub fn with_rows(rows: impl IntoIterator<Item = Subscription>) -> Self {
        let remote = Self::new();
        for row in rows {
            remote.insert(row);
        }
        remote
    }

    /// Stores a row directly, bypassing timestamps and failure knobs.
    pub fn insert(&self, row: Subscription) {
        self.rows.lock().insert(row.id.clone(), row);
    }

    /// Removes a row directly.
    pub fn remove(&self, id: &str) -> Option<Subscription> {
        self.rows.lock().remove(id)
    }

    /// Returns one row.
    pub fn get(&self, id: &str) -> Option<Subscription> {
        self.rows.lock().get(id).cloned()
    }

    /// Returns every row ordered by id.
    pub fn rows(&self) -> Vec<Subscription> {
        self.rows.lock().values().cloned().collect()
    }

    /// Sets the probe result.
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Makes CREATE ignore the client id and assign a fresh one.
    pub fn set_assign_ids(&self, assign: bool) {
        self.assign_ids.store(assign, Ordering::SeqCst);
    }

    /// Pins the server clock used for `updated_at`; `None` uses the system
    /// clock.
    pub fn set_clock(&self, now: Option<DateTime<Utc>>) {
        *self.clock.lock() = now;
    }

    /// Makes the next `count` applies fail.
    pub fn fail_next(&self, count: usize) {
        self.fail_next.store(count, Ordering::SeqCst);
    }

    /// Makes every apply targeting `entity_id` fail until cleared.
    pub fn fail_entity(&self, entity_id: &str) {
        self.failing_entities.lock().insert(entity_id.to_string());
    }

    /// Clears every per-entity failure.
    pub fn clear_failures(&self) {
        self.fail_next.store(0, Ordering::SeqCst);
        self.failing_entities.lock().clear();
    }

    /// Returns every operation passed to `apply`, failed ones included.
    pub fn applied(&self) -> Vec<SyncOperation> {
        self.applied.lock().clone()
    }

    /// Returns how many times `operation_id` reached `apply`.
    pub fn attempts_for(&self, operation_id: &str) -> usize {
        self.applied
            .lock()
            .iter()
            .filter(|op| op.id == operation_id)
            .count()
    }

    /// Returns the number of reachability probes.
    pub fn probe_count(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    /// Returns the number of `fetch_all` calls.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    fn now(&self) -> DateTime<Utc> {
        (*self.clock.lock()).unwrap_or_else(Utc::now)
    }

    fn injected_failure(&self, operation: &SyncOperation) -> Option<SyncError> {
        let consumed = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if consumed {
            return Some(SyncError::transport_retryable("injected failure"));
        }
        if self.failing_entities.lock().contains(&operation.entity_id) {
            return Some(SyncError::Http {
                status: 503,
                message: format!("entity {} unavailable", operation.entity_id),
            });
        }
        None
    }

    fn create(&self, operation: &SyncOperation) -> SyncResult<Subscription> {
        let data = operation
            .data
            .as_ref()
            .ok_or_else(|| ProtocolError::invalid_payload("CREATE operation without data"))?;
        let id = if self.assign_ids.load(Ordering::SeqCst) {
            Uuid::new_v4().to_string()
        } else {
            operation.entity_id.clone()
        };

        let mut row = Subscription::from_payload(&id, data)?;
        row.touch(self.now());

        let mut rows = self.rows.lock();
        if rows.contains_key(&id) {
            return Err(SyncError::Http {
                status: 409,
                message: format!("subscription {id} already exists"),
            });
        }
        rows.insert(id, row.clone());
        Ok(row)
    }

    fn update(&self, operation: &SyncOperation) -> SyncResult<Subscription> {
        let data = operation
            .data
            .as_ref()
            .ok_or_else(|| ProtocolError::invalid_payload("UPDATE operation without data"))?;
        let patch = SubscriptionPatch::from_payload(data)?;
        let now = self.now();

        let mut rows = self.rows.lock();
        let row = rows.get_mut(&operation.entity_id).ok_or_else(|| SyncError::Http {
            status: 404,
            message: format!("subscription {} not found", operation.entity_id),
        })?;
        row.apply_patch(&patch);
        row.touch(now);
        Ok(row.clone())
    }
}

impl Default for InMemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteGateway for InMemoryRemote {
    async fn check_reachable(&self) -> bool {
        self.probes.fetch_add(1, Ordering::SeqCst);
        self.reachable.load(Ordering::SeqCst)
    }

    async fn fetch_all(&self) -> SyncResult<Vec<Subscription>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if !self.reachable.load(Ordering::SeqCst) {
            return Err(SyncError::transport_retryable("connection refused"));
        }
        Ok(self.rows())
    }

    async fn fetch_one(&self, id: &str) -> SyncResult<Option<Subscription>> {
        Ok(self.get(id))
    }

    async fn apply(&self, operation: &SyncOperation) -> SyncResult<Option<Subscription>> {
        self.applied.lock().push(operation.clone());

        if !self.reachable.load(Ordering::SeqCst) {
            return Err(SyncError::transport_retryable("connection refused"));
        }
        if let Some(error) = self.injected_failure(operation) {
            return Err(error);
        }

        match operation.kind {
            OperationKind::Create => self.create(operation).map(Some),
            OperationKind::Update => self.update(operation).map(Some),
            OperationKind::Delete => {
                self.rows.lock().remove(&operation.entity_id);
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use subtrack_sync_protocol::NewOperation;

    fn op(request: NewOperation) -> SyncOperation {
        SyncOperation::from_request(request, Utc::now())
    }

    fn payload(name: &str) -> serde_json::Value {
        json!({
            "name": name,
            "price": 9.99,
            "billingCycle": "monthly",
            "startDate": "2024-01-01",
            "renewalDate": "2024-02-01"
        })
    }

    fn block_on<F: std::future::Future>(future: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap()
            .block_on(future)
    }

    #[test]
    fn create_update_delete() {
        let remote = InMemoryRemote::new();
        let clock = DateTime::parse_from_rfc3339("2024-05-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        remote.set_clock(Some(clock));

        block_on(async {
            let created = remote
                .apply(&op(NewOperation::create("a", payload("Netflix"))))
                .await
                .unwrap()
                .unwrap();
            assert_eq!(created.id, "a");
            assert_eq!(created.updated_at_millis(), clock.timestamp_millis());

            let updated = remote
                .apply(&op(NewOperation::update("a", json!({"price": 12.0}))))
                .await
                .unwrap()
                .unwrap();
            assert_eq!(updated.price, 12.0);
            assert_eq!(updated.name, "Netflix");

            assert!(remote.apply(&op(NewOperation::delete("a"))).await.unwrap().is_none());
            assert!(remote.apply(&op(NewOperation::delete("a"))).await.is_ok());
        });
        assert!(remote.rows().is_empty());
    }

    #[test]
    fn duplicate_create_and_unknown_update_fail() {
        let remote = InMemoryRemote::new();
        block_on(async {
            remote
                .apply(&op(NewOperation::create("a", payload("Netflix"))))
                .await
                .unwrap();
            assert!(remote
                .apply(&op(NewOperation::create("a", payload("Netflix"))))
                .await
                .is_err());
            assert!(remote
                .apply(&op(NewOperation::update("zzz", json!({"price": 1.0}))))
                .await
                .is_err());
        });
    }

    #[test]
    fn assigned_ids_differ_from_client_ids() {
        let remote = InMemoryRemote::new();
        remote.set_assign_ids(true);
        let created = block_on(remote.apply(&op(NewOperation::create("client", payload("Hulu")))))
            .unwrap()
            .unwrap();
        assert_ne!(created.id, "client");
        assert!(remote.get(&created.id).is_some());
    }

    #[test]
    fn failure_knobs() {
        let remote = InMemoryRemote::new();
        remote.fail_next(1);
        remote.fail_entity("b");

        block_on(async {
            assert!(remote.apply(&op(NewOperation::delete("a"))).await.is_err());
            assert!(remote.apply(&op(NewOperation::delete("a"))).await.is_ok());
            assert!(remote.apply(&op(NewOperation::delete("b"))).await.is_err());
            remote.clear_failures();
            assert!(remote.apply(&op(NewOperation::delete("b"))).await.is_ok());
        });
        assert_eq!(remote.applied().len(), 4);
    }
}
