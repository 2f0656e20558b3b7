//! Remote gateway abstraction.

use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use subtrack_sync_protocol::{Subscription, SyncOperation};

/// A remote gateway talks to the authoritative subscription store.
///
/// This trait abstracts the network layer so the engine can run against
/// HTTP, an in-memory store, or a scripted mock.
///
/// Field-name translation between local and remote shapes happens behind
/// this trait; the engine only ever sees [`Subscription`] values in local
/// shape.
#[async_trait]
pub trait RemoteGateway: Send + Sync {
    /// Lightweight connectivity probe. Never fails; an error means `false`.
    async fn check_reachable(&self) -> bool;

    /// Fetches the full remote subscription collection.
    async fn fetch_all(&self) -> SyncResult<Vec<Subscription>>;

    /// Fetches one subscription, `None` if the remote store does not have it.
    async fn fetch_one(&self, id: &str) -> SyncResult<Option<Subscription>>;

    /// Applies one operation remotely.
    ///
    /// Any error means the operation did not take effect. On success the
    /// remote version of the entity is returned when the remote store sends
    /// one back (CREATE and UPDATE); DELETE returns `None`.
    async fn apply(&self, operation: &SyncOperation) -> SyncResult<Option<Subscription>>;
}

/// A scripted gateway for testing.
///
/// Responses are set up front; every call is recorded.
#[derive(Debug)]
pub struct MockGateway {
    reachable: AtomicBool,
    remote: Mutex<Vec<Subscription>>,
    fetch_error: Mutex<Option<String>>,
    apply_failures: Mutex<VecDeque<String>>,
    always_fail: Mutex<Option<String>>,
    apply_response: Mutex<Option<Subscription>>,
    applied: Mutex<Vec<SyncOperation>>,
    probes: AtomicUsize,
    fetches: AtomicUsize,
}

impl MockGateway {
    /// Creates a reachable mock with an empty remote collection.
    pub fn new() -> Self {
        Self {
            reachable: AtomicBool::new(true),
            remote: Mutex::new(Vec::new()),
            fetch_error: Mutex::new(None),
            apply_failures: Mutex::new(VecDeque::new()),
            always_fail: Mutex::new(None),
            apply_response: Mutex::new(None),
            applied: Mutex::new(Vec::new()),
            probes: AtomicUsize::new(0),
            fetches: AtomicUsize::new(0),
        }
    }

    /// Sets the probe result.
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Sets the collection returned by `fetch_all`.
    pub fn set_remote(&self, subscriptions: Vec<Subscription>) {
        *self.remote.lock() = subscriptions;
    }

    /// Makes `fetch_all` fail with the given message (or succeed with `None`).
    pub fn set_fetch_error(&self, message: Option<&str>) {
        *self.fetch_error.lock() = message.map(str::to_string);
    }

    /// Makes the next `apply` call fail with `message`.
    ///
    /// Calls queue up: each failure is consumed by one `apply`.
    pub fn fail_next_apply(&self, message: &str) {
        self.apply_failures.lock().push_back(message.to_string());
    }

    /// Makes every `apply` call fail (or succeed again with `None`).
    pub fn set_apply_error(&self, message: Option<&str>) {
        *self.always_fail.lock() = message.map(str::to_string);
    }

    /// Sets the entity returned by successful `apply` calls.
    pub fn set_apply_response(&self, response: Option<Subscription>) {
        *self.apply_response.lock() = response;
    }

    /// Returns every operation passed to `apply`, failed ones included.
    pub fn applied(&self) -> Vec<SyncOperation> {
        self.applied.lock().clone()
    }

    /// Returns the number of reachability probes.
    pub fn probe_count(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    /// Returns the number of `fetch_all` calls.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl Default for MockGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteGateway for MockGateway {
    async fn check_reachable(&self) -> bool {
        self.probes.fetch_add(1, Ordering::SeqCst);
        self.reachable.load(Ordering::SeqCst)
    }

    async fn fetch_all(&self) -> SyncResult<Vec<Subscription>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = self.fetch_error.lock().clone() {
            return Err(SyncError::transport_retryable(message));
        }
        Ok(self.remote.lock().clone())
    }

    async fn fetch_one(&self, id: &str) -> SyncResult<Option<Subscription>> {
        Ok(self.remote.lock().iter().find(|s| s.id == id).cloned())
    }

    async fn apply(&self, operation: &SyncOperation) -> SyncResult<Option<Subscription>> {
        self.applied.lock().push(operation.clone());

        if let Some(message) = self.apply_failures.lock().pop_front() {
            return Err(SyncError::transport_retryable(message));
        }
        if let Some(message) = self.always_fail.lock().clone() {
            return Err(SyncError::transport_retryable(message));
        }
        Ok(self.apply_response.lock().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use subtrack_sync_protocol::NewOperation;

    fn delete_op(id: &str) -> SyncOperation {
        SyncOperation::from_request(NewOperation::delete(id), Utc::now())
    }

    #[tokio::test]
    async fn mock_gateway_probe() {
        let gateway = MockGateway::new();
        assert!(gateway.check_reachable().await);

        gateway.set_reachable(false);
        assert!(!gateway.check_reachable().await);
        assert_eq!(gateway.probe_count(), 2);
    }

    #[tokio::test]
    async fn mock_gateway_scripted_failures() {
        let gateway = MockGateway::new();
        gateway.fail_next_apply("first");

        assert!(gateway.apply(&delete_op("a")).await.is_err());
        assert!(gateway.apply(&delete_op("a")).await.is_ok());

        gateway.set_apply_error(Some("down"));
        assert!(gateway.apply(&delete_op("b")).await.is_err());
        gateway.set_apply_error(None);
        assert!(gateway.apply(&delete_op("b")).await.is_ok());

        assert_eq!(gateway.applied().len(), 4);
    }

    #[tokio::test]
    async fn mock_gateway_fetch_error() {
        let gateway = MockGateway::new();
        gateway.set_fetch_error(Some("connection reset"));
        assert!(gateway.fetch_all().await.is_err());

        gateway.set_fetch_error(None);
        assert!(gateway.fetch_all().await.unwrap().is_empty());
        assert_eq!(gateway.fetch_count(), 2);
    }
}
