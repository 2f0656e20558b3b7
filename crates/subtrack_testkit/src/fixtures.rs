//! Test fixtures and client helpers.
//!
//! Provides sample subscriptions and a [`TestClient`] that wires a
//! subscription service, a replica and an operation log to an
//! [`InMemoryRemote`].

use crate::remote::InMemoryRemote;
use chrono::{DateTime, Utc};
use std::path::Path;
use std::sync::Arc;
use subtrack_storage::{FileStore, KeyValueStore};
use subtrack_sync_engine::{
    MemoryReplica, OperationLog, SubscriptionService, SyncConfig, SyncEngine,
};
use subtrack_sync_protocol::{NewSubscription, Subscription};
use tempfile::TempDir;

/// Engine type used by [`TestClient`].
pub type TestEngine = SyncEngine<InMemoryRemote, MemoryReplica>;

/// Default engine configuration for tests: auto-sync off.
pub fn test_config() -> SyncConfig {
    SyncConfig::default().with_auto_sync(false)
}

/// Parses an RFC 3339 timestamp.
///
/// # Panics
///
/// Panics on malformed input.
pub fn timestamp(text: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(text)
        .expect("valid RFC 3339 timestamp")
        .with_timezone(&Utc)
}

/// A Netflix subscription at 9.99 per month.
pub fn netflix() -> NewSubscription {
    NewSubscription::new("Netflix", 9.99, "monthly", "2024-01-01", "2024-02-01")
        .with_category("Streaming")
}

/// A Spotify subscription at 10.99 per month.
pub fn spotify() -> NewSubscription {
    NewSubscription::new("Spotify", 10.99, "monthly", "2023-06-15", "2024-02-15")
        .with_category("Music")
        .with_account_email("me@example.com")
}

/// A yearly cloud storage subscription.
pub fn cloud_storage() -> NewSubscription {
    NewSubscription::new("Cloud Drive", 99.0, "yearly", "2023-09-01", "2024-09-01")
        .with_plan("2 TB")
        .with_category("Storage")
}

/// Builds a stored subscription whose timestamps are `updated_at`.
pub fn subscription_at(id: &str, new: NewSubscription, updated_at: &str) -> Subscription {
    let mut row = Subscription::from_new(id, new);
    row.touch(timestamp(updated_at));
    row
}

/// A client wired to an [`InMemoryRemote`].
pub struct TestClient {
    /// The local mutation service.
    pub service: SubscriptionService<InMemoryRemote, MemoryReplica>,
    /// The remote store.
    pub remote: Arc<InMemoryRemote>,
    /// Keeps the data directory of a file-backed client alive.
    dir: Option<TempDir>,
}

impl TestClient {
    /// Creates an unpersisted client.
    pub fn new(remote: Arc<InMemoryRemote>, config: SyncConfig) -> Self {
        let engine = SyncEngine::new(
            config,
            Arc::clone(&remote),
            Arc::new(MemoryReplica::new()),
            Arc::new(OperationLog::in_memory()),
        );
        Self {
            service: SubscriptionService::new(Arc::new(engine)),
            remote,
            dir: None,
        }
    }

    /// Creates a client persisted in a fresh temporary directory.
    ///
    /// # Panics
    ///
    /// Panics if the directory or its stores cannot be created.
    pub fn file(remote: Arc<InMemoryRemote>, config: SyncConfig) -> Self {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let mut client = Self::open_at(dir.path(), remote, config);
        client.dir = Some(dir);
        client
    }

    /// Simulates a process restart: reopens the same directory with a new
    /// engine. Unpersisted clients come back empty.
    pub fn restart(self) -> Self {
        let config = self.engine().config().clone();
        let remote = Arc::clone(&self.remote);
        let dir = self.dir;
        drop(self.service);

        match dir {
            Some(dir) => {
                let mut client = Self::open_at(dir.path(), remote, config);
                client.dir = Some(dir);
                client
            }
            None => Self::new(remote, config),
        }
    }

    fn open_at(path: &Path, remote: Arc<InMemoryRemote>, config: SyncConfig) -> Self {
        let store: Arc<dyn KeyValueStore> =
            Arc::new(FileStore::open(path).expect("Failed to open file store"));
        let replica = MemoryReplica::with_store(Arc::clone(&store))
            .expect("Failed to load replica snapshot");
        let engine = SyncEngine::new(
            config,
            Arc::clone(&remote),
            Arc::new(replica),
            Arc::new(OperationLog::open(store)),
        );
        Self {
            service: SubscriptionService::new(Arc::new(engine)),
            remote,
            dir: None,
        }
    }

    /// Returns the engine.
    pub fn engine(&self) -> &Arc<TestEngine> {
        self.service.engine()
    }

    /// Returns the operation log.
    pub fn log(&self) -> &Arc<OperationLog> {
        self.engine().log()
    }

    /// Returns the local replica.
    pub fn replica(&self) -> &Arc<MemoryReplica> {
        self.engine().replica()
    }

    /// Returns every local row ordered by id.
    ///
    /// # Panics
    ///
    /// Panics if the replica cannot be read.
    pub fn rows(&self) -> Vec<Subscription> {
        let mut rows = self.service.list().expect("Failed to list replica");
        rows.sort_by(|a, b| a.id.cmp(&b.id));
        rows
    }
}

/// Returns true if both row sets hold the same ids with the same
/// user-editable fields. Timestamps are ignored.
pub fn same_rows(left: &[Subscription], right: &[Subscription]) -> bool {
    if left.len() != right.len() {
        return false;
    }
    left.iter().all(|l| {
        right
            .iter()
            .any(|r| r.id == l.id && r.same_fields(l))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscription_at_stamps_both_timestamps() {
        let row = subscription_at("b", netflix(), "2024-01-01T00:00:00Z");
        assert_eq!(row.updated_at_millis(), 1_704_067_200_000);
        assert_eq!(row.last_modified, row.updated_at_millis());
    }

    #[test]
    fn file_client_survives_restart() {
        let client = TestClient::file(Arc::new(InMemoryRemote::new()), test_config());
        let added = client.service.add(netflix()).unwrap();

        let client = client.restart();
        assert_eq!(client.service.get(&added.id).unwrap(), Some(added));
        assert_eq!(client.log().size(), 1);
    }

    #[test]
    fn memory_client_restarts_empty() {
        let client = TestClient::new(Arc::new(InMemoryRemote::new()), test_config());
        client.service.add(netflix()).unwrap();

        let client = client.restart();
        assert!(client.rows().is_empty());
        assert!(client.log().is_empty());
    }

    #[test]
    fn same_rows_ignores_timestamps() {
        let a = subscription_at("x", spotify(), "2024-01-01T00:00:00Z");
        let b = subscription_at("x", spotify(), "2024-06-01T00:00:00Z");
        let c = subscription_at("x", cloud_storage(), "2024-01-01T00:00:00Z");

        assert!(same_rows(&[a.clone()], &[b]));
        assert!(!same_rows(&[a.clone()], &[c]));
        assert!(!same_rows(&[a], &[]));
    }
}
