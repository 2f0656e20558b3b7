//! In-memory key/value store for testing.

use crate::backend::{validate_key, KeyValueStore};
use crate::error::StorageResult;
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// An in-memory key/value store.
///
/// This store keeps all values in memory and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Clients that don't need persistence
///
/// # Thread Safety
///
/// This store is thread-safe and can be shared across threads.
///
/// # Example
///
/// ```rust
/// use subtrack_storage::{InMemoryStore, KeyValueStore};
///
/// let store = InMemoryStore::new();
/// store.put("a", b"1").unwrap();
/// assert_eq!(store.keys().unwrap(), vec!["a".to_string()]);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryStore {
    entries: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new in-memory store with pre-existing entries.
    ///
    /// Useful for testing recovery scenarios.
    #[must_use]
    pub fn with_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Vec<u8>>,
    {
        let entries = entries
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self {
            entries: RwLock::new(entries),
        }
    }

    /// Returns the number of stored keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Clears all entries from the store.
    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

impl KeyValueStore for InMemoryStore {
    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        validate_key(key)?;
        Ok(self.entries.read().get(key).cloned())
    }

    fn put(&self, key: &str, value: &[u8]) -> StorageResult<()> {
        validate_key(key)?;
        self.entries.write().insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> StorageResult<()> {
        validate_key(key)?;
        self.entries.write().remove(key);
        Ok(())
    }

    fn keys(&self) -> StorageResult<Vec<String>> {
        Ok(self.entries.read().keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StorageError;

    #[test]
    fn memory_new_is_empty() {
        let store = InMemoryStore::new();
        assert!(store.is_empty());
        assert!(store.keys().unwrap().is_empty());
    }

    #[test]
    fn memory_put_then_get() {
        let store = InMemoryStore::new();
        store.put("queue", b"[1,2]").unwrap();

        assert_eq!(store.get("queue").unwrap(), Some(b"[1,2]".to_vec()));
        assert_eq!(store.get("other").unwrap(), None);
    }

    #[test]
    fn memory_put_replaces_value() {
        let store = InMemoryStore::new();
        store.put("k", b"first").unwrap();
        store.put("k", b"second").unwrap();

        assert_eq!(store.get("k").unwrap(), Some(b"second".to_vec()));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn memory_delete_is_idempotent() {
        let store = InMemoryStore::new();
        store.put("k", b"v").unwrap();

        store.delete("k").unwrap();
        store.delete("k").unwrap();
        assert!(!store.contains("k").unwrap());
    }

    #[test]
    fn memory_with_entries() {
        let store = InMemoryStore::with_entries([("b", b"2".to_vec()), ("a", b"1".to_vec())]);
        assert_eq!(store.keys().unwrap(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn memory_rejects_invalid_key() {
        let store = InMemoryStore::new();
        let result = store.put("a/b", b"x");
        assert!(matches!(result, Err(StorageError::InvalidKey(_))));
    }

    #[test]
    fn memory_clear() {
        let store = InMemoryStore::new();
        store.put("k", b"v").unwrap();
        store.clear();
        assert!(store.is_empty());
    }
}
