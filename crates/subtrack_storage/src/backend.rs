//! Key/value store trait definition.

use crate::error::{StorageError, StorageResult};

/// Maximum accepted key length in bytes.
pub const MAX_KEY_LEN: usize = 128;

/// A low-level key/value store.
///
/// Stores are **opaque byte stores**. Callers hand over a complete value for a
/// key and get the same bytes back later; nothing about the content is
/// interpreted here.
///
/// # Invariants
///
/// - `get` returns exactly the bytes of the last successful `put` for that key
/// - A failed `put` leaves the previous value intact
/// - `delete` of a missing key is a no-op
/// - Stores must be `Send + Sync` for shared access
///
/// # Implementors
///
/// - [`super::InMemoryStore`] - For testing
/// - [`super::FileStore`] - For persistent storage
pub trait KeyValueStore: Send + Sync {
    /// Reads the value stored under `key`.
    ///
    /// Returns `Ok(None)` when nothing has been stored for the key.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or an I/O error occurs.
    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Replaces the value stored under `key`.
    ///
    /// After this returns successfully the value survives process
    /// termination (for durable stores).
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or the write fails.
    fn put(&self, key: &str, value: &[u8]) -> StorageResult<()>;

    /// Removes the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or the removal fails.
    fn delete(&self, key: &str) -> StorageResult<()>;

    /// Lists every key currently holding a value, sorted.
    ///
    /// # Errors
    ///
    /// Returns an error if the keys cannot be enumerated.
    fn keys(&self) -> StorageResult<Vec<String>>;

    /// Returns true if a value is stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails.
    fn contains(&self, key: &str) -> StorageResult<bool> {
        Ok(self.get(key)?.is_some())
    }
}

/// Checks that `key` only uses `[A-Za-z0-9_.-]` and is not empty.
///
/// The same rule applies to every store so that a key accepted by the
/// in-memory store is also a valid file name for [`super::FileStore`].
///
/// # Errors
///
/// Returns [`StorageError::InvalidKey`] when the key is rejected.
pub fn validate_key(key: &str) -> StorageResult<()> {
    let valid = !key.is_empty()
        && key.len() <= MAX_KEY_LEN
        && !key.starts_with('.')
        && key
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b'.'));

    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidKey(key.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn accepts_plain_keys() {
        assert!(validate_key("subscription_sync_queue").is_ok());
        assert!(validate_key("replica.v1").is_ok());
        assert!(validate_key("a-b").is_ok());
    }

    #[test]
    fn rejects_path_like_keys() {
        assert!(validate_key("").is_err());
        assert!(validate_key("../etc").is_err());
        assert!(validate_key("a/b").is_err());
        assert!(validate_key(".hidden").is_err());
        assert!(validate_key(&"k".repeat(MAX_KEY_LEN + 1)).is_err());
    }

    proptest! {
        #[test]
        fn generated_keys_are_accepted(key in "[A-Za-z0-9_][A-Za-z0-9_.-]{0,63}") {
            prop_assert!(validate_key(&key).is_ok());
        }

        #[test]
        fn separators_are_rejected(prefix in "[a-z]{0,8}", suffix in "[a-z]{0,8}", sep in "[/\\\\ ]") {
            let key = format!("{prefix}{sep}{suffix}");
            prop_assert!(validate_key(&key).is_err());
        }
    }
}
