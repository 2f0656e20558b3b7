//! # subtrack storage
//!
//! Key/value persistence backends for subtrack.
//!
//! Stores are **opaque byte stores** addressed by a short string key. They do
//! not interpret the bytes they hold: the sync engine decides what a value
//! means (a JSON operation log, a replica snapshot, ...).
//!
//! ## Design Principles
//!
//! - A `put` replaces the whole value for a key
//! - A value is either fully written or not written at all
//! - Stores must be `Send + Sync` so they can sit behind an `Arc`
//!
//! ## Available Stores
//!
//! - [`InMemoryStore`] - For testing and ephemeral clients
//! - [`FileStore`] - One file per key inside a directory
//!
//! ## Example
//!
//! ```rust
//! use subtrack_storage::{InMemoryStore, KeyValueStore};
//!
//! let store = InMemoryStore::new();
//! store.put("queue", b"[]").unwrap();
//! assert_eq!(store.get("queue").unwrap().as_deref(), Some(&b"[]"[..]));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::{validate_key, KeyValueStore};
pub use error::{StorageError, StorageResult};
pub use file::FileStore;
pub use memory::InMemoryStore;
