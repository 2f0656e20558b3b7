//! Error types for storage operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The key contains characters outside `[A-Za-z0-9_.-]` or is empty.
    #[error("invalid storage key: {0:?}")]
    InvalidKey(String),

    /// The store root is not usable.
    #[error("storage root unavailable: {0}")]
    Unavailable(String),
}
