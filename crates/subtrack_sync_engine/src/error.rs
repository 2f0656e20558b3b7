//! Error types for the sync engine.

use subtrack_storage::StorageError;
use subtrack_sync_protocol::ProtocolError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// The remote store answered with a non-success status.
    #[error("HTTP {status}: {message}")]
    Http {
        /// Status code.
        status: u16,
        /// Response body or reason phrase.
        message: String,
    },

    /// Authentication failed (401 or 403).
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// A response body could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// A payload or enum value was malformed.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Local storage failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// The local replica rejected a read or write.
    #[error("replica error: {0}")]
    Replica(String),

    /// The reachability probe failed.
    #[error("Offline")]
    Offline,

    /// A pass was requested while another one was running.
    #[error("sync already in progress")]
    AlreadySyncing,

    /// Timeout.
    #[error("operation timed out")]
    Timeout,
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::Http { status, .. } => *status >= 500 || *status == 429,
            SyncError::Timeout | SyncError::Offline | SyncError::AlreadySyncing => true,
            _ => false,
        }
    }
}
