//! # Subtrack Sync Engine
//!
//! Offline-first reconciliation between a local subscription replica and
//! a remote REST store.
//!
//! This crate provides:
//! - A durable, FIFO operation log with a dead-letter list
//! - The [`RemoteGateway`] abstraction and its HTTP implementation
//! - The [`LocalReplica`] abstraction and an in-memory replica
//! - The sync engine (drain, then pull and reconcile)
//! - Status broadcasting and periodic auto-sync
//! - The local mutation service
//!
//! ## Architecture
//!
//! Local edits never wait for the network:
//! 1. The edit is written to the local replica
//! 2. A matching operation is appended to the operation log
//! 3. A sync pass later drains the log against the remote store
//! 4. The pass then pulls the remote set and reconciles it row by row
//!
//! ## Key Invariants
//!
//! - The operation log is processed strictly in insertion order
//! - A failing operation never blocks the ones behind it
//! - An operation is attempted at most `max_retry_attempts` times
//! - The remote store decides existence, except for creations not yet sent
//! - At most one sync pass runs at a time

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod gateway;
mod http;
mod queue;
mod replica;
mod scheduler;
mod service;
mod state;
mod status;

pub use config::{SyncConfig, DEFAULT_MAX_RETRY_ATTEMPTS, DEFAULT_SYNC_INTERVAL};
pub use error::{SyncError, SyncResult};
pub use gateway::{MockGateway, RemoteGateway};
pub use http::{HttpGateway, HttpGatewayConfig};
pub use queue::{OperationLog, DEAD_LETTER_KEY, QUEUE_KEY};
pub use replica::{ChangeType, LocalReplica, MemoryReplica, ReplicaChange, RowMutation, REPLICA_KEY};
pub use service::SubscriptionService;
pub use state::{ResolvedConflict, SyncCycleResult, SyncEngine, SyncStats};
pub use status::{ListenerHandle, StatusRegistry};
