//! # subtrack Sync Protocol
//!
//! Value types shared by the subtrack sync engine, its test kit and the CLI.
//!
//! This crate provides:
//! - [`Subscription`], the entity being synchronized, in its local shape
//! - [`SyncOperation`] for queued mutations
//! - [`ConflictStrategy`], the pure conflict decision function
//! - [`SyncStatus`]
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod conflict;
mod error;
mod operation;
mod status;
mod subscription;

pub use conflict::{ConflictAction, ConflictStrategy};
pub use error::{ProtocolError, ProtocolResult};
pub use operation::{EntityType, NewOperation, OperationKind, SyncOperation};
pub use status::SyncStatus;
pub use subscription::{
    format_timestamp, parse_timestamp_millis, NewSubscription, Subscription, SubscriptionPatch,
    DEFAULT_CURRENCY, STATUS_ACTIVE,
};
