//! # Subtrack Testkit
//!
//! Test utilities for subtrack.
//!
//! This crate provides:
//! - An in-memory remote store implementing the remote gateway
//! - Sample subscriptions and a ready-wired test client
//! - Property-based test generators using proptest
//! - A reference model for replay checks
//!
//! ## Usage
//!
//! ```rust,ignore
//! use subtrack_testkit::prelude::*;
//!
//! #[tokio::test]
//! async fn pushes_offline_edits() {
//!     let client = TestClient::new(Arc::new(InMemoryRemote::new()), test_config());
//!     client.service.add(netflix()).unwrap();
//!     assert!(client.engine().sync().await.success);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod model;
pub mod remote;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::model::*;
    pub use crate::remote::*;
}

pub use fixtures::*;
pub use generators::*;
pub use model::*;
pub use remote::*;
