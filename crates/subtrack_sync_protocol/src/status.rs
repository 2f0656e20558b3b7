//! Sync status values.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Process-wide synchronization status of one client.
///
/// Transitions:
///
/// ```text
/// IDLE ──► SYNCING ──► IDLE | ERROR
///   any ──► OFFLINE   (reachability probe failed)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SyncStatus {
    /// No pass running; the last pass (if any) succeeded.
    #[default]
    Idle,
    /// A pass is in progress.
    Syncing,
    /// The remote store was unreachable at the last probe.
    Offline,
    /// The last pass failed.
    Error,
}

impl SyncStatus {
    /// Returns the uppercase name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Idle => "IDLE",
            SyncStatus::Syncing => "SYNCING",
            SyncStatus::Offline => "OFFLINE",
            SyncStatus::Error => "ERROR",
        }
    }

    /// Returns true while a pass is running.
    #[must_use]
    pub fn is_syncing(&self) -> bool {
        matches!(self, SyncStatus::Syncing)
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
