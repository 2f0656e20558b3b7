//! Conflict detection and resolution.

use crate::error::{ProtocolError, ProtocolResult};
use crate::subscription::Subscription;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Decision taken for an entity that exists on both sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictAction {
    /// Overwrite the local entity with the remote version.
    AdoptRemote,
    /// Keep the local entity and queue an UPDATE carrying it.
    PushLocal,
}

impl fmt::Display for ConflictAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictAction::AdoptRemote => f.write_str("adopt-remote"),
            ConflictAction::PushLocal => f.write_str("push-local"),
        }
    }
}

/// Policy for automatic conflict resolution.
///
/// Timestamps are the millisecond value of each side's `updated_at`, with a
/// missing timestamp counting as the epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConflictStrategy {
    /// Server always wins.
    ServerWins,
    /// Newer `updated_at` wins; ties go to the server.
    #[default]
    LastWriteWins,
    /// Client always wins.
    ClientWins,
}

impl ConflictStrategy {
    /// Decides which version of an entity wins.
    ///
    /// This is a pure function of its inputs.
    #[must_use]
    pub fn resolve(&self, local: &Subscription, remote: &Subscription) -> ConflictAction {
        self.decide(local.updated_at_millis(), remote.updated_at_millis())
    }

    /// Decides from the two millisecond timestamps alone.
    #[must_use]
    pub fn decide(&self, local_millis: i64, remote_millis: i64) -> ConflictAction {
        match self {
            ConflictStrategy::ServerWins => ConflictAction::AdoptRemote,
            ConflictStrategy::ClientWins => ConflictAction::PushLocal,
            ConflictStrategy::LastWriteWins => {
                if local_millis > remote_millis {
                    ConflictAction::PushLocal
                } else {
                    ConflictAction::AdoptRemote
                }
            }
        }
    }

    /// Returns the kebab-case name used on the command line.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictStrategy::ServerWins => "server-wins",
            ConflictStrategy::LastWriteWins => "last-write-wins",
            ConflictStrategy::ClientWins => "client-wins",
        }
    }
}

impl fmt::Display for ConflictStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConflictStrategy {
    type Err = ProtocolError;

    /// Accepts `server-wins`, `SERVER_WINS`, `server_wins` and so on.
    fn from_str(s: &str) -> ProtocolResult<Self> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "server-wins" => Ok(ConflictStrategy::ServerWins),
            "last-write-wins" => Ok(ConflictStrategy::LastWriteWins),
            "client-wins" => Ok(ConflictStrategy::ClientWins),
            _ => Err(ProtocolError::unknown("conflict strategy", s)),
        }
    }
}
