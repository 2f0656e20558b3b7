//! Configuration for the sync engine.

use std::time::Duration;
use subtrack_sync_protocol::ConflictStrategy;

/// Default interval between automatic sync passes.
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(60);

/// Default number of failed transmissions before an operation is dropped.
pub const DEFAULT_MAX_RETRY_ATTEMPTS: u32 = 3;

/// Configuration for sync operations.
///
/// Supplied at construction and never changed while a pass runs.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncConfig {
    /// Interval between automatic sync passes.
    pub sync_interval: Duration,
    /// Failed transmissions after which an operation is dropped.
    pub max_retry_attempts: u32,
    /// Policy applied when an entity exists on both sides.
    pub conflict_strategy: ConflictStrategy,
    /// Whether the engine runs passes on a timer.
    pub auto_sync: bool,
    /// Whether each local mutation requests a background pass.
    pub sync_on_write: bool,
}

impl SyncConfig {
    /// Creates a configuration with the default values.
    pub fn new() -> Self {
        Self {
            sync_interval: DEFAULT_SYNC_INTERVAL,
            max_retry_attempts: DEFAULT_MAX_RETRY_ATTEMPTS,
            conflict_strategy: ConflictStrategy::LastWriteWins,
            auto_sync: true,
            sync_on_write: false,
        }
    }

    /// Sets the auto-sync interval.
    pub fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = interval;
        self
    }

    /// Sets the retry bound.
    ///
    /// A bound of 0 behaves like 1: the first failure drops the operation.
    pub fn with_max_retry_attempts(mut self, attempts: u32) -> Self {
        self.max_retry_attempts = attempts;
        self
    }

    /// Sets the conflict strategy.
    pub fn with_conflict_strategy(mut self, strategy: ConflictStrategy) -> Self {
        self.conflict_strategy = strategy;
        self
    }

    /// Enables or disables the periodic timer.
    pub fn with_auto_sync(mut self, enabled: bool) -> Self {
        self.auto_sync = enabled;
        self
    }

    /// Enables or disables a background pass after each local mutation.
    pub fn with_sync_on_write(mut self, enabled: bool) -> Self {
        self.sync_on_write = enabled;
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}
