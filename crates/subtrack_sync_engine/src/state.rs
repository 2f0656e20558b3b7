//! Reconciliation engine.
//!
//! One sync pass runs through these steps:
//!
//! 1. Take the in-flight guard; a second overlapping call fails with
//!    [`SyncError::AlreadySyncing`].
//! 2. Probe reachability. Unreachable means status `OFFLINE`, a failed
//!    result and no further remote calls.
//! 3. Status `SYNCING`.
//! 4. **Drain**: apply every queued operation in log order. Successes are
//!    removed; failures are counted and moved to the dead-letter list once
//!    they reach the retry bound. One failure never stops the drain.
//! 5. **Pull**: fetch the remote set and reconcile it row by row with the
//!    local replica under the configured [`ConflictStrategy`].
//! 6. Status `IDLE` on success, `ERROR` on any other failure. Progress made
//!    before the failure is kept.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::gateway::RemoteGateway;
use crate::queue::OperationLog;
use crate::replica::{LocalReplica, RowMutation};
use crate::status::{ListenerHandle, StatusRegistry};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use subtrack_sync_protocol::{
    ConflictAction, ConflictStrategy, EntityType, NewOperation, OperationKind, Subscription,
    SyncOperation, SyncStatus,
};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Statistics about sync passes.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Passes that completed successfully.
    pub cycles_completed: u64,
    /// Passes that failed, offline passes included.
    pub cycles_failed: u64,
    /// Operations applied remotely.
    pub operations_pushed: u64,
    /// Operations moved to the dead-letter list.
    pub operations_dropped: u64,
    /// Rows inserted locally from the remote set.
    pub entities_inserted: u64,
    /// Rows overwritten locally by a remote version.
    pub entities_updated: u64,
    /// Rows removed locally because the remote set lacked them.
    pub entities_removed: u64,
    /// Conflicts decided by the conflict strategy.
    pub conflicts_resolved: u64,
    /// End of the last successful pass.
    pub last_sync_time: Option<Instant>,
    /// Message of the last failed pass.
    pub last_error: Option<String>,
}

/// A conflict decided during the pull step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConflict {
    /// Entity id.
    pub entity_id: String,
    /// Which side won.
    pub action: ConflictAction,
    /// Local `updated_at` in epoch milliseconds.
    pub local_updated_at: i64,
    /// Remote `updated_at` in epoch milliseconds.
    pub remote_updated_at: i64,
}

/// Result of one sync pass.
#[derive(Debug, Clone, Default)]
pub struct SyncCycleResult {
    /// Whether drain and pull both completed.
    pub success: bool,
    /// Failure message.
    pub error: Option<String>,
    /// Operations applied remotely.
    pub pushed: u64,
    /// Operations that reached the retry bound in this pass.
    pub dropped: Vec<SyncOperation>,
    /// Rows inserted locally.
    pub inserted: u64,
    /// Rows overwritten by a remote version.
    pub updated: u64,
    /// Rows removed locally.
    pub removed: u64,
    /// Conflicts decided in this pass.
    pub conflicts: Vec<ResolvedConflict>,
    /// Wall-clock duration of the pass.
    pub duration: Duration,
}

impl SyncCycleResult {
    fn failed(error: &SyncError, duration: Duration) -> Self {
        Self {
            error: Some(error.to_string()),
            duration,
            ..Self::default()
        }
    }
}

/// Clears the in-flight flag when the pass ends, however it ends.
struct InFlightGuard<'a>(&'a AtomicBool);

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// The sync engine reconciles the local replica with the remote store.
pub struct SyncEngine<G: RemoteGateway, R: LocalReplica> {
    pub(crate) config: SyncConfig,
    gateway: Arc<G>,
    replica: Arc<R>,
    log: Arc<OperationLog>,
    status: StatusRegistry,
    stats: RwLock<SyncStats>,
    in_flight: AtomicBool,
    pub(crate) auto_sync: Mutex<Option<JoinHandle<()>>>,
}

impl<G: RemoteGateway, R: LocalReplica> SyncEngine<G, R> {
    /// Creates an engine. Auto-sync is not started; see
    /// [`SyncEngine::launch`].
    pub fn new(
        config: SyncConfig,
        gateway: Arc<G>,
        replica: Arc<R>,
        log: Arc<OperationLog>,
    ) -> Self {
        Self {
            config,
            gateway,
            replica,
            log,
            status: StatusRegistry::new(),
            stats: RwLock::new(SyncStats::default()),
            in_flight: AtomicBool::new(false),
            auto_sync: Mutex::new(None),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Returns the remote gateway.
    pub fn gateway(&self) -> &Arc<G> {
        &self.gateway
    }

    /// Returns the local replica.
    pub fn replica(&self) -> &Arc<R> {
        &self.replica
    }

    /// Returns the operation log.
    pub fn log(&self) -> &Arc<OperationLog> {
        &self.log
    }

    /// Returns the current status.
    pub fn status(&self) -> SyncStatus {
        self.status.current()
    }

    /// Registers a status listener, called synchronously on every
    /// transition.
    pub fn on_status_change<F>(&self, listener: F) -> ListenerHandle
    where
        F: Fn(SyncStatus) + Send + Sync + 'static,
    {
        self.status.subscribe(listener)
    }

    /// Returns cumulative statistics.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Returns true while a pass is running.
    pub fn is_syncing(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Runs one sync pass.
    ///
    /// Never returns an error: failures are reported in the result and
    /// through the status.
    pub async fn sync(&self) -> SyncCycleResult {
        let start = Instant::now();

        let Some(_guard) = InFlightGuard::acquire(&self.in_flight) else {
            debug!("sync requested while another pass is running");
            return SyncCycleResult::failed(&SyncError::AlreadySyncing, start.elapsed());
        };

        if !self.gateway.check_reachable().await {
            info!("remote store unreachable, sync skipped");
            self.status.set(SyncStatus::Offline);
            let result = SyncCycleResult::failed(&SyncError::Offline, start.elapsed());
            self.record(&result);
            return result;
        }

        self.status.set(SyncStatus::Syncing);
        debug!(pending = self.log.size(), "sync pass started");

        let mut result = SyncCycleResult::default();
        let outcome = match self.drain(&mut result).await {
            Ok(()) => self.pull(&mut result).await,
            Err(e) => Err(e),
        };
        result.duration = start.elapsed();

        match outcome {
            Ok(()) => {
                result.success = true;
                info!(
                    pushed = result.pushed,
                    dropped = result.dropped.len(),
                    inserted = result.inserted,
                    updated = result.updated,
                    removed = result.removed,
                    conflicts = result.conflicts.len(),
                    duration_ms = result.duration.as_millis() as u64,
                    "sync pass completed"
                );
                self.status.set(SyncStatus::Idle);
            }
            Err(e) => {
                error!(error = %e, "sync pass failed");
                result.error = Some(e.to_string());
                self.status.set(SyncStatus::Error);
            }
        }

        self.record(&result);
        result
    }

    /// Applies every queued operation once, in log order.
    async fn drain(&self, result: &mut SyncCycleResult) -> SyncResult<()> {
        let planned: Vec<String> = self.log.all().into_iter().map(|op| op.id).collect();

        for op_id in planned {
            // Re-read: an earlier CREATE in this pass may have re-keyed it.
            let Some(operation) = self.log.get(&op_id) else {
                continue;
            };

            match self.gateway.apply(&operation).await {
                Ok(remote) => {
                    self.log.remove(&op_id);
                    result.pushed += 1;
                    debug!(
                        op_id = %operation.id,
                        entity_id = %operation.entity_id,
                        kind = %operation.kind,
                        "operation applied"
                    );

                    if operation.kind == OperationKind::Create {
                        if let Some(remote) = remote.filter(|r| r.id != operation.entity_id) {
                            self.adopt_server_id(&operation.entity_id, &remote.id)?;
                        }
                    }
                }
                Err(e) => {
                    let Some(failed) = self.log.record_attempt(&op_id, Some(e.to_string())) else {
                        continue;
                    };
                    if failed.is_exhausted(self.config.max_retry_attempts) {
                        if let Some(dropped) = self.log.dead_letter(&op_id) {
                            error!(
                                op_id = %dropped.id,
                                entity_id = %dropped.entity_id,
                                kind = %dropped.kind,
                                attempts = dropped.attempts,
                                retryable = e.is_retryable(),
                                error = %e,
                                "operation dropped after reaching the retry bound"
                            );
                            result.dropped.push(dropped);
                        }
                    } else {
                        warn!(
                            op_id = %failed.id,
                            entity_id = %failed.entity_id,
                            attempts = failed.attempts,
                            retryable = e.is_retryable(),
                            error = %e,
                            "operation failed, will retry"
                        );
                    }
                }
            }
        }
        Ok(())
    }

    /// Moves a created row and its queued operations to the id the remote
    /// store assigned.
    fn adopt_server_id(&self, local_id: &str, server_id: &str) -> SyncResult<()> {
        let rekeyed = self.log.rekey(local_id, server_id);
        if let Some(mut row) = self.replica.get(local_id)? {
            row.id = server_id.to_string();
            self.replica.apply_batch(vec![
                RowMutation::Delete(local_id.to_string()),
                RowMutation::Set(row),
            ])?;
        }
        info!(local_id, server_id, rekeyed, "created entity re-keyed to server id");
        Ok(())
    }

    /// Reconciles the remote set with the local replica.
    async fn pull(&self, result: &mut SyncCycleResult) -> SyncResult<()> {
        let remote_rows = self.gateway.fetch_all().await?;
        let mut local: HashMap<String, Subscription> = self
            .replica
            .all()?
            .into_iter()
            .map(|row| (row.id.clone(), row))
            .collect();

        for remote in remote_rows {
            match local.remove(&remote.id) {
                Some(local_row) => self.reconcile(local_row, remote, result)?,
                None => {
                    debug!(entity_id = %remote.id, "inserting remote row");
                    self.replica.set(remote)?;
                    result.inserted += 1;
                }
            }
        }

        for id in local.into_keys() {
            if self.log.pending_create(EntityType::Subscription, &id) {
                continue;
            }
            if self.replica.delete(&id)? {
                debug!(entity_id = %id, "removed row missing from remote store");
                result.removed += 1;
            }
        }
        Ok(())
    }

    fn reconcile(
        &self,
        local: Subscription,
        remote: Subscription,
        result: &mut SyncCycleResult,
    ) -> SyncResult<()> {
        if local == remote {
            return Ok(());
        }
        if local.same_fields(&remote) {
            // Only timestamps differ. No strategy is consulted, not even
            // client-wins, so pushing the same content cannot loop.
            self.replica.set(remote)?;
            return Ok(());
        }

        let strategy: ConflictStrategy = self.config.conflict_strategy;
        let action = strategy.resolve(&local, &remote);
        let conflict = ResolvedConflict {
            entity_id: local.id.clone(),
            action,
            local_updated_at: local.updated_at_millis(),
            remote_updated_at: remote.updated_at_millis(),
        };
        debug!(
            entity_id = %conflict.entity_id,
            strategy = strategy.as_str(),
            ?action,
            local_updated_at = conflict.local_updated_at,
            remote_updated_at = conflict.remote_updated_at,
            "conflict resolved"
        );

        match action {
            ConflictAction::AdoptRemote => {
                self.replica.set(remote)?;
                result.updated += 1;
            }
            ConflictAction::PushLocal => {
                if !self.log.has_pending(EntityType::Subscription, &local.id) {
                    self.log
                        .enqueue(NewOperation::update(local.id.clone(), local.to_payload()?));
                }
            }
        }
        result.conflicts.push(conflict);
        Ok(())
    }

    fn record(&self, result: &SyncCycleResult) {
        let mut stats = self.stats.write();
        if result.success {
            stats.cycles_completed += 1;
            stats.last_sync_time = Some(Instant::now());
            stats.last_error = None;
        } else {
            stats.cycles_failed += 1;
            stats.last_error.clone_from(&result.error);
        }
        stats.operations_pushed += result.pushed;
        stats.operations_dropped += result.dropped.len() as u64;
        stats.entities_inserted += result.inserted;
        stats.entities_updated += result.updated;
        stats.entities_removed += result.removed;
        stats.conflicts_resolved += result.conflicts.len() as u64;
    }
}

impl<G, R> SyncEngine<G, R>
where
    G: RemoteGateway + 'static,
    R: LocalReplica + 'static,
{
    /// Runs a pass in the background on the current tokio runtime.
    ///
    /// Returns false when called outside a runtime.
    pub fn request_sync(self: &Arc<Self>) -> bool {
        let Ok(runtime) = Handle::try_current() else {
            debug!("no tokio runtime, background sync not started");
            return false;
        };
        let engine = Arc::clone(self);
        runtime.spawn(async move {
            let result = engine.sync().await;
            if let Some(error) = result.error {
                debug!(%error, "background sync pass did not complete");
            }
        });
        true
    }
}

impl<G: RemoteGateway, R: LocalReplica> Drop for SyncEngine<G, R> {
    fn drop(&mut self) {
        if let Some(handle) = self.auto_sync.get_mut().take() {
            handle.abort();
        }
    }
}

impl<G: RemoteGateway, R: LocalReplica> std::fmt::Debug for SyncEngine<G, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("config", &self.config)
            .field("status", &self.status())
            .field("pending", &self.log.size())
            .finish()
    }
}
