//! Periodic auto-sync.

use crate::config::SyncConfig;
use crate::gateway::RemoteGateway;
use crate::queue::OperationLog;
use crate::replica::LocalReplica;
use crate::state::SyncEngine;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Shortest interval the timer accepts.
const MIN_SYNC_INTERVAL: Duration = Duration::from_millis(10);

impl<G, R> SyncEngine<G, R>
where
    G: RemoteGateway + 'static,
    R: LocalReplica + 'static,
{
    /// Creates a shared engine and starts auto-sync if the configuration
    /// enables it.
    pub fn launch(
        config: SyncConfig,
        gateway: Arc<G>,
        replica: Arc<R>,
        log: Arc<OperationLog>,
    ) -> Arc<Self> {
        let engine = Arc::new(Self::new(config, gateway, replica, log));
        if engine.config().auto_sync {
            engine.start_auto_sync();
        }
        engine
    }

    /// Starts the periodic sync task.
    ///
    /// The first pass runs one interval after the call. Returns false if the
    /// task is already running or there is no tokio runtime.
    pub fn start_auto_sync(self: &Arc<Self>) -> bool {
        let mut slot = self.auto_sync.lock();
        if slot.as_ref().is_some_and(|task| !task.is_finished()) {
            return false;
        }
        let Ok(runtime) = Handle::try_current() else {
            warn!("auto-sync needs a tokio runtime");
            return false;
        };

        let period = self.config.sync_interval.max(MIN_SYNC_INTERVAL);
        let engine = Arc::downgrade(self);
        *slot = Some(runtime.spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(engine) = engine.upgrade() else {
                    break;
                };
                let result = engine.sync().await;
                if let Some(error) = result.error {
                    debug!(%error, "scheduled sync pass did not complete");
                }
            }
        }));

        info!(interval_ms = period.as_millis() as u64, "auto-sync started");
        true
    }

    /// Stops the periodic sync task. A pass already running finishes.
    ///
    /// Returns false if auto-sync was not running.
    pub fn stop_auto_sync(&self) -> bool {
        let Some(task) = self.auto_sync.lock().take() else {
            return false;
        };
        let was_running = !task.is_finished();
        task.abort();
        info!("auto-sync stopped");
        was_running
    }

    /// Returns true while the periodic task is running.
    pub fn is_auto_syncing(&self) -> bool {
        self.auto_sync
            .lock()
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }
}
