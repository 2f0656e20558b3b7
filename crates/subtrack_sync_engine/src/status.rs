//! Sync status registry.

use parking_lot::RwLock;
use std::sync::{Arc, Weak};
use subtrack_sync_protocol::SyncStatus;

type Listener = Arc<dyn Fn(SyncStatus) + Send + Sync>;

struct Inner {
    status: SyncStatus,
    listeners: Vec<(u64, Listener)>,
    next_id: u64,
}

/// Holds the current [`SyncStatus`] and notifies listeners on every change.
///
/// Listeners run synchronously on the thread that sets the status, after
/// the registry lock is released, so a listener may read the status or
/// unsubscribe itself.
#[derive(Clone)]
pub struct StatusRegistry {
    inner: Arc<RwLock<Inner>>,
}

impl StatusRegistry {
    /// Creates a registry in [`SyncStatus::Idle`] with no listeners.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner {
                status: SyncStatus::Idle,
                listeners: Vec::new(),
                next_id: 0,
            })),
        }
    }

    /// Returns the current status.
    pub fn current(&self) -> SyncStatus {
        self.inner.read().status
    }

    /// Sets the status and notifies every listener.
    pub fn set(&self, status: SyncStatus) {
        let listeners: Vec<Listener> = {
            let mut inner = self.inner.write();
            inner.status = status;
            inner
                .listeners
                .iter()
                .map(|(_, listener)| Arc::clone(listener))
                .collect()
        };
        for listener in listeners {
            listener(status);
        }
    }

    /// Registers a listener.
    ///
    /// The listener stays registered until [`ListenerHandle::unsubscribe`]
    /// is called; dropping the handle does not remove it.
    pub fn subscribe<F>(&self, listener: F) -> ListenerHandle
    where
        F: Fn(SyncStatus) + Send + Sync + 'static,
    {
        let mut inner = self.inner.write();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.listeners.push((id, Arc::new(listener)));
        ListenerHandle {
            id,
            registry: Arc::downgrade(&self.inner),
        }
    }

    #[cfg(test)]
    pub(crate) fn listener_count(&self) -> usize {
        self.inner.read().listeners.len()
    }
}

impl Default for StatusRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for StatusRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("StatusRegistry")
            .field("status", &inner.status)
            .field("listeners", &inner.listeners.len())
            .finish()
    }
}

/// Handle returned by [`StatusRegistry::subscribe`].
#[derive(Debug)]
pub struct ListenerHandle {
    id: u64,
    registry: Weak<RwLock<Inner>>,
}

impl ListenerHandle {
    /// Removes this listener. Other listeners are unaffected.
    ///
    /// Returns false if the listener was already gone.
    pub fn unsubscribe(self) -> bool {
        let Some(registry) = self.registry.upgrade() else {
            return false;
        };
        let mut inner = registry.write();
        let before = inner.listeners.len();
        inner.listeners.retain(|(id, _)| *id != self.id);
        inner.listeners.len() < before
    }
}
