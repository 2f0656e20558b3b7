//! CLI command implementations.

pub mod edit;
pub mod list;
pub mod queue;
pub mod sync;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use subtrack_storage::{FileStore, KeyValueStore};
use subtrack_sync_engine::{
    HttpGateway, HttpGatewayConfig, MemoryReplica, OperationLog, SubscriptionService, SyncConfig,
    SyncEngine,
};

/// Service type every command works through.
pub type Service = SubscriptionService<HttpGateway, MemoryReplica>;

/// Local state location plus server settings shared by all commands.
#[derive(Debug, Clone)]
pub struct Workspace {
    data_dir: PathBuf,
    server: String,
    token: Option<String>,
    timeout: Option<Duration>,
}

impl Workspace {
    /// Creates a workspace rooted at `data_dir`.
    pub fn new(data_dir: PathBuf, server: String, token: Option<String>) -> Self {
        Self {
            data_dir,
            server,
            token,
            timeout: None,
        }
    }

    /// Sets the HTTP request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Returns the data directory.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Opens the replica and queue from disk and wires them to the server.
    ///
    /// Auto-sync is always off: commands run one step and exit. Nothing
    /// touches the network until [`SyncEngine::sync`] is called.
    pub fn open(&self, config: SyncConfig) -> Result<Service, Box<dyn std::error::Error>> {
        let store: Arc<dyn KeyValueStore> = Arc::new(FileStore::open(&self.data_dir)?);
        let replica = Arc::new(MemoryReplica::with_store(Arc::clone(&store))?);
        let log = Arc::new(OperationLog::open(store));

        let mut gateway_config = HttpGatewayConfig::new(self.server.as_str());
        if let Some(token) = &self.token {
            gateway_config = gateway_config.with_token(token.as_str());
        }
        if let Some(timeout) = self.timeout {
            gateway_config = gateway_config.with_timeout(timeout);
        }
        let gateway = Arc::new(HttpGateway::new(gateway_config)?);

        let config = config.with_auto_sync(false).with_sync_on_write(false);
        let engine = SyncEngine::new(config, gateway, replica, log);
        Ok(SubscriptionService::new(Arc::new(engine)))
    }

    /// Opens the workspace with the default sync settings.
    pub fn open_default(&self) -> Result<Service, Box<dyn std::error::Error>> {
        self.open(SyncConfig::default())
    }
}

/// Formats a price with two decimals and its currency.
pub fn format_price(price: f64, currency: &str) -> String {
    format!("{price:.2} {currency}")
}


#[cfg(test)]
mod tests {
    use super::test_support::temp_workspace;
    use super::*;
    use subtrack_sync_protocol::NewSubscription;

    #[test]
    fn state_persists_between_opens() {
        let (_dir, workspace) = temp_workspace();

        let service = workspace.open_default().unwrap();
        let added = service
            .add(NewSubscription::new(
                "Netflix",
                9.99,
                "monthly",
                "2024-01-01",
                "2024-02-01",
            ))
            .unwrap();
        drop(service);

        let service = workspace.open_default().unwrap();
        assert_eq!(service.get(&added.id).unwrap().unwrap().name, "Netflix");
        assert_eq!(service.engine().log().size(), 1);
    }

    #[test]
    fn bad_server_url_is_rejected() {
        let (dir, _) = temp_workspace();
        let workspace = Workspace::new(dir.path().to_path_buf(), "not a url".into(), None);
        assert!(workspace.open_default().is_err());
    }

    #[test]
    fn price_has_two_decimals() {
        assert_eq!(format_price(9.9, "USD"), "9.90 USD");
    }
}
