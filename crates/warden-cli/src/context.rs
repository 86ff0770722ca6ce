//! Wiring: home, config, store, registry, broker and catalog client.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use warden_catalog::CatalogClient;
use warden_config::Config;
use warden_core::dirs::WardenHome;
use warden_installer::{ExtractLimits, Installer};
use warden_policy::SecurityPolicy;
use warden_registry::{PermissionBroker, Registry};
use warden_storage::{FileKvStore, KvStore};

use crate::config_bridge;

/// Resolve the home directory from `--home`, `$WARDEN_HOME` or `~/.warden`.
pub(crate) fn resolve_home(home: Option<PathBuf>) -> anyhow::Result<WardenHome> {
    match home {
        Some(path) => {
            let path = if path.is_absolute() {
                path
            } else {
                std::env::current_dir()?.join(path)
            };
            Ok(WardenHome::from_path(path))
        },
        None => WardenHome::resolve().context("failed to resolve warden home"),
    }
}

/// Everything a command needs, opened against one home directory.
///
/// The broker's expiry sweeper runs until the `App` is dropped.
pub(crate) struct App {
    pub(crate) home: WardenHome,
    pub(crate) policy: Arc<SecurityPolicy>,
    pub(crate) catalog: CatalogClient,
    pub(crate) registry: Arc<Registry>,
    pub(crate) broker: Arc<PermissionBroker>,
    limits: ExtractLimits,
    sweeper: CancellationToken,
}

impl App {
    pub(crate) async fn open(home: WardenHome, config: &Config) -> anyhow::Result<Self> {
        home.ensure()
            .with_context(|| format!("failed to create {}", home.root().display()))?;

        let store: Arc<dyn KvStore> = Arc::new(
            FileKvStore::open(home.state_dir()).context("failed to open state store")?,
        );
        let registry = Arc::new(
            Registry::open(home.clone(), Arc::clone(&store))
                .await
                .context("failed to load registry")?,
        );
        let policy = Arc::new(config_bridge::to_security_policy(config));
        let broker = Arc::new(
            PermissionBroker::open(
                Arc::clone(&registry),
                Arc::clone(&policy),
                store,
                config_bridge::to_broker_settings(config),
            )
            .await
            .context("failed to load pending requests")?,
        );
        let catalog = CatalogClient::new(config_bridge::to_catalog_settings(config))?;
        let sweeper = CancellationToken::new();
        broker.spawn_sweeper(sweeper.clone());
        debug!(home = %home.root().display(), "Opened warden home");

        Ok(Self {
            home,
            policy,
            catalog,
            registry,
            broker,
            limits: config_bridge::to_extract_limits(config),
            sweeper,
        })
    }

    pub(crate) fn installer(&self) -> Installer {
        Installer::new(
            self.home.clone(),
            self.catalog.clone(),
            Arc::clone(&self.policy),
            Arc::clone(&self.registry),
            Arc::clone(&self.broker),
        )
        .with_extract_limits(self.limits)
    }
}

impl Drop for App {
    fn drop(&mut self) {
        self.sweeper.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_runs_the_sweeper_until_drop() {
        let dir = tempfile::tempdir().unwrap();
        let home = WardenHome::from_path(dir.path().join("home"));
        let app = App::open(home, &Config::default()).await.unwrap();
        assert!(app.home.logs_dir().is_dir());

        let sweeper = app.sweeper.clone();
        assert!(!sweeper.is_cancelled());
        drop(app);
        assert!(sweeper.is_cancelled());
    }
}
