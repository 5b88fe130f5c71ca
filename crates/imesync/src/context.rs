//! Wiring shared by every command: runtime settings, directory roles,
//! configuration store and the operation entry points built on them.

use anyhow::{Context, Result};
use camino::Utf8Path;
use imesync_backup::BackupManager;
use imesync_core::settings::{
    load_embedded_default_configuration, HierarchicalSettingsLoader, RuntimeSettings,
};
use imesync_core::{ConfigStore, Configuration, DirectoryRegistry, PreferenceCache};
use imesync_deploy::{CommandEngine, Orchestrator};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub struct AppContext {
    pub settings: RuntimeSettings,
    pub registry: DirectoryRegistry,
    pub store: ConfigStore,
}

impl AppContext {
    /// Load runtime settings, from `settings_dir` when given
    pub fn load(settings_dir: Option<&Utf8Path>) -> Result<Self> {
        let loader = match settings_dir {
            Some(dir) => HierarchicalSettingsLoader::with_dir(dir.to_path_buf()),
            None => HierarchicalSettingsLoader::new()?,
        };
        let settings = loader
            .load()
            .with_context(|| format!("Failed to load settings from {}", loader.config_dir()))?;
        let roots = loader.storage_roots(&settings)?;
        debug!(
            "Storage roots: sandbox={} shared={} bundle={}",
            roots.sandbox, roots.shared, roots.bundle
        );

        let registry = DirectoryRegistry::new(roots);
        let store = ConfigStore::new(PreferenceCache::new(registry.cache_path()?));
        Ok(Self {
            settings,
            registry,
            store,
        })
    }

    pub fn orchestrator(&self) -> Orchestrator {
        let engine = CommandEngine::new(self.settings.engine.clone());
        Orchestrator::new(
            self.registry.clone(),
            self.store.clone(),
            self.settings.clone(),
            Arc::new(engine),
        )
    }

    pub fn backup_manager(&self) -> BackupManager {
        BackupManager::new(
            self.registry.clone(),
            self.store.clone(),
            self.settings.backup.clone(),
        )
    }

    /// Default configuration used to restore single fields
    pub fn default_configuration(&self) -> Result<Configuration> {
        match self.store.load_default_from_cache() {
            Ok(config) => Ok(config),
            Err(e) if e.is_not_found() => Ok(load_embedded_default_configuration()?),
            Err(e) => Err(e.into()),
        }
    }

    /// Run blocking library work under the operation timeout.
    ///
    /// Backup and restore take the operation lock inside `f`, so a timeout
    /// here returns early but the lock stays held until `f` has finished.
    pub async fn blocking<T, F>(&self, operation: &str, f: F) -> Result<T>
    where
        F: FnOnce() -> imesync_core::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let limit = self.settings.operation.timeout();
        within(operation, limit, async {
            Ok(tokio::task::spawn_blocking(f)
                .await
                .context("Operation task failed")??)
        })
        .await
    }
}

async fn within<T>(
    operation: &str,
    limit: Duration,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(imesync_core::Error::TimedOut {
            operation: operation.to_string(),
            seconds: limit.as_secs(),
        }
        .into()),
    }
}
