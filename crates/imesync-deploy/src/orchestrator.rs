//! Deployment orchestrator
//!
//! Runs deploy, sync and reset as single sequential operations under the
//! operation lock. A deploy walks `LoadingConfig -> ApplyingPatch ->
//! SynchronizingFiles -> ReinitializingEngine -> PersistingConfig` and only
//! persists the configuration once files and engine are both in place, so
//! the durable document never describes a deployment that did not happen.
//!
//! Blocking steps each hold a share of the operation lock, so a timed-out
//! operation keeps the lock until its last filesystem step has returned.

use crate::engine::{EnginePaths, InputEngine};
use crate::state::DeployState;
use camino::{Utf8Path, Utf8PathBuf};
use imesync_core::config::{
    GeneralSection, AVAILABLE_SCHEMAS_KEY, CLOUD_ENABLED_KEY, CONFIG_FILE_NAME, NEEDS_RESYNC_KEY,
    SELECTED_SCHEMAS_KEY,
};
use imesync_core::roles::{DirectoryRegistry, DirectoryRole, StorageDomain};
use imesync_core::settings::{load_embedded_default_configuration, RuntimeSettings};
use imesync_core::{
    ConfigStore, Configuration, Error, OperationLock, PathFilter, Patch, Result, Schema,
    SchemaCatalog, SchemaSelection,
};
use imesync_sync::{
    check_cloud_writable, check_destination_writable, check_propagation, check_source_readable,
    ensure_writable_dir, merge_copy, replace_all, SyncReport,
};
use serde::Deserialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Engine installation file in the sandbox UserData
pub const INSTALLATION_FILE_NAME: &str = "installation.yaml";

/// Default engine sync directory below UserData
const DEFAULT_SYNC_DIR: &str = "sync";

const DATA_ROLES: [DirectoryRole; 2] = [DirectoryRole::SharedSupport, DirectoryRole::UserData];

/// What propagating the sandbox to the shared container did
#[derive(Debug, Clone)]
pub struct PropagationReport {
    /// Keyboard dictionaries pulled back first, when dictionaries are preserved
    pub dictionaries: Option<SyncReport>,
    pub shared_support: SyncReport,
    pub user_data: SyncReport,
}

/// Result of a lightweight sync
#[derive(Debug, Clone)]
pub struct SyncSummary {
    /// Engine sync directory that was checked
    pub sync_dir: Utf8PathBuf,
    pub propagation: PropagationReport,
    /// Cloud pulls followed by pushes, empty when cloud is off
    pub cloud: Vec<SyncReport>,
}

#[derive(Debug, Default, Deserialize)]
struct Installation {
    #[serde(default)]
    sync_dir: Option<String>,
}

pub struct Orchestrator {
    registry: DirectoryRegistry,
    store: ConfigStore,
    settings: RuntimeSettings,
    engine: Arc<dyn InputEngine>,
    state: watch::Sender<DeployState>,
}

impl Orchestrator {
    pub fn new(
        registry: DirectoryRegistry,
        store: ConfigStore,
        settings: RuntimeSettings,
        engine: Arc<dyn InputEngine>,
    ) -> Self {
        let (state, _) = watch::channel(DeployState::Idle);
        Self {
            registry,
            store,
            settings,
            engine,
            state,
        }
    }

    pub fn registry(&self) -> &DirectoryRegistry {
        &self.registry
    }

    pub fn store(&self) -> &ConfigStore {
        &self.store
    }

    /// Follow deploy state transitions
    pub fn subscribe(&self) -> watch::Receiver<DeployState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> DeployState {
        self.state.borrow().clone()
    }

    /// Cached configuration, else the durable document, else the built-in default
    pub fn current_configuration(&self) -> Result<Configuration> {
        match self.store.load_from_cache() {
            Ok(config) => return Ok(config),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }
        match self.store.load(&self.registry.durable_config_path()?) {
            Ok(config) => Ok(config),
            Err(e) if e.is_not_found() => {
                debug!("No durable configuration yet, using built-in default");
                load_embedded_default_configuration()
            }
            Err(e) => Err(e),
        }
    }

    /// Full deployment of `config`
    pub async fn deploy(&self, config: Configuration) -> Result<Configuration> {
        self.run_deploy(config, self.settings.operation.timeout())
            .await
    }

    /// Deployment without a foreground caller, under the shorter silent timeout
    pub async fn deploy_silent(&self, config: Configuration) -> Result<Configuration> {
        self.run_deploy(config, self.settings.operation.silent_timeout())
            .await
    }

    async fn run_deploy(&self, config: Configuration, limit: Duration) -> Result<Configuration> {
        self.with_timeout("deploy", limit, async {
            let lock = self.lock("deploy")?;
            self.deploy_locked(&lock, config, true).await
        })
        .await
    }

    /// Propagate the sandbox without a full engine reinitialize.
    ///
    /// The engine sync directory and, when cloud is enabled, the cloud mirror
    /// are checked for writability before anything is copied.
    pub async fn sync(&self) -> Result<SyncSummary> {
        self.with_timeout("sync", self.settings.operation.timeout(), async {
            let lock = self.lock("sync")?;
            let config = self.current_configuration()?;
            let cloud = config.general();
            let registry = self.registry.clone();

            info!("Stage 1/4: Checking sync targets");
            let sync_dir = {
                let registry = registry.clone();
                let cloud_enabled = cloud.enable_cloud();
                blocking(&lock, move || {
                    let sync_dir = check_sync_target(&registry)?;
                    check_propagation(&registry)?;
                    if cloud_enabled {
                        let mirror = registry
                            .path_of(StorageDomain::Cloud, DirectoryRole::CloudMirror)?;
                        check_cloud_writable(&mirror)?;
                    }
                    Ok(sync_dir)
                })
                .await?
            };

            info!("Stage 2/4: Propagating files");
            let mut cloud_reports = Vec::new();
            if cloud.enable_cloud() {
                let registry = registry.clone();
                let section = cloud.clone();
                cloud_reports
                    .extend(blocking(&lock, move || pull_cloud(&registry, &section)).await?);
            }
            let propagation = {
                let registry = registry.clone();
                let patterns = self.settings.sync.exclude_patterns.clone();
                let config = config.clone();
                blocking(&lock, move || propagate(&registry, &patterns, &config)).await?
            };

            info!("Stage 3/4: Synchronizing input engine");
            self.engine.sync(&self.engine_paths()?).await?;

            info!("Stage 4/4: Publishing");
            if cloud.enable_cloud() {
                let registry = registry.clone();
                let section = cloud.clone();
                cloud_reports
                    .extend(blocking(&lock, move || push_cloud(&registry, &section)).await?);
            }
            self.store.cache().set_flag(NEEDS_RESYNC_KEY, true)?;

            info!("Sync complete");
            Ok(SyncSummary {
                sync_dir,
                propagation,
                cloud: cloud_reports,
            })
        })
        .await
    }

    /// Recreate SharedSupport and UserData from the bundled defaults and
    /// deploy the built-in default configuration. Cloud flags are cleared.
    pub async fn reset(&self) -> Result<Configuration> {
        self.with_timeout("reset", self.settings.operation.timeout(), async {
            let lock = self.lock("reset")?;
            info!("Resetting to bundled defaults");

            let registry = self.registry.clone();
            blocking(&lock, move || restore_bundled(&registry)).await?;
            self.engine.reset(&self.engine_paths()?).await?;

            let mut defaults = load_embedded_default_configuration()?;
            disable_cloud(&mut defaults);
            self.store.clear_cache()?;
            self.store.save_default_to_cache(&defaults)?;
            self.store.cache().set_flag(CLOUD_ENABLED_KEY, false)?;

            // stale cloud state is not pulled back in
            let mut config = self.deploy_locked(&lock, defaults, false).await?;
            if config.general().enable_cloud() {
                // bundled user files may turn cloud back on
                disable_cloud(&mut config);
                self.store
                    .save(&config, &self.registry.durable_config_path()?)?;
                self.store.save_to_cache(&config)?;
            }
            self.store.cache().set_flag(CLOUD_ENABLED_KEY, false)?;

            info!("Reset complete");
            Ok(config)
        })
        .await
    }

    async fn deploy_locked(
        &self,
        lock: &Arc<OperationLock>,
        config: Configuration,
        cloud_pull: bool,
    ) -> Result<Configuration> {
        info!("Deploying with {} engine", self.engine.name());
        self.transition(DeployState::LoadingConfig);

        let result = self.deploy_steps(lock, config, cloud_pull).await;
        match &result {
            Ok(_) => {
                self.transition(DeployState::Done);
                info!("Deployment complete");
            }
            Err(e) => {
                let step = self.state().name().to_string();
                error!("deploy failed at {}: {}", step, e);
                self.transition(DeployState::Failed {
                    step,
                    reason: e.user_message(),
                });
            }
        }
        result
    }

    async fn deploy_steps(
        &self,
        lock: &Arc<OperationLock>,
        config: Configuration,
        cloud_pull: bool,
    ) -> Result<Configuration> {
        info!("Stage 1/5: Loading configuration");
        let base = {
            let user_config = self.registry.user_config_path()?;
            let store = self.store.clone();
            blocking(lock, move || {
                if user_config.is_file() {
                    info!("Using user configuration {}", user_config);
                    store.load(&user_config)
                } else {
                    Ok(config)
                }
            })
            .await?
        };

        if cloud_pull && base.general().enable_cloud() {
            info!("Pulling cloud mirror");
            let registry = self.registry.clone();
            let general = base.general();
            blocking(lock, move || {
                let mirror = registry.path_of(StorageDomain::Cloud, DirectoryRole::CloudMirror)?;
                check_cloud_writable(&mirror)?;
                pull_cloud(&registry, &general)
            })
            .await?;
        }

        self.transition(DeployState::ApplyingPatch);
        info!("Stage 2/5: Applying patch");
        let merged = {
            let patch_path = self.registry.patch_path()?;
            let store = self.store.clone();
            blocking(lock, move || {
                Ok(match store.load_patch_if_present(&patch_path)? {
                    Some(patch) => ConfigStore::merge(&base, &patch),
                    None => base,
                })
            })
            .await?
        };

        self.transition(DeployState::SynchronizingFiles);
        info!("Stage 3/5: Synchronizing files");
        {
            let registry = self.registry.clone();
            let patterns = self.settings.sync.exclude_patterns.clone();
            let merged = merged.clone();
            blocking(lock, move || propagate(&registry, &patterns, &merged)).await?;
        }

        self.transition(DeployState::ReinitializingEngine);
        info!("Stage 4/5: Reinitializing input engine");
        let paths = self.engine_paths()?;
        self.engine.redeploy(&paths).await?;
        let (merged, available) = {
            let paths = paths.clone();
            blocking(lock, move || reconcile_schemas(merged, &paths)).await?
        };

        self.transition(DeployState::PersistingConfig);
        info!("Stage 5/5: Persisting configuration");
        {
            let registry = self.registry.clone();
            let store = self.store.clone();
            let merged = merged.clone();
            blocking(lock, move || persist(&registry, &store, &merged, &available)).await?;
        }

        Ok(merged)
    }

    fn engine_paths(&self) -> Result<EnginePaths> {
        Ok(EnginePaths {
            shared_support: self
                .registry
                .path_of(StorageDomain::Sandbox, DirectoryRole::SharedSupport)?,
            user_data: self
                .registry
                .path_of(StorageDomain::Sandbox, DirectoryRole::UserData)?,
        })
    }

    fn lock(&self, operation: &str) -> Result<Arc<OperationLock>> {
        let dir = self.registry.domain_root(StorageDomain::Sandbox)?;
        OperationLock::acquire(&dir, operation).map(Arc::new)
    }

    fn transition(&self, next: DeployState) {
        let current = self.state();
        if !current.can_transition_to(&next) {
            error!("Refusing illegal deploy transition {} -> {}", current, next);
            return;
        }
        debug!("Deploy state: {} -> {}", current, next);
        self.state.send_replace(next);
    }

    async fn with_timeout<T>(
        &self,
        operation: &str,
        limit: Duration,
        fut: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        match tokio::time::timeout(limit, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                error!("{} failed: {}", operation, e);
                Err(e)
            }
            Err(_) => {
                let err = Error::TimedOut {
                    operation: operation.to_string(),
                    seconds: limit.as_secs(),
                };
                error!("{}", err);
                let current = self.state();
                if current.is_running() {
                    self.transition(DeployState::Failed {
                        step: current.name().to_string(),
                        reason: err.user_message(),
                    });
                }
                Err(err)
            }
        }
    }
}

/// Run blocking filesystem work off the async executor.
///
/// The task keeps its own handle on `lock`, so the lock is only released
/// once the work has finished even if the awaiting future is dropped.
async fn blocking<T, F>(lock: &Arc<OperationLock>, f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let held = Arc::clone(lock);
    tokio::task::spawn_blocking(move || {
        let result = f();
        drop(held);
        result
    })
    .await
    .map_err(|e| Error::Io(std::io::Error::other(e)))?
}

/// Pre-flight, optional dictionary pull, then a destructive copy of the
/// sandbox data roots into the shared container. Both roots are staged
/// before either is swapped in.
fn propagate(
    registry: &DirectoryRegistry,
    exclude_patterns: &[String],
    config: &Configuration,
) -> Result<PropagationReport> {
    let exclude = PathFilter::exclude(exclude_patterns)?;
    let rime = config.rime();
    let dictionary_filter = if rime.override_dict_files() {
        None
    } else {
        Some(PathFilter::include_only(
            &rime.regex_on_override_dict_files(),
        )?)
    };
    check_propagation(registry)?;

    let sandbox_user = registry.path_of(StorageDomain::Sandbox, DirectoryRole::UserData)?;
    let shared_user = registry.path_of(StorageDomain::Shared, DirectoryRole::UserData)?;
    let dictionaries = match dictionary_filter {
        Some(filter) if shared_user.is_dir() => {
            info!("Preserving keyboard dictionaries from {}", shared_user);
            Some(merge_copy(&shared_user, &sandbox_user, &filter)?)
        }
        _ => None,
    };

    let pairs = [
        (
            registry.path_of(StorageDomain::Sandbox, DirectoryRole::SharedSupport)?,
            registry.path_of(StorageDomain::Shared, DirectoryRole::SharedSupport)?,
        ),
        (sandbox_user, shared_user),
    ];
    let mut reports = replace_all(&pairs, &exclude)?.into_iter();
    match (reports.next(), reports.next()) {
        (Some(shared_support), Some(user_data)) => Ok(PropagationReport {
            dictionaries,
            shared_support,
            user_data,
        }),
        _ => Err(Error::Io(std::io::Error::other(
            "replace reported fewer roots than requested",
        ))),
    }
}

/// Engine sync directory from `installation.yaml`, created and probed
fn check_sync_target(registry: &DirectoryRegistry) -> Result<Utf8PathBuf> {
    let user_data = registry.resolve(StorageDomain::Sandbox, DirectoryRole::UserData)?;
    let installation_path = user_data.join(INSTALLATION_FILE_NAME);

    let installation = if installation_path.is_file() {
        let content = std::fs::read_to_string(&installation_path)
            .map_err(|e| Error::filesystem(&installation_path, e))?;
        serde_yaml_ng::from_str::<Option<Installation>>(&content)
            .map_err(|e| Error::decode(installation_path.as_str(), e))?
            .unwrap_or_default()
    } else {
        Installation::default()
    };

    let sync_dir = match installation.sync_dir.filter(|d| !d.trim().is_empty()) {
        Some(dir) if Utf8Path::new(&dir).is_absolute() => Utf8PathBuf::from(dir),
        Some(dir) => user_data.join(dir),
        None => user_data.join(DEFAULT_SYNC_DIR),
    };
    ensure_writable_dir(&sync_dir)?;
    debug!("Sync directory is writable: {}", sync_dir);
    Ok(sync_dir)
}

/// Cloud copies skip `regex-on-copy-file` matches and, in SharedSupport, the
/// durable configuration, which only a deploy may write
fn cloud_filter(general: &GeneralSection, role: DirectoryRole) -> Result<PathFilter> {
    let mut patterns = general.regex_on_copy_file();
    if role == DirectoryRole::SharedSupport {
        patterns.push(format!("^{}$", CONFIG_FILE_NAME.replace('.', "[.]")));
    }
    PathFilter::exclude(&patterns)
}

/// Merge the cloud mirror into the sandbox
fn pull_cloud(registry: &DirectoryRegistry, general: &GeneralSection) -> Result<Vec<SyncReport>> {
    let mut reports = Vec::new();
    for role in DATA_ROLES {
        let filter = cloud_filter(general, role)?;
        let cloud = registry.path_of(StorageDomain::Cloud, role)?;
        if !cloud.is_dir() {
            debug!("Nothing to pull from {}", cloud);
            continue;
        }
        let sandbox = registry.path_of(StorageDomain::Sandbox, role)?;
        reports.push(merge_copy(&cloud, &sandbox, &filter)?);
    }
    Ok(reports)
}

/// Merge the sandbox into the cloud mirror
fn push_cloud(registry: &DirectoryRegistry, general: &GeneralSection) -> Result<Vec<SyncReport>> {
    let mut reports = Vec::new();
    for role in DATA_ROLES {
        let filter = cloud_filter(general, role)?;
        let sandbox = registry.path_of(StorageDomain::Sandbox, role)?;
        let cloud = registry.path_of(StorageDomain::Cloud, role)?;
        check_cloud_writable(&cloud)?;
        reports.push(merge_copy(&sandbox, &cloud, &filter)?);
    }
    Ok(reports)
}

/// Replace the sandbox data roots with their bundled copies.
/// Every source and destination is checked before the first replace.
fn restore_bundled(registry: &DirectoryRegistry) -> Result<()> {
    let mut pairs = Vec::new();
    for role in DATA_ROLES {
        let bundled = registry.bundled(role)?;
        let live = registry.path_of(StorageDomain::Sandbox, role)?;
        check_source_readable(&bundled)?;
        check_destination_writable(&live)?;
        pairs.push((bundled, live));
    }
    replace_all(&pairs, &PathFilter::none())?;
    Ok(())
}

/// Bring the schema selection in line with what the engine now provides
fn reconcile_schemas(
    config: Configuration,
    paths: &EnginePaths,
) -> Result<(Configuration, Vec<Schema>)> {
    let catalog = SchemaCatalog::scan(&[paths.shared_support.as_path(), paths.user_data.as_path()])?;
    if catalog.is_empty() {
        debug!("No schemas found, keeping selection");
        return Ok((config, Vec::new()));
    }

    let mut selection = SchemaSelection::from_configuration(&config, &catalog)?;
    selection.reconcile(&catalog);
    let config = if selection.ids() != config.rime().selected_schemas() {
        info!("Selected schemas: {}", selection.ids().join(", "));
        config.apply(&selection.patch())
    } else {
        config
    };
    Ok((config, catalog.schemas()))
}

fn persist(
    registry: &DirectoryRegistry,
    store: &ConfigStore,
    config: &Configuration,
    available: &[Schema],
) -> Result<()> {
    store.save(config, &registry.durable_config_path()?)?;
    let shared_copy = registry
        .path_of(StorageDomain::Shared, DirectoryRole::SharedSupport)?
        .join(CONFIG_FILE_NAME);
    store.save(config, &shared_copy)?;

    store.save_to_cache(config)?;
    let cache = store.cache();
    cache.set_flag(NEEDS_RESYNC_KEY, true)?;
    cache.set_flag(CLOUD_ENABLED_KEY, config.general().enable_cloud())?;
    cache.set(SELECTED_SCHEMAS_KEY, &config.rime().selected_schemas())?;
    if !available.is_empty() {
        cache.set(AVAILABLE_SCHEMAS_KEY, &available)?;
    }
    Ok(())
}

fn disable_cloud(config: &mut Configuration) {
    if config.general().enable_cloud() {
        warn!("Turning cloud sync off");
    }
    *config = config.apply(&Patch::new(Configuration {
        general: Some(GeneralSection {
            enable_cloud: Some(false),
            ..Default::default()
        }),
        ..Default::default()
    }));
}
