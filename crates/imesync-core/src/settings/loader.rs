//! Hierarchical settings loader with precedence
//!
//! Loads runtime settings from multiple sources with the following precedence (low to high):
//! 1. Embedded defaults (built into binary)
//! 2. Settings file (~/.imesync/runtime.yaml)
//! 3. Environment variables (IMESYNC_* prefix)
//! 4. CLI flags (handled by caller)

use crate::config::Configuration;
use crate::error::{Error, Result};
use crate::settings::{PathSettings, RuntimeSettings, StorageRoots};
use crate::utils::{get_home_dir, utf8_path};
use camino::{Utf8Path, Utf8PathBuf};
use rust_embed::RustEmbed;
use serde::de::DeserializeOwned;
use std::env;
use std::fs;
use tracing::debug;

/// Embedded configuration files
#[derive(RustEmbed)]
#[folder = "$CARGO_MANIFEST_DIR/../../embedded/config/"]
#[prefix = ""]
struct EmbeddedConfigs;

const SETTINGS_FILE_NAME: &str = "runtime.yaml";

/// Settings hierarchy loader
pub struct HierarchicalSettingsLoader {
    /// Directory holding runtime.yaml
    config_dir: Utf8PathBuf,
}

impl HierarchicalSettingsLoader {
    /// Loader rooted at ~/.imesync
    pub fn new() -> Result<Self> {
        Ok(Self {
            config_dir: get_home_dir()?.join(".imesync"),
        })
    }

    /// Create a loader with a custom settings directory
    pub fn with_dir(config_dir: Utf8PathBuf) -> Self {
        Self { config_dir }
    }

    /// Load runtime settings with hierarchical precedence
    pub fn load(&self) -> Result<RuntimeSettings> {
        let mut settings = load_embedded::<RuntimeSettings>("runtime-defaults.yaml")?;

        let settings_path = self.config_dir.join(SETTINGS_FILE_NAME);
        if settings_path.exists() {
            debug!("Loading settings from {}", settings_path);
            let file_settings = load_yaml_file::<RuntimeSettings>(&settings_path)?;
            settings = Self::merge_settings(settings, file_settings);
        }

        Self::apply_env_overrides(settings)
    }

    /// Merge two settings values (base is overridden by overlay)
    fn merge_settings(base: RuntimeSettings, overlay: RuntimeSettings) -> RuntimeSettings {
        RuntimeSettings {
            paths: PathSettings {
                sandbox: overlay.paths.sandbox.or(base.paths.sandbox),
                shared: overlay.paths.shared.or(base.paths.shared),
                cloud: overlay.paths.cloud.or(base.paths.cloud),
                bundle: overlay.paths.bundle.or(base.paths.bundle),
            },
            operation: overlay.operation,
            sync: overlay.sync,
            backup: overlay.backup,
            engine: overlay.engine,
        }
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(mut settings: RuntimeSettings) -> Result<RuntimeSettings> {
        if let Ok(val) = env::var("IMESYNC_SANDBOX_DIR") {
            settings.paths.sandbox = Some(Utf8PathBuf::from(val));
        }

        if let Ok(val) = env::var("IMESYNC_SHARED_DIR") {
            settings.paths.shared = Some(Utf8PathBuf::from(val));
        }

        if let Ok(val) = env::var("IMESYNC_CLOUD_DIR") {
            settings.paths.cloud = if val.is_empty() {
                None
            } else {
                Some(Utf8PathBuf::from(val))
            };
        }

        if let Ok(val) = env::var("IMESYNC_BUNDLE_DIR") {
            settings.paths.bundle = Some(Utf8PathBuf::from(val));
        }

        if let Ok(val) = env::var("IMESYNC_OPERATION_TIMEOUT_SECS") {
            settings.operation.timeout_secs = val.parse().map_err(|_| {
                Error::invalid_settings("IMESYNC_OPERATION_TIMEOUT_SECS must be a valid number")
            })?;
        }

        if let Ok(val) = env::var("IMESYNC_SILENT_TIMEOUT_SECS") {
            settings.operation.silent_timeout_secs = val.parse().map_err(|_| {
                Error::invalid_settings("IMESYNC_SILENT_TIMEOUT_SECS must be a valid number")
            })?;
        }

        if let Ok(val) = env::var("IMESYNC_MAX_BACKUPS") {
            settings.backup.max_backups = val.parse().map_err(|_| {
                Error::invalid_settings("IMESYNC_MAX_BACKUPS must be a valid number")
            })?;
        }

        Ok(settings)
    }

    /// Concrete storage roots, unset ones placed under the platform data directory
    pub fn storage_roots(&self, settings: &RuntimeSettings) -> Result<StorageRoots> {
        Ok(settings.paths.resolve(&Self::data_dir()?))
    }

    fn data_dir() -> Result<Utf8PathBuf> {
        match directories::ProjectDirs::from("com", "imesync", "imesync") {
            Some(dirs) => utf8_path(dirs.data_dir()),
            None => Ok(get_home_dir()?.join(".imesync").join("data")),
        }
    }

    /// Get the settings directory path
    pub fn config_dir(&self) -> &Utf8Path {
        &self.config_dir
    }
}

/// Bundled default configuration document
pub fn load_embedded_default_configuration() -> Result<Configuration> {
    load_embedded::<Configuration>("default-configuration.yaml")
}

/// Load an embedded configuration file
fn load_embedded<T: DeserializeOwned>(filename: &str) -> Result<T> {
    let embedded_file = EmbeddedConfigs::get(filename).ok_or_else(|| {
        Error::invalid_settings(format!("Embedded config not found: {}", filename))
    })?;

    let content = std::str::from_utf8(&embedded_file.data).map_err(|_| {
        Error::invalid_settings(format!("Invalid UTF-8 in embedded config: {}", filename))
    })?;

    serde_yaml_ng::from_str(content).map_err(|e| {
        Error::invalid_settings(format!(
            "Failed to parse embedded config {}: {}",
            filename, e
        ))
    })
}

/// Load a YAML file and parse it
fn load_yaml_file<T: DeserializeOwned>(path: &Utf8Path) -> Result<T> {
    let content = fs::read_to_string(path).map_err(|e| Error::filesystem(path, e))?;
    serde_yaml_ng::from_str(&content)
        .map_err(|e| Error::invalid_settings(format!("Failed to parse {}: {}", path, e)))
}
