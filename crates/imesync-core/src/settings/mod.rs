//! Runtime settings for operational parameters
//!
//! These control where the storage domains live, how long orchestrated
//! operations may run, and which external commands stand in for the input
//! engine. They are unrelated to the user-facing configuration document.

mod loader;

pub use loader::{load_embedded_default_configuration, HierarchicalSettingsLoader};

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Complete runtime settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RuntimeSettings {
    /// Storage domain roots
    #[serde(default)]
    pub paths: PathSettings,

    /// Operation time budgets
    #[serde(default)]
    pub operation: OperationSettings,

    /// Sandbox to shared container propagation
    #[serde(default)]
    pub sync: SyncSettings,

    /// Backup retention and filtering
    #[serde(default)]
    pub backup: BackupSettings,

    /// External engine commands
    #[serde(default)]
    pub engine: EngineSettings,
}

/// Storage domain roots. Unset entries fall back to the platform data directory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PathSettings {
    /// Private application sandbox
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sandbox: Option<Utf8PathBuf>,

    /// Cross-process shared container
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shared: Option<Utf8PathBuf>,

    /// Cloud-backed mirror root
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud: Option<Utf8PathBuf>,

    /// Bundled default schemas and configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bundle: Option<Utf8PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OperationSettings {
    /// Overall budget for deploy, sync, reset, backup and restore
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Budget for `deploy --silent`
    #[serde(default = "default_silent_timeout")]
    pub silent_timeout_secs: u64,
}

impl Default for OperationSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
            silent_timeout_secs: default_silent_timeout(),
        }
    }
}

impl OperationSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn silent_timeout(&self) -> Duration {
        Duration::from_secs(self.silent_timeout_secs)
    }
}

fn default_timeout() -> u64 {
    600
}

fn default_silent_timeout() -> u64 {
    120
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SyncSettings {
    /// Regexes excluded when pushing the sandbox to the shared container
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BackupSettings {
    /// Archives kept after a successful backup
    #[serde(default = "default_max_backups")]
    pub max_backups: usize,

    /// Regexes excluded from backups
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
}

impl Default for BackupSettings {
    fn default() -> Self {
        Self {
            max_backups: default_max_backups(),
            exclude_patterns: Vec::new(),
        }
    }
}

fn default_max_backups() -> usize {
    10
}

/// Argv lists for the command-backed engine. An empty list is a no-op.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct EngineSettings {
    #[serde(default)]
    pub deploy_command: Vec<String>,

    #[serde(default)]
    pub sync_command: Vec<String>,

    #[serde(default)]
    pub reset_command: Vec<String>,
}

/// Concrete storage roots after defaults are applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageRoots {
    pub sandbox: Utf8PathBuf,
    pub shared: Utf8PathBuf,
    pub cloud: Option<Utf8PathBuf>,
    pub bundle: Utf8PathBuf,
}

impl PathSettings {
    /// Fill unset roots from `data_dir`
    pub fn resolve(&self, data_dir: &camino::Utf8Path) -> StorageRoots {
        StorageRoots {
            sandbox: self
                .sandbox
                .clone()
                .unwrap_or_else(|| data_dir.join("sandbox")),
            shared: self
                .shared
                .clone()
                .unwrap_or_else(|| data_dir.join("shared")),
            cloud: self.cloud.clone(),
            bundle: self
                .bundle
                .clone()
                .unwrap_or_else(|| data_dir.join("bundle")),
        }
    }
}
