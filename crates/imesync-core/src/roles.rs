//! Directory role registry
//!
//! Maps a logical directory role in one of the three storage domains to a
//! concrete path. `path_of` is pure; `resolve` additionally creates the
//! directory when it is missing.

use crate::config::{CACHE_FILE_NAME, CONFIG_FILE_NAME, PATCH_FILE_NAME};
use crate::error::{Error, Result};
use crate::settings::StorageRoots;
use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Physically distinct storage areas
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StorageDomain {
    /// Private application sandbox
    Sandbox,
    /// Cross-process shared container
    Shared,
    /// Cloud-backed mirror
    Cloud,
}

impl fmt::Display for StorageDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageDomain::Sandbox => write!(f, "sandbox"),
            StorageDomain::Shared => write!(f, "shared"),
            StorageDomain::Cloud => write!(f, "cloud"),
        }
    }
}

/// Logical directory roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DirectoryRole {
    /// Input schemas and engine support files
    SharedSupport,
    /// User dictionaries and customizations
    UserData,
    /// Backup archives
    Backup,
    /// Scratch space for staged copies
    TempStaging,
    /// Root of the cloud mirror
    CloudMirror,
}

impl DirectoryRole {
    /// Directory name below the domain base, `None` for the base itself
    fn dir_name(self) -> Option<&'static str> {
        match self {
            DirectoryRole::SharedSupport => Some("SharedSupport"),
            DirectoryRole::UserData => Some("Rime"),
            DirectoryRole::Backup => Some("backups"),
            DirectoryRole::TempStaging => Some(".staging"),
            DirectoryRole::CloudMirror => None,
        }
    }
}

impl fmt::Display for DirectoryRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DirectoryRole::SharedSupport => write!(f, "shared-support"),
            DirectoryRole::UserData => write!(f, "user-data"),
            DirectoryRole::Backup => write!(f, "backup"),
            DirectoryRole::TempStaging => write!(f, "temp-staging"),
            DirectoryRole::CloudMirror => write!(f, "cloud-mirror"),
        }
    }
}

/// Directory name of the cloud mirror below the cloud root
const CLOUD_MIRROR_DIR: &str = "RIME";

#[derive(Debug, Clone)]
pub struct DirectoryRegistry {
    roots: StorageRoots,
}

impl DirectoryRegistry {
    pub fn new(roots: StorageRoots) -> Self {
        Self { roots }
    }

    pub fn roots(&self) -> &StorageRoots {
        &self.roots
    }

    /// Bundled defaults shipped with the application
    pub fn bundle_dir(&self) -> &Utf8Path {
        &self.roots.bundle
    }

    /// Whether a cloud root is configured
    pub fn has_cloud(&self) -> bool {
        self.roots.cloud.is_some()
    }

    /// Base directory of a storage domain
    pub fn domain_root(&self, domain: StorageDomain) -> Result<Utf8PathBuf> {
        match domain {
            StorageDomain::Sandbox => Ok(self.roots.sandbox.clone()),
            StorageDomain::Shared => Ok(self.roots.shared.clone()),
            StorageDomain::Cloud => self
                .roots
                .cloud
                .as_ref()
                .map(|root| root.join(CLOUD_MIRROR_DIR))
                .ok_or(Error::CloudNotConfigured),
        }
    }

    /// Concrete path of `role` in `domain`, without touching the filesystem
    pub fn path_of(&self, domain: StorageDomain, role: DirectoryRole) -> Result<Utf8PathBuf> {
        let valid = match role {
            DirectoryRole::CloudMirror => domain == StorageDomain::Cloud,
            DirectoryRole::Backup | DirectoryRole::TempStaging => {
                domain == StorageDomain::Sandbox
            }
            DirectoryRole::SharedSupport | DirectoryRole::UserData => true,
        };
        if !valid {
            return Err(Error::RoleNotInDomain {
                role: role.to_string(),
                domain: domain.to_string(),
            });
        }

        let base = self.domain_root(domain)?;
        Ok(match role.dir_name() {
            Some(name) => base.join(name),
            None => base,
        })
    }

    /// Like [`path_of`](Self::path_of), creating the directory if absent
    pub fn resolve(&self, domain: StorageDomain, role: DirectoryRole) -> Result<Utf8PathBuf> {
        let path = self.path_of(domain, role)?;
        if !path.is_dir() {
            std::fs::create_dir_all(&path).map_err(|e| Error::filesystem(&path, e))?;
        }
        Ok(path)
    }

    /// Bundled copy of a role, used when resetting to defaults
    pub fn bundled(&self, role: DirectoryRole) -> Result<Utf8PathBuf> {
        match role {
            DirectoryRole::SharedSupport | DirectoryRole::UserData => Ok(self
                .roots
                .bundle
                .join(role.dir_name().unwrap_or_default())),
            _ => Err(Error::RoleNotInDomain {
                role: role.to_string(),
                domain: "bundle".to_string(),
            }),
        }
    }
}

/// Well-known document locations
impl DirectoryRegistry {
    /// Durable configuration document in the sandbox SharedSupport
    pub fn durable_config_path(&self) -> Result<Utf8PathBuf> {
        Ok(self
            .path_of(StorageDomain::Sandbox, DirectoryRole::SharedSupport)?
            .join(CONFIG_FILE_NAME))
    }

    /// User-edited configuration document in the sandbox UserData, if any
    pub fn user_config_path(&self) -> Result<Utf8PathBuf> {
        Ok(self
            .path_of(StorageDomain::Sandbox, DirectoryRole::UserData)?
            .join(CONFIG_FILE_NAME))
    }

    /// Patch document in the sandbox UserData
    pub fn patch_path(&self) -> Result<Utf8PathBuf> {
        Ok(self
            .path_of(StorageDomain::Sandbox, DirectoryRole::UserData)?
            .join(PATCH_FILE_NAME))
    }

    /// Fast-access cache file in the shared container
    pub fn cache_path(&self) -> Result<Utf8PathBuf> {
        Ok(self.domain_root(StorageDomain::Shared)?.join(CACHE_FILE_NAME))
    }
}
