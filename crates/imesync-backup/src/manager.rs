//! Backup and restore of the sandbox data roots.
//!
//! A backup stages SharedSupport, UserData and a configuration snapshot in
//! the sandbox staging role and packs them into `<Backup>/yyyyMMdd-HHmmss.tar.gz`.
//! A restore unpacks and verifies the whole archive before it replaces the
//! live roots, so a malformed archive never touches them.

use crate::archive::{
    unpack_archive, write_archive, CONFIGURATION_ENTRY, SHARED_SUPPORT_ENTRY, USER_DATA_ENTRY,
};
use crate::manifest::BackupManifest;
use camino::{Utf8Path, Utf8PathBuf};
use chrono::{Local, NaiveDateTime};
use imesync_core::roles::{DirectoryRegistry, DirectoryRole, StorageDomain};
use imesync_core::settings::BackupSettings;
use imesync_core::{ConfigStore, Configuration, Error, OperationLock, PathFilter, Result};
use imesync_sync::{check_destination_writable, replace_all, sync_paths};
use std::fs;
use tracing::{info, warn};

/// Archive file extension
pub const ARCHIVE_EXTENSION: &str = ".tar.gz";

const TIMESTAMP_FORMAT: &str = "%Y%m%d-%H%M%S";

/// Result of a backup operation.
#[derive(Debug, Clone)]
pub struct BackupResult {
    /// Path to the created archive
    pub archive_path: Utf8PathBuf,

    /// Size of the archive in bytes
    pub size_bytes: u64,

    /// Manifest written into the archive
    pub manifest: BackupManifest,

    /// Archives removed by pruning
    pub pruned: Vec<Utf8PathBuf>,
}

/// An archive found in the Backup role
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupEntry {
    pub path: Utf8PathBuf,
    pub created: NaiveDateTime,
    /// Disambiguates archives created within the same second
    pub sequence: u32,
    pub size_bytes: u64,
}

impl BackupEntry {
    pub fn file_name(&self) -> &str {
        self.path.file_name().unwrap_or_default()
    }
}

/// Removes the staging directory when dropped
struct StagingDir(Utf8PathBuf);

impl Drop for StagingDir {
    fn drop(&mut self) {
        if self.0.exists() {
            if let Err(e) = fs::remove_dir_all(&self.0) {
                warn!("Failed to clean up staging directory {}: {}", self.0, e);
            }
        }
    }
}

pub struct BackupManager {
    registry: DirectoryRegistry,
    store: ConfigStore,
    settings: BackupSettings,
}

impl BackupManager {
    pub fn new(registry: DirectoryRegistry, store: ConfigStore, settings: BackupSettings) -> Self {
        Self {
            registry,
            store,
            settings,
        }
    }

    /// Archive the sandbox data roots together with `config`.
    ///
    /// On failure no archive file is left in the Backup role.
    pub fn backup(&self, config: &Configuration) -> Result<BackupResult> {
        let lock_dir = self.registry.domain_root(StorageDomain::Sandbox)?;
        let _lock = OperationLock::acquire(&lock_dir, "backup")?;
        let filter = PathFilter::exclude(&self.settings.exclude_patterns)?;

        info!("Stage 1/3: Staging data roots");
        let staging = self.staging_dir("backup")?;
        for (role, entry) in [
            (DirectoryRole::SharedSupport, SHARED_SUPPORT_ENTRY),
            (DirectoryRole::UserData, USER_DATA_ENTRY),
        ] {
            let source = self.registry.resolve(StorageDomain::Sandbox, role)?;
            sync_paths(&source, &staging.0.join(entry), &filter, false).map_err(|e| {
                Error::backup(format!("Failed to stage {}: {}", role, e.user_message()))
            })?;
        }
        self.store
            .save(config, &staging.0.join(CONFIGURATION_ENTRY))
            .map_err(|e| Error::backup(format!("Failed to stage configuration: {}", e)))?;

        info!("Stage 2/3: Writing archive");
        let backup_dir = self
            .registry
            .resolve(StorageDomain::Sandbox, DirectoryRole::Backup)?;
        let archive_path = next_archive_path(&backup_dir);
        let manifest = write_archive(&staging.0, &archive_path)?;
        let size_bytes = fs::metadata(&archive_path)
            .map(|m| m.len())
            .unwrap_or_default();

        info!("Stage 3/3: Pruning old backups");
        let pruned = self.prune().unwrap_or_else(|e| {
            warn!("Backup created but pruning old backups failed: {}", e);
            Vec::new()
        });

        info!(
            "Backup created: {} ({} files, {} bytes)",
            archive_path, manifest.file_count, size_bytes
        );
        Ok(BackupResult {
            archive_path,
            size_bytes,
            manifest,
            pruned,
        })
    }

    /// Replace the sandbox data roots and the active configuration from `archive`.
    ///
    /// Returns the restored configuration, which is also saved as the durable
    /// document and to the cache.
    pub fn restore(&self, archive: &Utf8Path) -> Result<Configuration> {
        let lock_dir = self.registry.domain_root(StorageDomain::Sandbox)?;
        let _lock = OperationLock::acquire(&lock_dir, "restore")?;
        info!("Restoring from {}", archive);

        info!("Stage 1/4: Validating archive");
        let staging = self.staging_dir("restore")?;
        let manifest = unpack_archive(archive, &staging.0)?;
        let config = self
            .store
            .load(&staging.0.join(CONFIGURATION_ENTRY))
            .map_err(|e| Error::restore(format!("Configuration snapshot is invalid: {}", e)))?;

        info!("Stage 2/4: Checking destinations");
        let mut pairs = Vec::new();
        for (role, entry) in [
            (DirectoryRole::SharedSupport, SHARED_SUPPORT_ENTRY),
            (DirectoryRole::UserData, USER_DATA_ENTRY),
        ] {
            let live = self.registry.path_of(StorageDomain::Sandbox, role)?;
            check_destination_writable(&live)?;
            pairs.push((staging.0.join(entry), live));
        }

        info!("Stage 3/4: Replacing data roots");
        replace_all(&pairs, &PathFilter::none())?;

        info!("Stage 4/4: Activating configuration");
        self.store
            .save(&config, &self.registry.durable_config_path()?)?;
        self.store.save_to_cache(&config)?;

        info!(
            "Restore complete: {} files from backup taken {}",
            manifest.file_count,
            manifest.created_at.format("%Y-%m-%d %H:%M:%S")
        );
        Ok(config)
    }

    /// Archives in the Backup role, newest first
    pub fn list_backups(&self) -> Result<Vec<BackupEntry>> {
        let dir = self
            .registry
            .path_of(StorageDomain::Sandbox, DirectoryRole::Backup)?;
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut entries = Vec::new();
        for entry in dir.read_dir_utf8().map_err(|e| Error::filesystem(&dir, e))? {
            let entry = entry.map_err(|e| Error::filesystem(&dir, e))?;
            let Some((created, sequence)) = parse_archive_name(entry.file_name()) else {
                continue;
            };
            let size_bytes = entry.metadata().map(|m| m.len()).unwrap_or_default();
            entries.push(BackupEntry {
                path: entry.path().to_path_buf(),
                created,
                sequence,
                size_bytes,
            });
        }

        entries.sort_by(|a, b| (b.created, b.sequence).cmp(&(a.created, a.sequence)));
        Ok(entries)
    }

    /// Delete one archive. Only archives inside the Backup role are accepted.
    pub fn delete_backup(&self, path: &Utf8Path) -> Result<()> {
        let dir = self
            .registry
            .path_of(StorageDomain::Sandbox, DirectoryRole::Backup)?;
        let target = if path.is_absolute() {
            path.to_path_buf()
        } else {
            dir.join(path)
        };

        let known = self.list_backups()?.into_iter().any(|e| e.path == target);
        if !known {
            return Err(Error::not_found(target));
        }
        fs::remove_file(&target).map_err(|e| Error::filesystem(&target, e))?;
        info!("Deleted backup {}", target);
        Ok(())
    }

    /// Remove the oldest archives beyond `max-backups`. Zero keeps everything.
    pub fn prune(&self) -> Result<Vec<Utf8PathBuf>> {
        if self.settings.max_backups == 0 {
            return Ok(Vec::new());
        }
        let mut removed = Vec::new();
        for entry in self
            .list_backups()?
            .into_iter()
            .skip(self.settings.max_backups)
        {
            fs::remove_file(&entry.path).map_err(|e| Error::filesystem(&entry.path, e))?;
            info!("Pruned old backup {}", entry.path);
            removed.push(entry.path);
        }
        Ok(removed)
    }

    fn staging_dir(&self, purpose: &str) -> Result<StagingDir> {
        let base = self
            .registry
            .resolve(StorageDomain::Sandbox, DirectoryRole::TempStaging)?;
        let path = base.join(format!("{}-{}", purpose, uuid::Uuid::new_v4().simple()));
        fs::create_dir_all(&path).map_err(|e| Error::filesystem(&path, e))?;
        Ok(StagingDir(path))
    }
}

/// Timestamped archive path that does not exist yet
fn next_archive_path(dir: &Utf8Path) -> Utf8PathBuf {
    let stamp = Local::now().format(TIMESTAMP_FORMAT).to_string();
    let mut path = dir.join(format!("{}{}", stamp, ARCHIVE_EXTENSION));
    let mut sequence = 1;
    while path.exists() {
        path = dir.join(format!("{}-{}{}", stamp, sequence, ARCHIVE_EXTENSION));
        sequence += 1;
    }
    path
}

/// `yyyyMMdd-HHmmss[-N].tar.gz` -> (timestamp, N)
fn parse_archive_name(name: &str) -> Option<(NaiveDateTime, u32)> {
    let stem = name.strip_suffix(ARCHIVE_EXTENSION)?;
    let stamp = stem.get(..15)?;
    let created = NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT).ok()?;
    let sequence = match &stem[15..] {
        "" => 0,
        rest => rest.strip_prefix('-')?.parse().ok()?,
    };
    Some((created, sequence))
}
