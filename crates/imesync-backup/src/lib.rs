//! # imesync-backup
//!
//! Backup archives of the sandbox data roots and the matching restore:
//! - `tar.gz` archives with a checksummed manifest
//! - full archive verification before any live directory is replaced
//! - listing, deletion and pruning of old archives

pub mod archive;
pub mod manager;
pub mod manifest;

pub use archive::{unpack_archive, write_archive};
pub use manager::{BackupEntry, BackupManager, BackupResult};
pub use manifest::{BackupManifest, MANIFEST_FILENAME, MANIFEST_VERSION};
