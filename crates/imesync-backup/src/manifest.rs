//! Backup manifest format and metadata.
//!
//! The manifest is stored as the first entry in every backup archive and
//! records a SHA-256 checksum for each file so a restore can verify the
//! archive before touching live data.

use camino::Utf8Path;
use chrono::{DateTime, Utc};
use imesync_core::{Error, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs::File;
use std::io;

/// Version of the backup manifest format.
pub const MANIFEST_VERSION: &str = "1.0.0";

/// Name of the manifest file in the backup archive.
pub const MANIFEST_FILENAME: &str = ".backup-manifest.json";

const CHECKSUM_ALGORITHM: &str = "sha256";
const COMPRESSION: &str = "gzip";

/// Manifest stored in the archive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupManifest {
    /// Manifest format version
    pub version: String,

    /// When the backup was created
    pub created_at: DateTime<Utc>,

    /// What created this backup (e.g., "imesync v0.1.0")
    pub created_by: String,

    /// Compression algorithm used
    pub compression: String,

    /// Hash algorithm of `checksums`
    pub algorithm: String,

    /// Number of files in the archive, manifest excluded
    pub file_count: usize,

    /// Archive path -> hex-encoded checksum
    pub checksums: BTreeMap<String, String>,
}

impl BackupManifest {
    /// Creates a manifest for the given per-file checksums.
    pub fn new(checksums: BTreeMap<String, String>) -> Self {
        Self {
            version: MANIFEST_VERSION.to_string(),
            created_at: Utc::now(),
            created_by: format!("imesync v{}", env!("CARGO_PKG_VERSION")),
            compression: COMPRESSION.to_string(),
            algorithm: CHECKSUM_ALGORITHM.to_string(),
            file_count: checksums.len(),
            checksums,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| Error::backup(format!("Failed to serialize manifest: {}", e)))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| Error::restore(format!("Failed to deserialize manifest: {}", e)))
    }

    /// Validates that the manifest is compatible with the current version.
    pub fn validate(&self) -> Result<()> {
        if self.version != MANIFEST_VERSION {
            return Err(Error::restore(format!(
                "Incompatible manifest version: {} (expected {})",
                self.version, MANIFEST_VERSION
            )));
        }

        if self.algorithm != CHECKSUM_ALGORITHM {
            return Err(Error::restore(format!(
                "Unsupported checksum algorithm: {}",
                self.algorithm
            )));
        }

        if self.compression != COMPRESSION {
            return Err(Error::restore(format!(
                "Unsupported compression: {}",
                self.compression
            )));
        }

        if self.file_count != self.checksums.len() {
            return Err(Error::restore(format!(
                "Manifest lists {} checksums but claims {} files",
                self.checksums.len(),
                self.file_count
            )));
        }

        Ok(())
    }
}

/// Calculates the SHA-256 checksum of a file.
pub fn calculate_checksum(path: &Utf8Path) -> Result<String> {
    let mut file = File::open(path).map_err(|e| Error::filesystem(path, e))?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher).map_err(|e| Error::filesystem(path, e))?;
    Ok(format!("{:x}", hasher.finalize()))
}
