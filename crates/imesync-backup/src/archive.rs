//! Archive creation and extraction for backups.
//!
//! An archive is a gzip-compressed tar with a fixed layout:
//!
//! ```text
//! .backup-manifest.json
//! RIME/SharedSupport/...
//! RIME/Rime/...
//! imesync.yaml
//! ```
//!
//! Archives are written to a temporary file beside the target and renamed
//! into place, so a failed backup never leaves a partial archive behind.

use crate::manifest::{calculate_checksum, BackupManifest, MANIFEST_FILENAME};
use camino::{Utf8Path, Utf8PathBuf};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use imesync_core::filter::path_key;
use imesync_core::utils::utf8_path;
use imesync_core::{Error, Result};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Read;
use tar::{Archive, Builder as TarBuilder, Header};
use tracing::debug;
use walkdir::WalkDir;

/// Top-level directory holding the data roots
pub const DATA_ROOT: &str = "RIME";

/// Archive path of the SharedSupport copy
pub const SHARED_SUPPORT_ENTRY: &str = "RIME/SharedSupport";

/// Archive path of the UserData copy
pub const USER_DATA_ENTRY: &str = "RIME/Rime";

/// Archive path of the configuration snapshot
pub const CONFIGURATION_ENTRY: &str = "imesync.yaml";

/// Pack a staged backup tree into a gzip tar at `output`.
///
/// `staging` must already have the archive layout.
pub fn write_archive(staging: &Utf8Path, output: &Utf8Path) -> Result<BackupManifest> {
    let files = staged_files(staging)?;
    let mut checksums = BTreeMap::new();
    for relative in &files {
        checksums.insert(relative.clone(), calculate_checksum(&staging.join(relative))?);
    }
    let manifest = BackupManifest::new(checksums);
    let manifest_json = manifest.to_json()?;

    let parent = output.parent().unwrap_or(output);
    fs::create_dir_all(parent).map_err(|e| Error::filesystem(parent, e))?;
    let temp = tempfile::NamedTempFile::new_in(parent)
        .map_err(|e| Error::backup(format!("Failed to create archive in {}: {}", parent, e)))?;

    let archive_err = |e: std::io::Error| Error::backup(format!("Failed to write archive: {}", e));
    {
        let encoder = GzEncoder::new(temp.as_file(), Compression::default());
        let mut tar = TarBuilder::new(encoder);

        // Manifest first
        let mut header = Header::new_gnu();
        header.set_size(manifest_json.len() as u64);
        header.set_mode(0o644);
        header.set_mtime(manifest.created_at.timestamp().max(0) as u64);
        header.set_cksum();
        tar.append_data(&mut header, MANIFEST_FILENAME, manifest_json.as_bytes())
            .map_err(archive_err)?;

        for dir in [DATA_ROOT, SHARED_SUPPORT_ENTRY, USER_DATA_ENTRY] {
            tar.append_dir(dir, staging.join(dir)).map_err(archive_err)?;
        }
        for relative in &files {
            tar.append_path_with_name(staging.join(relative), relative)
                .map_err(archive_err)?;
        }

        let encoder = tar.into_inner().map_err(archive_err)?;
        encoder.finish().map_err(archive_err)?;
    }
    temp.as_file().sync_all().map_err(archive_err)?;

    temp.persist(output)
        .map_err(|e| Error::backup(format!("Failed to save archive {}: {}", output, e.error)))?;

    debug!("Wrote archive {} with {} files", output, manifest.file_count);
    Ok(manifest)
}

/// Unpack `archive` into `dest` and verify it completely.
///
/// The layout and every checksum are checked; any problem is a `Restore`
/// error. Nothing outside `dest` is written.
pub fn unpack_archive(archive: &Utf8Path, dest: &Utf8Path) -> Result<BackupManifest> {
    if !archive.is_file() {
        return Err(Error::restore(format!("Backup file not found: {}", archive)));
    }
    let file = File::open(archive).map_err(|e| Error::filesystem(archive, e))?;
    fs::create_dir_all(dest).map_err(|e| Error::filesystem(dest, e))?;

    let malformed = |e: std::io::Error| {
        Error::restore(format!("Archive {} is malformed: {}", archive, e))
    };
    let mut tar = Archive::new(GzDecoder::new(file));
    for entry in tar.entries().map_err(malformed)? {
        let mut entry = entry.map_err(malformed)?;
        let name = entry
            .path()
            .map_err(malformed)?
            .to_string_lossy()
            .into_owned();
        if !entry.unpack_in(dest).map_err(malformed)? {
            return Err(Error::restore(format!(
                "Archive entry escapes the archive root: {}",
                name
            )));
        }
    }

    let manifest_path = dest.join(MANIFEST_FILENAME);
    let mut json = String::new();
    File::open(&manifest_path)
        .and_then(|mut f| f.read_to_string(&mut json))
        .map_err(|_| Error::restore("Backup manifest not found in archive"))?;
    let manifest = BackupManifest::from_json(&json)?;
    manifest.validate()?;

    verify_layout(dest)?;
    verify_checksums(dest, &manifest)?;
    debug!("Verified {} files from {}", manifest.file_count, archive);
    Ok(manifest)
}

fn verify_layout(root: &Utf8Path) -> Result<()> {
    for dir in [SHARED_SUPPORT_ENTRY, USER_DATA_ENTRY] {
        if !root.join(dir).is_dir() {
            return Err(Error::restore(format!("Archive is missing {}/", dir)));
        }
    }
    if !root.join(CONFIGURATION_ENTRY).is_file() {
        return Err(Error::restore(format!(
            "Archive is missing {}",
            CONFIGURATION_ENTRY
        )));
    }
    Ok(())
}

fn verify_checksums(root: &Utf8Path, manifest: &BackupManifest) -> Result<()> {
    let files = staged_files(root)?;
    if files.len() != manifest.checksums.len() {
        return Err(Error::restore(format!(
            "Archive holds {} files but the manifest lists {}",
            files.len(),
            manifest.checksums.len()
        )));
    }

    for relative in &files {
        let expected = manifest.checksums.get(relative).ok_or_else(|| {
            Error::restore(format!("{} is not listed in the manifest", relative))
        })?;
        if &calculate_checksum(&root.join(relative))? != expected {
            return Err(Error::restore(format!("Checksum mismatch for {}", relative)));
        }
    }
    Ok(())
}

/// Relative keys of every file below `root`, manifest excluded
fn staged_files(root: &Utf8Path) -> Result<Vec<String>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
        let entry = entry.map_err(|e| Error::filesystem(root, e.into()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let absolute: Utf8PathBuf = utf8_path(entry.path())?;
        let relative = absolute
            .strip_prefix(root)
            .map(path_key)
            .unwrap_or_else(|_| absolute.to_string());
        if relative != MANIFEST_FILENAME {
            files.push(relative);
        }
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn staged_tree(root: &Utf8Path) -> Utf8PathBuf {
        let staging = root.join("staging");
        fs::create_dir_all(staging.join(SHARED_SUPPORT_ENTRY)).unwrap();
        fs::create_dir_all(staging.join("RIME/Rime/luna.userdb")).unwrap();
        fs::write(
            staging.join("RIME/SharedSupport/default.yaml"),
            "schema_list: []\n",
        )
        .unwrap();
        fs::write(staging.join("RIME/Rime/luna.userdb/000001.log"), "log").unwrap();
        fs::write(staging.join(CONFIGURATION_ENTRY), "general: {}\n").unwrap();
        staging
    }

    #[test]
    fn test_write_then_unpack() {
        let temp = TempDir::new().unwrap();
        let root = utf8_path(temp.path()).unwrap();
        let staging = staged_tree(&root);
        let output = root.join("backups/20260101-120000.tar.gz");

        let manifest = write_archive(&staging, &output).unwrap();
        assert_eq!(manifest.file_count, 3);
        assert!(manifest.checksums.contains_key("RIME/Rime/luna.userdb/000001.log"));
        assert!(output.is_file());

        let unpacked = root.join("unpacked");
        let read_back = unpack_archive(&output, &unpacked).unwrap();
        assert_eq!(read_back.checksums, manifest.checksums);
        assert_eq!(
            fs::read_to_string(unpacked.join("RIME/Rime/luna.userdb/000001.log")).unwrap(),
            "log"
        );
    }

    #[test]
    fn test_empty_roots_survive() {
        let temp = TempDir::new().unwrap();
        let root = utf8_path(temp.path()).unwrap();
        let staging = root.join("staging");
        fs::create_dir_all(staging.join(SHARED_SUPPORT_ENTRY)).unwrap();
        fs::create_dir_all(staging.join(USER_DATA_ENTRY)).unwrap();
        fs::write(staging.join(CONFIGURATION_ENTRY), "general: {}\n").unwrap();

        let output = root.join("out.tar.gz");
        write_archive(&staging, &output).unwrap();
        let unpacked = root.join("unpacked");
        unpack_archive(&output, &unpacked).unwrap();
        assert!(unpacked.join(USER_DATA_ENTRY).is_dir());
    }

    #[test]
    fn test_missing_archive() {
        let temp = TempDir::new().unwrap();
        let root = utf8_path(temp.path()).unwrap();
        let err = unpack_archive(&root.join("none.tar.gz"), &root.join("out")).unwrap_err();
        assert!(err.to_string().contains("Backup file not found"));
    }

    #[test]
    fn test_not_gzip_is_malformed() {
        let temp = TempDir::new().unwrap();
        let root = utf8_path(temp.path()).unwrap();
        let bad = root.join("bad.tar.gz");
        fs::write(&bad, b"this is not a valid gzip archive").unwrap();
        assert!(matches!(
            unpack_archive(&bad, &root.join("out")),
            Err(Error::Restore { .. })
        ));
    }

    #[test]
    fn test_missing_layout_rejected() {
        let temp = TempDir::new().unwrap();
        let root = utf8_path(temp.path()).unwrap();
        let staging = staged_tree(&root);
        fs::remove_file(staging.join(CONFIGURATION_ENTRY)).unwrap();

        let output = root.join("out.tar.gz");
        write_archive(&staging, &output).unwrap();
        let err = unpack_archive(&output, &root.join("unpacked")).unwrap_err();
        assert!(err.to_string().contains("imesync.yaml"));
    }

    #[test]
    fn test_tampered_file_fails_checksum() {
        let temp = TempDir::new().unwrap();
        let root = utf8_path(temp.path()).unwrap();
        let staging = staged_tree(&root);

        // Rebuild an archive whose manifest no longer matches its contents
        let output = root.join("good.tar.gz");
        let manifest = write_archive(&staging, &output).unwrap();
        fs::write(staging.join(CONFIGURATION_ENTRY), "general: {enable-cloud: true}\n").unwrap();
        fs::write(staging.join(MANIFEST_FILENAME), manifest.to_json().unwrap()).unwrap();

        let tampered = root.join("tampered.tar.gz");
        {
            let file = File::create(&tampered).unwrap();
            let mut tar = TarBuilder::new(GzEncoder::new(file, Compression::default()));
            tar.append_dir_all(".", &staging).unwrap();
            tar.into_inner().unwrap().finish().unwrap();
        }

        let err = unpack_archive(&tampered, &root.join("unpacked")).unwrap_err();
        assert!(err.to_string().contains("Checksum mismatch"));
    }
}
