//! Common test utilities for imesync-backup

#![allow(dead_code)]

use camino::{Utf8Path, Utf8PathBuf};
use imesync_core::roles::DirectoryRegistry;
use imesync_core::settings::{BackupSettings, StorageRoots};
use imesync_core::utils::utf8_path;
use imesync_core::{ConfigStore, PreferenceCache};
use std::fs;
use tempfile::TempDir;
use walkdir::WalkDir;

/// Storage roots below one temporary directory
pub struct TestEnv {
    pub temp: TempDir,
    pub root: Utf8PathBuf,
    pub registry: DirectoryRegistry,
}

impl TestEnv {
    pub fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let root = utf8_path(temp.path()).unwrap();
        let registry = DirectoryRegistry::new(StorageRoots {
            sandbox: root.join("sandbox"),
            shared: root.join("shared"),
            cloud: None,
            bundle: root.join("bundle"),
        });
        Self {
            temp,
            root,
            registry,
        }
    }

    pub fn store(&self) -> ConfigStore {
        ConfigStore::new(PreferenceCache::new(self.registry.cache_path().unwrap()))
    }

    pub fn sandbox(&self, rel: &str) -> Utf8PathBuf {
        self.root.join("sandbox").join(rel)
    }

    pub fn write(&self, rel: &str, contents: &str) {
        let path = self.sandbox(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    /// Populate the sandbox with a small engine tree
    pub fn seed(&self) {
        self.write("SharedSupport/default.yaml", "schema_list:\n  - schema: pinyin\n");
        self.write(
            "SharedSupport/pinyin.schema.yaml",
            "schema:\n  schema_id: pinyin\n  name: Pinyin\n",
        );
        self.write("Rime/default.custom.yaml", "patch:\n  menu/page_size: 9\n");
        self.write("Rime/pinyin.userdb/000003.log", "learned words");
        self.write("Rime/custom_phrase.txt", "你好\tnh\t1\n");
    }
}

pub fn backup_settings(max_backups: usize) -> BackupSettings {
    BackupSettings {
        max_backups,
        exclude_patterns: Vec::new(),
    }
}

/// Relative file listing with contents
pub fn snapshot(root: &Utf8Path) -> Vec<(String, Vec<u8>)> {
    let mut files: Vec<(String, Vec<u8>)> = WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            let rel = e
                .path()
                .strip_prefix(root.as_std_path())
                .unwrap()
                .to_string_lossy()
                .replace('\\', "/");
            (rel, fs::read(e.path()).unwrap())
        })
        .collect();
    files.sort();
    files
}
