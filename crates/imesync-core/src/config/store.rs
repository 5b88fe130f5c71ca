//! Durable configuration documents and the fast-access cache

use crate::config::cache::PreferenceCache;
use crate::config::model::{Configuration, Merge, Patch};
use crate::error::{Error, Result};
use crate::utils::atomic_write;
use camino::Utf8Path;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::ErrorKind;
use tracing::debug;

/// Cache key holding the current configuration
pub const CURRENT_CONFIGURATION_KEY: &str = "configuration.current";

/// Cache key holding the default configuration used by "restore to default"
pub const DEFAULT_CONFIGURATION_KEY: &str = "configuration.default";

/// Loads, merges and persists configuration documents.
///
/// The store is the single writer for both the durable files and the cache;
/// orchestrated operations receive it explicitly.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    cache: PreferenceCache,
}

impl ConfigStore {
    pub fn new(cache: PreferenceCache) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &PreferenceCache {
        &self.cache
    }

    /// Load a full configuration document. All-or-nothing.
    pub fn load(&self, path: &Utf8Path) -> Result<Configuration> {
        let content = read_document(path)?;
        if content.trim().is_empty() {
            return Err(Error::decode(path.as_str(), "document is empty"));
        }
        parse_document(path, &content)
    }

    /// Load a patch document.
    ///
    /// A missing file is reported as `NotFound` so callers can treat it as
    /// "no override"; an empty file is an empty patch.
    pub fn load_patch(&self, path: &Utf8Path) -> Result<Patch> {
        let content = read_document(path)?;
        if content.trim().is_empty() {
            return Ok(Patch::default());
        }
        parse_document(path, &content)
    }

    /// Like [`load_patch`](Self::load_patch) but a missing file yields `None`
    pub fn load_patch_if_present(&self, path: &Utf8Path) -> Result<Option<Patch>> {
        match self.load_patch(path) {
            Ok(patch) => Ok(Some(patch)),
            Err(e) if e.is_not_found() => {
                debug!("No patch document at {}", path);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Save a configuration document with stable key order
    pub fn save(&self, config: &Configuration, path: &Utf8Path) -> Result<()> {
        let mut config = config.clone();
        config.normalize_text();
        write_document(&config, path)
    }

    /// Save a patch document under the top-level `patch:` key
    pub fn save_patch(&self, patch: &Patch, path: &Utf8Path) -> Result<()> {
        let mut patch = patch.clone();
        patch.patch.normalize_text();
        write_document(&patch, path)
    }

    /// Right-biased deep merge of `patch` over `base`
    pub fn merge(base: &Configuration, patch: &Patch) -> Configuration {
        base.merge(&patch.patch)
    }

    /// Store the current configuration in the cache
    pub fn save_to_cache(&self, config: &Configuration) -> Result<()> {
        self.cache.set(CURRENT_CONFIGURATION_KEY, config)
    }

    /// Current configuration from the cache
    pub fn load_from_cache(&self) -> Result<Configuration> {
        self.cache
            .get(CURRENT_CONFIGURATION_KEY)?
            .ok_or_else(|| Error::not_found(self.cache.key_path(CURRENT_CONFIGURATION_KEY)))
    }

    /// Store the default configuration used to restore single fields
    pub fn save_default_to_cache(&self, config: &Configuration) -> Result<()> {
        self.cache.set(DEFAULT_CONFIGURATION_KEY, config)
    }

    /// Default configuration from the cache
    pub fn load_default_from_cache(&self) -> Result<Configuration> {
        self.cache
            .get(DEFAULT_CONFIGURATION_KEY)?
            .ok_or_else(|| Error::not_found(self.cache.key_path(DEFAULT_CONFIGURATION_KEY)))
    }

    /// Drop both cached configurations
    pub fn clear_cache(&self) -> Result<()> {
        self.cache
            .remove_all(&[CURRENT_CONFIGURATION_KEY, DEFAULT_CONFIGURATION_KEY])
    }
}

fn read_document(path: &Utf8Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => Error::not_found(path),
        ErrorKind::InvalidData => Error::decode(path.as_str(), e),
        _ => Error::filesystem(path, e),
    })
}

fn parse_document<T: DeserializeOwned>(path: &Utf8Path, content: &str) -> Result<T> {
    serde_yaml_ng::from_str(content).map_err(|e| Error::decode(path.as_str(), e))
}

fn write_document<T: Serialize>(value: &T, path: &Utf8Path) -> Result<()> {
    let yaml = serde_yaml_ng::to_string(value)?;
    atomic_write(path, yaml.as_bytes())?;
    debug!("Wrote {}", path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::{KeyboardSection, RimeSection};
    use crate::utils::utf8_path;
    use tempfile::TempDir;

    fn store_in(temp: &TempDir) -> (ConfigStore, camino::Utf8PathBuf) {
        let root = utf8_path(temp.path()).unwrap();
        let cache = PreferenceCache::new(root.join("preferences.json"));
        (ConfigStore::new(cache), root)
    }

    #[test]
    fn test_save_then_load_round_trip() {
        let temp = TempDir::new().unwrap();
        let (store, root) = store_in(&temp);
        let path = root.join("imesync.yaml");

        let config = Configuration::defaults();
        store.save(&config, &path).unwrap();
        assert_eq!(store.load(&path).unwrap(), config);
    }

    #[test]
    fn test_repeated_saves_are_byte_identical() {
        let temp = TempDir::new().unwrap();
        let (store, root) = store_in(&temp);
        let path = root.join("imesync.yaml");

        let config = Configuration::defaults();
        store.save(&config, &path).unwrap();
        let first = std::fs::read(&path).unwrap();
        store.save(&config, &path).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), first);
    }

    #[test]
    fn test_load_missing_is_not_found() {
        let temp = TempDir::new().unwrap();
        let (store, root) = store_in(&temp);
        assert!(store.load(&root.join("absent.yaml")).unwrap_err().is_not_found());
        assert!(store
            .load_patch(&root.join("absent.custom.yaml"))
            .unwrap_err()
            .is_not_found());
        assert!(store
            .load_patch_if_present(&root.join("absent.custom.yaml"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_load_malformed_is_decode_error() {
        let temp = TempDir::new().unwrap();
        let (store, root) = store_in(&temp);
        let path = root.join("imesync.yaml");
        std::fs::write(&path, "keyboard:\n  enable-key-sounds: [not, a, bool]\n").unwrap();
        assert!(matches!(store.load(&path), Err(Error::Decode { .. })));

        std::fs::write(&path, "").unwrap();
        assert!(matches!(store.load(&path), Err(Error::Decode { .. })));
    }

    #[test]
    fn test_patch_document_uses_patch_key() {
        let temp = TempDir::new().unwrap();
        let (store, root) = store_in(&temp);
        let path = root.join("imesync.custom.yaml");
        std::fs::write(&path, "patch:\n  keyboard:\n    enable-key-sounds: false\n").unwrap();

        let patch = store.load_patch(&path).unwrap();
        assert_eq!(
            patch.patch.keyboard.as_ref().unwrap().enable_key_sounds,
            Some(false)
        );

        std::fs::write(&path, "   \n").unwrap();
        assert!(store.load_patch(&path).unwrap().is_empty());
    }

    #[test]
    fn test_save_patch_round_trip() {
        let temp = TempDir::new().unwrap();
        let (store, root) = store_in(&temp);
        let path = root.join("imesync.custom.yaml");

        let patch = Patch::new(Configuration {
            rime: Some(RimeSection {
                selected_schemas: Some(vec!["pinyin".to_string()]),
                ..Default::default()
            }),
            ..Default::default()
        });
        store.save_patch(&patch, &path).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.starts_with("patch:"));
        assert_eq!(store.load_patch(&path).unwrap(), patch);
    }

    #[test]
    fn test_save_writes_literal_text() {
        let temp = TempDir::new().unwrap();
        let (store, root) = store_in(&temp);
        let path = root.join("imesync.yaml");

        let config = Configuration {
            keyboard: Some(KeyboardSection {
                label_text_for_space_button: Some("&#x7A7A;&#26684;".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        store.save(&config, &path).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("空格"));
        assert!(!raw.contains("&#"));
    }

    #[test]
    fn test_failed_save_leaves_previous_file() {
        let temp = TempDir::new().unwrap();
        let (store, root) = store_in(&temp);
        let path = root.join("imesync.yaml");
        store.save(&Configuration::defaults(), &path).unwrap();
        let before = std::fs::read(&path).unwrap();

        // a directory in place of the parent makes the write fail
        let blocked = root.join("imesync.yaml").join("nested.yaml");
        assert!(matches!(
            store.save(&Configuration::default(), &blocked),
            Err(Error::Write { .. })
        ));
        assert_eq!(std::fs::read(&path).unwrap(), before);
    }

    #[test]
    fn test_cache_current_and_default_are_independent() {
        let temp = TempDir::new().unwrap();
        let (store, _root) = store_in(&temp);

        assert!(store.load_from_cache().unwrap_err().is_not_found());

        let current = Configuration {
            keyboard: Some(KeyboardSection {
                enable_key_sounds: Some(true),
                ..Default::default()
            }),
            ..Default::default()
        };
        store.save_to_cache(&current).unwrap();
        store.save_default_to_cache(&Configuration::defaults()).unwrap();

        assert_eq!(store.load_from_cache().unwrap(), current);
        assert_eq!(
            store.load_default_from_cache().unwrap(),
            Configuration::defaults()
        );

        store.clear_cache().unwrap();
        assert!(store.load_default_from_cache().unwrap_err().is_not_found());
    }
}
