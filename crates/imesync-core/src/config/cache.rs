//! Fast-access key-value cache in the shared container
//!
//! A single JSON object file. Writes go through a temp file and a rename, so
//! readers in other processes always see a complete snapshot.

use crate::error::{Error, Result};
use crate::utils::atomic_write;
use camino::{Utf8Path, Utf8PathBuf};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::io::ErrorKind;

/// Flag telling the keyboard process to re-copy the shared directories
pub const NEEDS_RESYNC_KEY: &str = "keyboard.needs-resync";

/// Flag mirroring `general.enable-cloud` for processes without the document
pub const CLOUD_ENABLED_KEY: &str = "cloud.enabled";

/// Ids of the selected input schemas
pub const SELECTED_SCHEMAS_KEY: &str = "schemas.selected";

/// Schemas found after the last deploy
pub const AVAILABLE_SCHEMAS_KEY: &str = "schemas.available";

#[derive(Debug, Clone)]
pub struct PreferenceCache {
    path: Utf8PathBuf,
}

impl PreferenceCache {
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Display path for a single key, used in error reports
    pub fn key_path(&self, key: &str) -> Utf8PathBuf {
        Utf8PathBuf::from(format!("{}#{}", self.path, key))
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let entries = self.read()?;
        match entries.get(key) {
            Some(value) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|e| Error::decode(self.key_path(key).into_string(), e)),
            None => Ok(None),
        }
    }

    pub fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let mut entries = self.read()?;
        entries.insert(key.to_string(), serde_json::to_value(value)?);
        self.write(&entries)
    }

    pub fn remove_all(&self, keys: &[&str]) -> Result<()> {
        let mut entries = self.read()?;
        let before = entries.len();
        for key in keys {
            entries.remove(*key);
        }
        if entries.len() != before {
            self.write(&entries)?;
        }
        Ok(())
    }

    /// Boolean flag, false when unset
    pub fn flag(&self, key: &str) -> Result<bool> {
        Ok(self.get::<bool>(key)?.unwrap_or(false))
    }

    pub fn set_flag(&self, key: &str, value: bool) -> Result<()> {
        self.set(key, &value)
    }

    fn read(&self) -> Result<Map<String, Value>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => return Err(Error::filesystem(&self.path, e)),
        };
        if content.trim().is_empty() {
            return Ok(Map::new());
        }
        serde_json::from_str(&content).map_err(|e| Error::decode(self.path.as_str(), e))
    }

    fn write(&self, entries: &Map<String, Value>) -> Result<()> {
        let json = serde_json::to_string_pretty(entries)?;
        atomic_write(&self.path, json.as_bytes())
    }
}
