//! Common test utilities for imesync-deploy
//!
//! - `TestEnv`: sandbox, shared, cloud and bundle roots in a temp directory
//! - `MockEngine`: records engine calls and can be told to fail or stall

#![allow(dead_code)]
#![allow(unused_imports)]

pub mod mocks;

pub use mocks::*;

use camino::Utf8PathBuf;
use imesync_core::roles::DirectoryRegistry;
use imesync_core::settings::{RuntimeSettings, StorageRoots};
use imesync_core::utils::utf8_path;
use imesync_core::{ConfigStore, PreferenceCache};
use imesync_deploy::Orchestrator;
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

pub struct TestEnv {
    pub temp: TempDir,
    pub root: Utf8PathBuf,
    pub registry: DirectoryRegistry,
}

impl TestEnv {
    pub fn new() -> Self {
        Self::build(false)
    }

    pub fn with_cloud() -> Self {
        Self::build(true)
    }

    fn build(cloud: bool) -> Self {
        let temp = TempDir::new().unwrap();
        let root = utf8_path(temp.path()).unwrap();
        let registry = DirectoryRegistry::new(StorageRoots {
            sandbox: root.join("sandbox"),
            shared: root.join("shared"),
            cloud: cloud.then(|| root.join("cloud")),
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

    pub fn path(&self, rel: &str) -> Utf8PathBuf {
        self.root.join(rel)
    }

    pub fn write(&self, rel: &str, contents: &str) {
        let path = self.path(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    pub fn read(&self, rel: &str) -> String {
        fs::read_to_string(self.path(rel)).unwrap()
    }

    /// A sandbox with one schema and some user data
    pub fn seed_sandbox(&self) {
        self.write(
            "sandbox/SharedSupport/pinyin.schema.yaml",
            "schema:\n  schema_id: pinyin\n  name: Pinyin\n",
        );
        self.write("sandbox/SharedSupport/default.yaml", "schema_list: []\n");
        self.write("sandbox/Rime/default.custom.yaml", "patch: {}\n");
    }

    pub fn orchestrator(&self, engine: Arc<MockEngine>) -> Orchestrator {
        self.orchestrator_with(engine, RuntimeSettings::default())
    }

    pub fn orchestrator_with(
        &self,
        engine: Arc<MockEngine>,
        settings: RuntimeSettings,
    ) -> Orchestrator {
        Orchestrator::new(self.registry.clone(), self.store(), settings, engine)
    }
}
