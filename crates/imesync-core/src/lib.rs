//! # imesync-core
//!
//! Core library for imesync providing:
//! - The configuration document, its patch overlay, durable store and cache
//! - Runtime settings with hierarchical loading
//! - Directory roles across the sandbox, shared and cloud storage domains
//! - Regex path filters
//! - Input schema discovery and selection
//! - The single in-flight operation lock

pub mod config;
pub mod error;
pub mod filter;
pub mod lock;
pub mod roles;
pub mod schema;
pub mod settings;
pub mod utils;

pub use config::{ConfigStore, Configuration, Merge, Patch, PreferenceCache};
pub use error::{Error, Result};
pub use filter::{FilterMode, PathFilter};
pub use lock::OperationLock;
pub use roles::{DirectoryRegistry, DirectoryRole, StorageDomain};
pub use schema::{Schema, SchemaCatalog, SchemaSelection};
pub use settings::{HierarchicalSettingsLoader, RuntimeSettings, StorageRoots};
