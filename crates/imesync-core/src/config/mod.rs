//! Configuration document, patch overlay, durable store and cache

mod cache;
mod escape;
mod model;
mod store;

pub use cache::{
    PreferenceCache, AVAILABLE_SCHEMAS_KEY, CLOUD_ENABLED_KEY, NEEDS_RESYNC_KEY,
    SELECTED_SCHEMAS_KEY,
};
pub use escape::unescape_numeric_references;
pub use model::{
    Configuration, GeneralSection, KeyboardSection, Merge, Patch, RimeSection, SwipeSection,
    ToolbarSection,
};
pub use store::{ConfigStore, CURRENT_CONFIGURATION_KEY, DEFAULT_CONFIGURATION_KEY};

/// File name of the durable configuration document
pub const CONFIG_FILE_NAME: &str = "imesync.yaml";

/// File name of the patch document
pub const PATCH_FILE_NAME: &str = "imesync.custom.yaml";

/// File name of the cache in the shared container
pub const CACHE_FILE_NAME: &str = "preferences.json";
