//! # imesync-sync
//!
//! Role-addressed directory synchronization between the sandbox, shared and
//! cloud storage domains, with the pre-flight checks every mutating
//! operation runs first.

pub mod preflight;
pub mod synchronizer;

pub use preflight::{
    check_cloud_writable, check_destination_writable, check_propagation, check_source_readable,
    ensure_writable_dir,
};
pub use synchronizer::{
    merge_copy, replace_all, sync_paths, DirectorySynchronizer, Location, SyncOutcome,
    SyncReport,
};
