//! Pre-flight checks run before any directory is mutated

use camino::{Utf8Path, Utf8PathBuf};
use imesync_core::roles::{DirectoryRegistry, DirectoryRole, StorageDomain};
use imesync_core::{Error, Result};
use std::fs;
use tracing::debug;

/// Name of the probe file written to test writability
pub const WRITE_PROBE_NAME: &str = ".imesync-write-test";

/// Source must be an existing, listable directory
pub fn check_source_readable(path: &Utf8Path) -> Result<()> {
    if !path.is_dir() || fs::read_dir(path).is_err() {
        return Err(Error::SourceNotReadable {
            path: path.to_path_buf(),
        });
    }
    debug!("✓ Source is readable: {}", path);
    Ok(())
}

/// Destination (or, when absent, its nearest existing ancestor) must accept writes
pub fn check_destination_writable(path: &Utf8Path) -> Result<()> {
    let not_writable = || Error::DestinationNotWritable {
        path: path.to_path_buf(),
    };

    if path.exists() && !path.is_dir() {
        return Err(not_writable());
    }

    // replacing the destination renames entries in its parent
    let parent_probe = nearest_existing(path.parent().unwrap_or(path)).ok_or_else(not_writable)?;
    if !probe_writable(&parent_probe) {
        return Err(not_writable());
    }
    if path.is_dir() && !probe_writable(path) {
        return Err(not_writable());
    }

    debug!("✓ Destination is writable: {}", path);
    Ok(())
}

/// Cloud mirror variant of the writability check, failing with `CloudUnwritable`
pub fn check_cloud_writable(path: &Utf8Path) -> Result<()> {
    check_destination_writable(path).map_err(|_| Error::CloudUnwritable {
        path: path.to_path_buf(),
    })
}

/// Create `path` if missing and make sure it accepts writes
pub fn ensure_writable_dir(path: &Utf8Path) -> Result<()> {
    let not_writable = || Error::DestinationNotWritable {
        path: path.to_path_buf(),
    };
    if !path.is_dir() {
        fs::create_dir_all(path).map_err(|_| not_writable())?;
    }
    if !probe_writable(path) {
        return Err(not_writable());
    }
    Ok(())
}

/// Checks shared by deploy and sync before propagating the sandbox to the
/// shared container: sandbox roles exist and are readable, shared roles are
/// writable.
pub fn check_propagation(registry: &DirectoryRegistry) -> Result<()> {
    for role in [DirectoryRole::SharedSupport, DirectoryRole::UserData] {
        let source = registry.resolve(StorageDomain::Sandbox, role)?;
        check_source_readable(&source)?;
        let destination = registry.path_of(StorageDomain::Shared, role)?;
        check_destination_writable(&destination)?;
    }
    Ok(())
}

fn nearest_existing(path: &Utf8Path) -> Option<Utf8PathBuf> {
    let mut current = Some(path);
    while let Some(candidate) = current {
        if candidate.exists() {
            return candidate.is_dir().then(|| candidate.to_path_buf());
        }
        current = candidate.parent();
    }
    None
}

fn probe_writable(dir: &Utf8Path) -> bool {
    let probe = dir.join(WRITE_PROBE_NAME);
    match fs::write(&probe, b"probe") {
        Ok(()) => {
            fs::remove_file(&probe).ok();
            true
        }
        Err(e) => {
            debug!("Write probe failed in {}: {}", dir, e);
            false
        }
    }
}
