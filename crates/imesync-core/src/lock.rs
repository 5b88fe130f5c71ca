//! Single in-flight operation lock
//!
//! Deploy, sync, reset, backup and restore all touch the same directory roots.
//! Each takes an exclusive advisory lock on a file in the sandbox and fails
//! fast with `OperationInProgress` when another holder exists, whether in
//! this process or another one.

use crate::error::{Error, Result};
use camino::{Utf8Path, Utf8PathBuf};
use fs4::fs_std::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use tracing::debug;

/// Lock file name inside the sandbox root
pub const LOCK_FILE_NAME: &str = ".imesync.lock";

/// Held for the duration of one orchestrated operation; released on drop
#[derive(Debug)]
pub struct OperationLock {
    file: File,
    path: Utf8PathBuf,
    operation: String,
}

impl OperationLock {
    /// Try to take the lock in `dir` for `operation`
    pub fn acquire(dir: &Utf8Path, operation: &str) -> Result<Self> {
        std::fs::create_dir_all(dir).map_err(|e| Error::filesystem(dir, e))?;
        let path = dir.join(LOCK_FILE_NAME);

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| Error::filesystem(&path, e))?;

        let acquired = match file.try_lock_exclusive() {
            Ok(acquired) => acquired,
            Err(e) if e.kind() == ErrorKind::WouldBlock => false,
            Err(e) => return Err(Error::filesystem(&path, e)),
        };

        if !acquired {
            let mut holder = String::new();
            let _ = file.read_to_string(&mut holder);
            let holder = holder.trim();
            return Err(Error::operation_in_progress(if holder.is_empty() {
                "another operation"
            } else {
                holder
            }));
        }

        // Record the holder for diagnostics
        file.set_len(0).map_err(|e| Error::filesystem(&path, e))?;
        file.seek(SeekFrom::Start(0))
            .map_err(|e| Error::filesystem(&path, e))?;
        file.write_all(operation.as_bytes())
            .map_err(|e| Error::filesystem(&path, e))?;

        debug!("Acquired operation lock for {}", operation);
        Ok(Self {
            file,
            path,
            operation: operation.to_string(),
        })
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }
}

impl Drop for OperationLock {
    fn drop(&mut self) {
        let _ = self.file.set_len(0);
        debug!("Released operation lock for {}", self.operation);
    }
}
