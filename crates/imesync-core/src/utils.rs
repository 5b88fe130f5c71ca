//! Shared utility functions for imesync crates

use crate::error::{Error, Result};
use camino::{Utf8Path, Utf8PathBuf};
use std::io::Write;
use std::path::Path;

/// Get the user's home directory
///
/// Prefers the HOME environment variable so that tests and wrapper scripts can
/// redirect it, then falls back to the platform lookup.
pub fn get_home_dir() -> Result<Utf8PathBuf> {
    if let Ok(home) = std::env::var("HOME") {
        return Ok(Utf8PathBuf::from(home));
    }

    directories::BaseDirs::new()
        .and_then(|dirs| Utf8PathBuf::from_path_buf(dirs.home_dir().to_path_buf()).ok())
        .ok_or_else(|| Error::invalid_settings("Could not determine home directory"))
}

/// Convert a std path into a UTF-8 path
pub fn utf8_path(path: &Path) -> Result<Utf8PathBuf> {
    Utf8PathBuf::from_path_buf(path.to_path_buf()).map_err(|p| {
        Error::filesystem(
            p.to_string_lossy().to_string(),
            std::io::Error::new(std::io::ErrorKind::InvalidData, "path is not valid UTF-8"),
        )
    })
}

/// Write `contents` to `path` through a sibling temp file and a rename.
///
/// On any failure the previous file at `path` is left untouched.
pub fn atomic_write(path: &Utf8Path, contents: &[u8]) -> Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_str().is_empty() => p.to_path_buf(),
        _ => Utf8PathBuf::from("."),
    };
    std::fs::create_dir_all(&parent).map_err(|e| Error::write(path, e))?;

    let mut temp = tempfile::NamedTempFile::new_in(&parent).map_err(|e| Error::write(path, e))?;
    temp.write_all(contents).map_err(|e| Error::write(path, e))?;
    temp.as_file().sync_all().map_err(|e| Error::write(path, e))?;
    temp.persist(path).map_err(|e| Error::write(path, e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_get_home_dir_from_env() {
        if std::env::var("HOME").is_ok() {
            let home = get_home_dir().unwrap();
            assert!(!home.as_str().is_empty());
        }
    }

    #[test]
    fn test_atomic_write_replaces_contents() {
        let temp = TempDir::new().unwrap();
        let path = utf8_path(temp.path()).unwrap().join("nested/file.txt");

        atomic_write(&path, b"first").unwrap();
        atomic_write(&path, b"second").unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "second");
        let leftovers = std::fs::read_dir(path.parent().unwrap()).unwrap().count();
        assert_eq!(leftovers, 1);
    }
}
