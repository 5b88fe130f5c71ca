//! Regex path filters for copy operations.
//!
//! Patterns are plain regular expressions evaluated against the whole
//! relative path of a file (forward slashes, no leading slash), not per
//! path segment. A pattern matches anywhere in the path unless it is anchored.

use crate::error::{Error, Result};
use camino::Utf8Path;
use regex::RegexSet;

/// How matching paths are treated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterMode {
    /// Matching files are skipped
    #[default]
    Exclude,
    /// Only matching files are copied
    IncludeOnly,
}

/// Compiled filter over relative file paths
#[derive(Debug, Clone)]
pub struct PathFilter {
    set: RegexSet,
    mode: FilterMode,
}

impl PathFilter {
    /// Compile `patterns`, rejecting the first invalid one
    pub fn new<S: AsRef<str>>(patterns: &[S], mode: FilterMode) -> Result<Self> {
        for pattern in patterns {
            let pattern = pattern.as_ref();
            if let Err(e) = regex::Regex::new(pattern) {
                return Err(Error::InvalidPattern {
                    pattern: pattern.to_string(),
                    message: e.to_string(),
                });
            }
        }

        let set = RegexSet::new(patterns.iter().map(AsRef::as_ref)).map_err(|e| {
            Error::InvalidPattern {
                pattern: patterns
                    .iter()
                    .map(AsRef::as_ref)
                    .collect::<Vec<_>>()
                    .join(", "),
                message: e.to_string(),
            }
        })?;

        Ok(Self { set, mode })
    }

    /// Skip files matching any of `patterns`
    pub fn exclude<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        Self::new(patterns, FilterMode::Exclude)
    }

    /// Copy only files matching one of `patterns`
    pub fn include_only<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        Self::new(patterns, FilterMode::IncludeOnly)
    }

    /// Filter that copies everything
    pub fn none() -> Self {
        Self {
            set: RegexSet::empty(),
            mode: FilterMode::Exclude,
        }
    }

    pub fn mode(&self) -> FilterMode {
        self.mode
    }

    /// True when some pattern matches `relative`
    pub fn matches(&self, relative: &str) -> bool {
        self.set.is_match(relative)
    }

    /// Decide whether a file at `relative` takes part in the copy.
    ///
    /// An include-only filter without patterns admits nothing.
    pub fn admits(&self, relative: &Utf8Path) -> bool {
        let key = path_key(relative);
        match self.mode {
            FilterMode::Exclude => !self.matches(&key),
            FilterMode::IncludeOnly => self.matches(&key),
        }
    }
}

/// Normalized form of a relative path: '/' separators, no leading slash
pub fn path_key(relative: &Utf8Path) -> String {
    relative
        .components()
        .map(|c| c.as_str())
        .filter(|c| *c != "/" && *c != ".")
        .collect::<Vec<_>>()
        .join("/")
}
