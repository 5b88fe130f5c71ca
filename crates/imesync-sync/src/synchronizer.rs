//! Directory synchronizer
//!
//! `sync` has two policies. When the destination is absent (or empty) a full
//! filtered copy is made. When it exists, `overwrite = false` is a successful
//! no-op and `overwrite = true` is a destructive replace: files present only
//! in the destination are lost. The replace copies into a sibling staging
//! directory first and swaps it in with renames, so an I/O failure during the
//! copy leaves the destination as it was. `replace_all` does the same for
//! several roots at once, staging all of them before swapping any.
//!
//! `merge_copy` is the incremental variant used for cloud mirrors and
//! dictionary pulls: new or changed files are copied, identical files are
//! skipped and nothing is deleted.

use crate::preflight::{check_destination_writable, check_source_readable};
use camino::{Utf8Path, Utf8PathBuf};
use imesync_core::filter::path_key;
use imesync_core::roles::{DirectoryRegistry, DirectoryRole, StorageDomain};
use imesync_core::utils::utf8_path;
use imesync_core::{Error, PathFilter, Result};
use std::fs::{self, File};
use std::io::{BufReader, Read};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// A directory role in a storage domain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Location {
    pub domain: StorageDomain,
    pub role: DirectoryRole,
}

impl Location {
    pub fn new(domain: StorageDomain, role: DirectoryRole) -> Self {
        Self { domain, role }
    }

    pub fn sandbox(role: DirectoryRole) -> Self {
        Self::new(StorageDomain::Sandbox, role)
    }

    pub fn shared(role: DirectoryRole) -> Self {
        Self::new(StorageDomain::Shared, role)
    }

    pub fn cloud(role: DirectoryRole) -> Self {
        Self::new(StorageDomain::Cloud, role)
    }
}

/// What a sync did to the destination
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Destination was absent or empty and has been populated
    Created,
    /// Destination was replaced wholesale
    Replaced,
    /// Destination existed and overwrite was off
    Unchanged,
    /// Incremental copy into an existing destination
    Merged,
}

/// Counts reported by a sync
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    pub outcome: SyncOutcome,
    /// Files written to the destination
    pub copied: usize,
    /// Files already identical in the destination
    pub skipped: usize,
    /// Files left out by the filter
    pub filtered: usize,
}

impl SyncReport {
    fn new(outcome: SyncOutcome) -> Self {
        Self {
            outcome,
            copied: 0,
            skipped: 0,
            filtered: 0,
        }
    }
}

/// Role-addressed synchronizer
#[derive(Debug, Clone)]
pub struct DirectorySynchronizer {
    registry: DirectoryRegistry,
}

impl DirectorySynchronizer {
    pub fn new(registry: DirectoryRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &DirectoryRegistry {
        &self.registry
    }

    /// Copy `src` to `dst` following the overwrite policy
    pub fn sync(
        &self,
        src: Location,
        dst: Location,
        filter: &PathFilter,
        overwrite: bool,
    ) -> Result<SyncReport> {
        let src_path = self.registry.path_of(src.domain, src.role)?;
        let dst_path = self.registry.path_of(dst.domain, dst.role)?;
        sync_paths(&src_path, &dst_path, filter, overwrite)
    }

    /// Incremental copy from `src` to `dst`
    pub fn merge(&self, src: Location, dst: Location, filter: &PathFilter) -> Result<SyncReport> {
        let src_path = self.registry.path_of(src.domain, src.role)?;
        let dst_path = self.registry.path_of(dst.domain, dst.role)?;
        merge_copy(&src_path, &dst_path, filter)
    }
}

/// Path-level [`DirectorySynchronizer::sync`]
pub fn sync_paths(
    src: &Utf8Path,
    dst: &Utf8Path,
    filter: &PathFilter,
    overwrite: bool,
) -> Result<SyncReport> {
    check_source_readable(src)?;
    check_destination_writable(dst)?;

    if !has_entries(dst)? {
        fs::create_dir_all(dst).map_err(|e| Error::filesystem(dst, e))?;
        let mut report = SyncReport::new(SyncOutcome::Created);
        copy_tree(src, dst, filter, &mut report)?;
        info!(
            "Synced {} -> {}: {} copied, {} filtered",
            src, dst, report.copied, report.filtered
        );
        return Ok(report);
    }

    if !overwrite {
        debug!("{} exists and overwrite is off, leaving it unchanged", dst);
        return Ok(SyncReport::new(SyncOutcome::Unchanged));
    }

    let staged = StagedReplace::stage(src, dst, filter)?;
    let report = swap_in(vec![staged])?.remove(0);
    info!(
        "Replaced {} from {}: {} copied, {} filtered",
        dst, src, report.copied, report.filtered
    );
    Ok(report)
}

/// Copy new or changed files from `src` into `dst`; never deletes
pub fn merge_copy(src: &Utf8Path, dst: &Utf8Path, filter: &PathFilter) -> Result<SyncReport> {
    check_source_readable(src)?;
    check_destination_writable(dst)?;
    fs::create_dir_all(dst).map_err(|e| Error::filesystem(dst, e))?;

    let mut report = SyncReport::new(SyncOutcome::Merged);
    for (relative, source) in admitted_files(src, filter, &mut report)? {
        let target = dst.join(&relative);
        if target.is_file() && files_equal(&source, &target)? {
            report.skipped += 1;
            continue;
        }
        copy_file(&source, &target)?;
        report.copied += 1;
    }

    info!(
        "Merged {} -> {}: {} copied, {} unchanged, {} filtered",
        src, dst, report.copied, report.skipped, report.filtered
    );
    Ok(report)
}

/// Replace every destination with a filtered copy of its source.
///
/// Every source is copied into a staged sibling of its destination before
/// the first destination is touched, so a failed copy changes nothing. When
/// a swap fails, destinations already swapped are put back; only if that
/// also fails is `IncompleteReplace` returned.
pub fn replace_all(
    pairs: &[(Utf8PathBuf, Utf8PathBuf)],
    filter: &PathFilter,
) -> Result<Vec<SyncReport>> {
    for (src, dst) in pairs {
        check_source_readable(src)?;
        check_destination_writable(dst)?;
    }

    let mut staged = Vec::with_capacity(pairs.len());
    for (src, dst) in pairs {
        match StagedReplace::stage(src, dst, filter) {
            Ok(replace) => staged.push(replace),
            Err(e) => {
                staged.iter().for_each(StagedReplace::discard);
                return Err(e);
            }
        }
    }

    let reports = swap_in(staged)?;
    for ((src, dst), report) in pairs.iter().zip(&reports) {
        info!(
            "Replaced {} from {}: {} copied, {} filtered",
            dst, src, report.copied, report.filtered
        );
    }
    Ok(reports)
}

/// A filtered copy of `src` waiting beside the destination it replaces
struct StagedReplace {
    dst: Utf8PathBuf,
    staging: Utf8PathBuf,
    retired: Utf8PathBuf,
    existed: bool,
    report: SyncReport,
}

/// A swap that failed; `restored` is false when the previous copy could not be put back
struct SwapFailure {
    source: std::io::Error,
    restored: bool,
}

impl StagedReplace {
    fn stage(src: &Utf8Path, dst: &Utf8Path, filter: &PathFilter) -> Result<Self> {
        let parent = dst.parent().unwrap_or(dst);
        let name = dst.file_name().unwrap_or("dir");
        let token = uuid::Uuid::new_v4().simple().to_string();
        let outcome = if has_entries(dst)? {
            SyncOutcome::Replaced
        } else {
            SyncOutcome::Created
        };

        let staged = Self {
            dst: dst.to_path_buf(),
            staging: parent.join(format!(".{}.staging-{}", name, token)),
            retired: parent.join(format!(".{}.old-{}", name, token)),
            existed: dst.exists(),
            report: SyncReport::new(outcome),
        };
        let mut report = staged.report;
        let copied = fs::create_dir_all(&staged.staging)
            .map_err(|e| Error::filesystem(&staged.staging, e))
            .and_then(|_| copy_tree(src, &staged.staging, filter, &mut report));
        if let Err(e) = copied {
            staged.discard();
            return Err(e);
        }
        Ok(Self { report, ..staged })
    }

    /// Move the destination aside and the staged copy into its place
    fn commit(&self) -> std::result::Result<(), SwapFailure> {
        if self.existed {
            fs::rename(&self.dst, &self.retired).map_err(|source| SwapFailure {
                source,
                restored: true,
            })?;
        }
        if let Err(source) = fs::rename(&self.staging, &self.dst) {
            warn!("Failed to move staged copy into {}: {}", self.dst, source);
            let restored = !self.existed || fs::rename(&self.retired, &self.dst).is_ok();
            return Err(SwapFailure { source, restored });
        }
        Ok(())
    }

    /// Undo a successful commit
    fn rollback(&self) -> std::io::Result<()> {
        fs::rename(&self.dst, &self.staging)?;
        if self.existed {
            fs::rename(&self.retired, &self.dst)?;
        }
        self.discard();
        Ok(())
    }

    fn discard(&self) {
        if self.staging.exists() {
            fs::remove_dir_all(&self.staging).ok();
        }
    }

    fn finish(self) -> SyncReport {
        if self.existed {
            if let Err(e) = fs::remove_dir_all(&self.retired) {
                warn!("Could not remove previous copy {}: {}", self.retired, e);
            }
        }
        self.report
    }
}

fn swap_in(staged: Vec<StagedReplace>) -> Result<Vec<SyncReport>> {
    let mut committed = 0;
    let mut failure = None;
    for replace in &staged {
        match replace.commit() {
            Ok(()) => committed += 1,
            Err(e) => {
                failure = Some((replace.dst.clone(), e));
                break;
            }
        }
    }

    let Some((path, failure)) = failure else {
        return Ok(staged.into_iter().map(StagedReplace::finish).collect());
    };

    staged[committed..].iter().for_each(StagedReplace::discard);
    let mut restored = failure.restored;
    for replace in staged[..committed].iter().rev() {
        if let Err(e) = replace.rollback() {
            warn!("Failed to put back {}: {}", replace.dst, e);
            restored = false;
        }
    }

    if restored {
        Err(Error::filesystem(path, failure.source))
    } else {
        Err(Error::IncompleteReplace {
            path,
            source: failure.source,
        })
    }
}

fn has_entries(dir: &Utf8Path) -> Result<bool> {
    if !dir.is_dir() {
        return Ok(false);
    }
    let mut entries = fs::read_dir(dir).map_err(|e| Error::filesystem(dir, e))?;
    Ok(entries.next().is_some())
}

fn copy_tree(
    src: &Utf8Path,
    dst: &Utf8Path,
    filter: &PathFilter,
    report: &mut SyncReport,
) -> Result<()> {
    for (relative, source) in admitted_files(src, filter, report)? {
        copy_file(&source, &dst.join(&relative))?;
        report.copied += 1;
    }
    Ok(())
}

/// Files below `root` admitted by `filter`, as (relative, absolute) pairs.
/// Filtered files are counted in `report`.
fn admitted_files(
    root: &Utf8Path,
    filter: &PathFilter,
    report: &mut SyncReport,
) -> Result<Vec<(Utf8PathBuf, Utf8PathBuf)>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(false).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let path = e
                .path()
                .and_then(|p| utf8_path(p).ok())
                .unwrap_or_else(|| root.to_path_buf());
            Error::filesystem(path, e.into())
        })?;

        let is_file = entry.file_type().is_file()
            || (entry.file_type().is_symlink() && entry.path().is_file());
        if !is_file {
            continue;
        }

        let absolute = utf8_path(entry.path())?;
        let relative = absolute
            .strip_prefix(root)
            .map(Utf8Path::to_path_buf)
            .unwrap_or_else(|_| absolute.clone());

        if filter.admits(&relative) {
            files.push((relative, absolute));
        } else {
            debug!("Filtered out {}", path_key(&relative));
            report.filtered += 1;
        }
    }
    Ok(files)
}

fn copy_file(source: &Utf8Path, target: &Utf8Path) -> Result<()> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::filesystem(parent, e))?;
    }
    fs::copy(source, target).map_err(|e| Error::filesystem(target, e))?;
    Ok(())
}

fn files_equal(a: &Utf8Path, b: &Utf8Path) -> Result<bool> {
    let len_a = fs::metadata(a).map_err(|e| Error::filesystem(a, e))?.len();
    let len_b = fs::metadata(b).map_err(|e| Error::filesystem(b, e))?.len();
    if len_a != len_b {
        return Ok(false);
    }

    let mut reader_a = BufReader::new(File::open(a).map_err(|e| Error::filesystem(a, e))?);
    let mut reader_b = BufReader::new(File::open(b).map_err(|e| Error::filesystem(b, e))?);
    let mut buf_a = [0u8; 8192];
    let mut buf_b = [0u8; 8192];
    loop {
        let n = reader_a
            .read(&mut buf_a)
            .map_err(|e| Error::filesystem(a, e))?;
        if n == 0 {
            return Ok(true);
        }
        reader_b
            .read_exact(&mut buf_b[..n])
            .map_err(|e| Error::filesystem(b, e))?;
        if buf_a[..n] != buf_b[..n] {
            return Ok(false);
        }
    }
}
