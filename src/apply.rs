//! Delta package application.
//!
//! The delta and base packages are expanded into scratch trees, every
//! `lib/` entry of the delta is dispatched by suffix onto the working
//! tree, files the delta never mentions are deleted, metadata is copied
//! over, and the working tree is repacked as the reconstructed package.
//! Each patched file is verified against its `.shasum` record before it
//! replaces the original.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::archive;
use crate::codec;
use crate::error::{Error, Result};
use crate::layout;
use crate::progress::{ProgressFn, ProgressReporter};
use crate::release_entry::ReleaseEntry;
use crate::util::{self, EntryKind};

const PROGRESS_DELTA_EXTRACTED: u8 = 25;
const PROGRESS_BASE_EXTRACTED: u8 = 50;
const PROGRESS_PATCHES_APPLIED: u8 = 75;
const PROGRESS_DELETIONS_DONE: u8 = 80;
const PROGRESS_REPACKED: u8 = 100;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplySummary {
    pub files_patched: usize,
    pub files_copied: usize,
    pub files_unchanged: usize,
    pub files_deleted: usize,
    pub metadata_copied: usize,
}

/// Reconstructs the full package at `output` by applying `delta_pkg` onto
/// `base_pkg`. The optional callback observes the coarse progress
/// checkpoints, strictly increasing up to 100.
pub async fn apply_delta(
    base_pkg: &Path,
    delta_pkg: &Path,
    output: &Path,
    progress: Option<ProgressFn>,
) -> Result<ApplySummary> {
    for input in [base_pkg, delta_pkg] {
        if !input.is_file() {
            return Err(Error::MissingInput(input.to_path_buf()));
        }
    }
    if output.exists() {
        return Err(Error::OutputExists(output.to_path_buf()));
    }

    let base_pkg = base_pkg.to_path_buf();
    let delta_pkg = delta_pkg.to_path_buf();
    let output = output.to_path_buf();
    let handle = tokio::task::spawn_blocking(move || {
        apply_delta_blocking(
            &base_pkg,
            &delta_pkg,
            &output,
            ProgressReporter::new(progress),
        )
    });
    match handle.await {
        Ok(inner) => inner,
        Err(join_err) => Err(Error::TaskFailed(join_err.to_string())),
    }
}

fn apply_delta_blocking(
    base_pkg: &Path,
    delta_pkg: &Path,
    output: &Path,
    reporter: ProgressReporter,
) -> Result<ApplySummary> {
    let delta_scratch = tempfile::tempdir()?;
    let work_scratch = tempfile::tempdir()?;

    archive::extract_archive(delta_pkg, delta_scratch.path())?;
    reporter.report(PROGRESS_DELTA_EXTRACTED);
    archive::extract_archive(base_pkg, work_scratch.path())?;
    reporter.report(PROGRESS_BASE_EXTRACTED);

    let result = reconstruct(delta_scratch.path(), work_scratch.path(), output, &reporter);
    if result.is_err() {
        let _ = fs::remove_file(output);
    }
    result
}

fn reconstruct(
    delta_root: &Path,
    work_root: &Path,
    output: &Path,
    reporter: &ProgressReporter,
) -> Result<ApplySummary> {
    let delta_entries: Vec<String> = util::walk_directory(delta_root)?
        .into_iter()
        .filter(|e| e.kind == EntryKind::File)
        .map(|e| e.relative_path)
        .collect();

    // a .bsdiff supersedes a legacy .diff for the same target
    let bsdiff_targets: HashSet<String> = delta_entries
        .iter()
        .filter(|r| layout::is_bsdiff(r))
        .map(|r| layout::canonical_path(r))
        .collect();

    // case-insensitive view of the working tree's lib files
    let mut work_index: HashMap<String, PathBuf> = HashMap::new();
    for entry in util::walk_directory(work_root)? {
        if entry.kind == EntryKind::File && layout::is_lib_path(&entry.relative_path) {
            work_index.insert(entry.relative_path.to_ascii_lowercase(), entry.full_path);
        }
    }

    let mut summary = ApplySummary::default();
    let mut visited: HashSet<String> = HashSet::new();

    for rel in &delta_entries {
        if !layout::is_lib_path(rel) || layout::is_shasum(rel) {
            continue;
        }
        let canonical = layout::canonical_path(rel);
        if layout::is_msdelta(rel) && bsdiff_targets.contains(&canonical) {
            debug!("superseded legacy patch skipped: {rel}");
            continue;
        }
        visited.insert(canonical.clone());

        let source = delta_root.join(rel);
        if layout::is_bsdiff(rel) || layout::is_msdelta(rel) {
            if fs::metadata(&source)?.len() == 0 {
                // empty marker: the base copy is already the right bytes
                debug!("unchanged: {}", layout::strip_patch_suffix(rel));
                summary.files_unchanged += 1;
                continue;
            }
            let target = work_index
                .get(&canonical)
                .cloned()
                .ok_or_else(|| Error::PatchFailed {
                    path: rel.clone(),
                    detail: "patch target missing from base package".into(),
                })?;
            apply_one_patch(delta_root, rel, &source, &target)?;
            summary.files_patched += 1;
        } else {
            // full payload carried in the delta
            let dest = match work_index.get(&canonical) {
                Some(existing) => existing.clone(),
                None => work_root.join(rel),
            };
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(&source, &dest)?;
            work_index.insert(canonical, dest);
            debug!("copied: {rel}");
            summary.files_copied += 1;
        }
    }
    reporter.report(PROGRESS_PATCHES_APPLIED);

    // anything under lib/ the delta never mentioned was removed from the release
    for entry in util::walk_directory(work_root)? {
        if entry.kind == EntryKind::File
            && layout::is_lib_path(&entry.relative_path)
            && !visited.contains(&entry.relative_path.to_ascii_lowercase())
        {
            debug!("deleting: {}", entry.relative_path);
            fs::remove_file(&entry.full_path)?;
            summary.files_deleted += 1;
        }
    }
    reporter.report(PROGRESS_DELETIONS_DONE);

    for rel in &delta_entries {
        if layout::is_lib_path(rel) {
            continue;
        }
        let dest = work_root.join(rel);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(delta_root.join(rel), &dest)?;
        summary.metadata_copied += 1;
    }

    archive::pack_archive(work_root, output)?;
    reporter.report(PROGRESS_REPACKED);

    info!(
        "delta applied: {} patched, {} copied, {} unchanged, {} deleted",
        summary.files_patched, summary.files_copied, summary.files_unchanged, summary.files_deleted
    );
    Ok(summary)
}

/// Applies one patch entry onto `target`: patch into a sibling tempfile,
/// verify against the `.shasum` record, then move into place. The working
/// tree never observes a partially written payload.
fn apply_one_patch(delta_root: &Path, rel: &str, patch_path: &Path, target: &Path) -> Result<()> {
    let dir = target.parent().unwrap_or(Path::new("."));
    let mut staged = NamedTempFile::new_in(dir)?;

    if layout::is_bsdiff(rel) {
        let old = util::read_payload(target)?;
        let patch = fs::read(patch_path)?;
        let new_bytes = codec::apply_bsdiff(&old, &patch).map_err(|e| Error::PatchFailed {
            path: rel.to_string(),
            detail: e.to_string(),
        })?;
        staged.write_all(&new_bytes)?;
        staged.flush()?;
    } else {
        codec::apply_msdelta(patch_path, target, staged.path())?;
    }

    verify_patched_file(delta_root, rel, staged.path())?;
    staged.persist(target).map_err(|e| Error::Io(e.error))?;
    debug!("patched: {}", layout::strip_patch_suffix(rel));
    Ok(())
}

/// A patched file only replaces the original if its size and SHA-1 match
/// the record shipped next to the patch. A missing or unreadable record
/// fails the same way as a mismatch.
fn verify_patched_file(delta_root: &Path, rel: &str, candidate: &Path) -> Result<()> {
    let failed = || Error::ChecksumFailed {
        path: layout::strip_patch_suffix(rel).to_string(),
    };

    let shasum_rel = layout::shasum_companion(rel);
    let recorded = fs::read_to_string(delta_root.join(&shasum_rel)).map_err(|_| failed())?;
    let expected = ReleaseEntry::parse(recorded.trim()).map_err(|_| failed())?;

    let actual = ReleaseEntry::from_file(candidate)?;
    if !actual.same_content(&expected) {
        return Err(failed());
    }
    Ok(())
}
