//! Delta package construction.
//!
//! Both packages are expanded into scratch trees, every `lib/` file in
//! the new tree is classified against the base tree, and the new tree
//! (payloads swapped for patch sidecars where possible) is repacked as
//! the delta archive. Metadata outside `lib/` rides along verbatim.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use rayon::prelude::*;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::archive;
use crate::codec;
use crate::error::{Error, Result};
use crate::layout::{self, FileClass};
use crate::progress::{BuildCounters, BuildStats};
use crate::release_entry::ReleaseEntry;
use crate::util::{self, EntryKind};

const RETRY_ATTEMPTS: u32 = 3;
const RETRY_BACKOFF: Duration = Duration::from_millis(250);
const PROGRESS_POLL_INTERVAL: Duration = Duration::from_secs(2);
const MAX_WORKERS: usize = 8;

/// Builds a delta package at `output` carrying the differences between
/// `base_pkg` and `new_pkg`.
///
/// The base version (from the package file name) must not exceed the new
/// one, and `output` must not exist yet. Per-file diffing runs on a
/// bounded worker pool; a poller logs the counters every couple of
/// seconds while work is in flight.
pub async fn build_delta(base_pkg: &Path, new_pkg: &Path, output: &Path) -> Result<BuildStats> {
    for input in [base_pkg, new_pkg] {
        if !input.is_file() {
            return Err(Error::MissingInput(input.to_path_buf()));
        }
    }
    if output.exists() {
        return Err(Error::OutputExists(output.to_path_buf()));
    }

    let base_version = layout::package_version(base_pkg)?;
    let new_version = layout::package_version(new_pkg)?;
    if base_version > new_version {
        return Err(Error::NonMonotonicVersion {
            base: base_version.to_string(),
            new: new_version.to_string(),
        });
    }
    info!("building delta {base_version} -> {new_version}");

    let counters = Arc::new(BuildCounters::default());
    let (done_tx, done_rx) = watch::channel(false);
    let poller = tokio::spawn(poll_progress(Arc::clone(&counters), done_rx));

    let result = {
        let base_pkg = base_pkg.to_path_buf();
        let new_pkg = new_pkg.to_path_buf();
        let output = output.to_path_buf();
        let counters = Arc::clone(&counters);
        tokio::task::spawn_blocking(move || {
            build_delta_blocking(&base_pkg, &new_pkg, &output, &counters)
        })
        .await
    };

    let _ = done_tx.send(true);
    let _ = poller.await;

    match result {
        Ok(inner) => inner,
        Err(join_err) => Err(Error::TaskFailed(join_err.to_string())),
    }
}

/// Wakes every couple of seconds and logs one counter line, but only when
/// work actually advanced since the previous emission. Exits as soon as
/// the builder signals completion rather than waiting out a pending tick.
async fn poll_progress(counters: Arc<BuildCounters>, mut done: watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(PROGRESS_POLL_INTERVAL);
    let mut last_processed = 0;
    loop {
        tokio::select! {
            _ = interval.tick() => {
                let stats = counters.snapshot();
                if stats.processed != last_processed {
                    info!(
                        "processed {} files ({} added, {} changed, {} unchanged, {} warnings)",
                        stats.processed, stats.added, stats.changed, stats.unchanged, stats.warnings
                    );
                    last_processed = stats.processed;
                }
            }
            _ = done.changed() => break,
        }
    }
}

fn build_delta_blocking(
    base_pkg: &Path,
    new_pkg: &Path,
    output: &Path,
    counters: &BuildCounters,
) -> Result<BuildStats> {
    // Scratch trees are dropped on every exit path, including panics.
    let base_scratch = tempfile::tempdir()?;
    let new_scratch = tempfile::tempdir()?;
    archive::extract_archive(base_pkg, base_scratch.path())?;
    archive::extract_archive(new_pkg, new_scratch.path())?;

    let result = diff_trees(base_scratch.path(), new_scratch.path(), output, counters);
    if result.is_err() {
        // never leave a half-written delta behind
        let _ = fs::remove_file(output);
    }
    result
}

fn diff_trees(
    base_root: &Path,
    new_root: &Path,
    output: &Path,
    counters: &BuildCounters,
) -> Result<BuildStats> {
    // Case-insensitive index of the base tree's lib files. Workers look
    // entries up concurrently and retire them with an atomic remove;
    // whatever is left at the end is the removed set.
    let base_index: DashMap<String, PathBuf> = DashMap::new();
    for entry in util::walk_directory(base_root)? {
        if entry.kind == EntryKind::File && layout::is_lib_path(&entry.relative_path) {
            base_index.insert(entry.relative_path.to_ascii_lowercase(), entry.full_path);
        }
    }

    let work: Vec<util::DirEntry> = util::walk_directory(new_root)?
        .into_iter()
        .filter(|e| e.kind == EntryKind::File && layout::is_lib_path(&e.relative_path))
        .collect();

    let workers = worker_count();
    debug!("diffing {} lib files across {} workers", work.len(), workers);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build()
        .map_err(|e| Error::TaskFailed(e.to_string()))?;

    pool.install(|| {
        work.par_iter().try_for_each(|entry| {
            util::with_retries(RETRY_ATTEMPTS, RETRY_BACKOFF, || {
                process_file(entry, &base_index, counters)
            })
        })
    })?;

    counters
        .removed
        .store(base_index.len() as u64, Ordering::Relaxed);
    for stale in base_index.iter() {
        debug!("removed from release: {}", stale.key());
    }

    layout::declare_delta_extensions(new_root)?;
    archive::pack_archive(new_root, output)?;

    let stats = counters.snapshot();
    info!(
        "delta built: {} processed, {} added, {} changed, {} unchanged, {} removed",
        stats.processed, stats.added, stats.changed, stats.unchanged, stats.removed
    );
    Ok(stats)
}

fn worker_count() -> usize {
    num_cpus::get().saturating_sub(1).clamp(1, MAX_WORKERS)
}

/// One worker invocation: classify a single new-tree file and emit its
/// sidecars. On failure the partial sidecars are removed before the error
/// reaches the retry wrapper.
fn process_file(
    entry: &util::DirEntry,
    base_index: &DashMap<String, PathBuf>,
    counters: &BuildCounters,
) -> Result<()> {
    match classify_and_emit(entry, base_index) {
        Ok(class) => {
            let counter = match class {
                FileClass::Added => &counters.added,
                FileClass::Changed => &counters.changed,
                FileClass::Unchanged => &counters.unchanged,
            };
            counter.fetch_add(1, Ordering::Relaxed);
            counters.processed.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }
        Err(err) => {
            remove_partial_sidecars(&entry.full_path);
            counters.warnings.fetch_add(1, Ordering::Relaxed);
            warn!("failed to process {}: {err}", entry.relative_path);
            Err(err)
        }
    }
}

fn classify_and_emit(
    entry: &util::DirEntry,
    base_index: &DashMap<String, PathBuf>,
) -> Result<FileClass> {
    let key = entry.relative_path.to_ascii_lowercase();
    let base_path = match base_index.get(&key) {
        Some(hit) => hit.value().clone(),
        None => {
            debug!("added: {}", entry.relative_path);
            return Ok(FileClass::Added);
        }
    };

    // The mappings are dropped before the source file is deleted.
    let class = {
        let old = util::read_payload(&base_path)?;
        let new = util::read_payload(&entry.full_path)?;
        if *old == *new {
            debug!("unchanged: {}", entry.relative_path);
            write_unchanged_markers(&entry.full_path)?;
            FileClass::Unchanged
        } else {
            debug!("changed: {}", entry.relative_path);
            write_patch_sidecars(entry, &old, &new)?;
            FileClass::Changed
        }
    };

    // sidecars first, then the payload, then the index entry
    fs::remove_file(&entry.full_path)?;
    base_index.remove(&key);
    Ok(class)
}

/// Byte-identical files leave a pair of empty markers so the applier
/// keeps the base copy in place.
fn write_unchanged_markers(target: &Path) -> Result<()> {
    fs::write(layout::sidecar_path(target, layout::MSDELTA_SUFFIX), "")?;
    fs::write(layout::sidecar_path(target, layout::SHASUM_SUFFIX), "")?;
    Ok(())
}

fn write_patch_sidecars(entry: &util::DirEntry, old: &[u8], new: &[u8]) -> Result<()> {
    let patch = codec::create_bsdiff(old, new).map_err(|e| Error::PatchFailed {
        path: entry.relative_path.clone(),
        detail: e.to_string(),
    })?;
    fs::write(
        layout::sidecar_path(&entry.full_path, layout::BSDIFF_SUFFIX),
        &patch,
    )?;

    let label = entry
        .relative_path
        .rsplit('/')
        .next()
        .unwrap_or(&entry.relative_path);
    let shasum = ReleaseEntry::from_bytes(new, label);
    fs::write(
        layout::sidecar_path(&entry.full_path, layout::SHASUM_SUFFIX),
        shasum.to_string(),
    )?;
    Ok(())
}

fn remove_partial_sidecars(target: &Path) {
    for suffix in [
        layout::BSDIFF_SUFFIX,
        layout::MSDELTA_SUFFIX,
        layout::SHASUM_SUFFIX,
    ] {
        let _ = fs::remove_file(layout::sidecar_path(target, suffix));
    }
}
