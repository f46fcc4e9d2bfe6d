use std::io;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use memmap2::Mmap;
use tracing::warn;
use walkdir::WalkDir;

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
}

#[derive(Debug, Clone)]
pub struct DirEntry {
    pub relative_path: String,
    pub kind: EntryKind,
    pub full_path: PathBuf,
    /// File size in bytes (0 for directories). Free from the OS directory scan.
    pub size: u64,
}

/// Walk a directory tree and collect all entries with relative paths.
/// Paths use forward slashes so archive listings look the same on every
/// platform; entries come back in sorted order.
pub fn walk_directory(root: &Path) -> Result<Vec<DirEntry>> {
    let root = root.canonicalize()?;

    let mut entries = Vec::new();

    for entry in WalkDir::new(&root).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(io::Error::from)?;

        let full_path = entry.path().to_path_buf();
        let relative = full_path
            .strip_prefix(&root)
            .map_err(|_| Error::TaskFailed(format!("path escapes {}", root.display())))?;

        let relative_str = relative
            .to_str()
            .ok_or_else(|| Error::TaskFailed(format!("non-UTF8 path: {}", relative.display())))?
            .replace('\\', "/");

        let kind = if entry.file_type().is_dir() {
            EntryKind::Dir
        } else {
            EntryKind::File
        };

        let meta = entry.metadata()?;
        let size = if kind == EntryKind::File { meta.len() } else { 0 };

        entries.push(DirEntry {
            relative_path: relative_str,
            kind,
            full_path,
            size,
        });
    }

    Ok(entries)
}

/// Memory-map a file for read-only access.
///
/// # Safety
/// The mapping is read-only. Callers must not concurrently truncate or replace
/// the underlying file while the `Mmap` is live.
pub fn mmap_file(path: &Path) -> Result<Mmap> {
    let file = std::fs::File::open(path)?;
    // SAFETY: We only read from this mapping; no concurrent modification of these files.
    unsafe { Mmap::map(&file).map_err(Error::Io) }
}

/// Read-only view of a file's bytes. Zero-length files skip the mmap,
/// which fails for empty mappings on some platforms.
pub enum Payload {
    Mapped(Mmap),
    Inline(Vec<u8>),
}

impl Deref for Payload {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            Payload::Mapped(map) => map,
            Payload::Inline(bytes) => bytes,
        }
    }
}

pub fn read_payload(path: &Path) -> Result<Payload> {
    let meta = std::fs::metadata(path)?;
    if meta.len() == 0 {
        return Ok(Payload::Inline(Vec::new()));
    }
    Ok(Payload::Mapped(mmap_file(path)?))
}

/// Run `op` up to `attempts` times, sleeping `backoff` between failures.
/// The final error is returned untouched; intermediate ones are logged.
pub fn with_retries<T>(
    attempts: u32,
    backoff: Duration,
    mut op: impl FnMut() -> Result<T>,
) -> Result<T> {
    let mut attempt = 1;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(err) if attempt < attempts => {
                warn!("attempt {attempt} failed, retrying: {err}");
                thread::sleep(backoff);
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
