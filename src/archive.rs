//! Zip container plumbing: expanding a package into a scratch tree and
//! repacking a tree into a package.

use std::fs::{self, File};
use std::io;
use std::path::Path;

use tracing::debug;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::Result;
use crate::util::{self, EntryKind};

/// Expands `archive` into `dest`. Entries whose names escape the
/// destination (absolute paths, `..` traversal) are skipped.
pub fn extract_archive(archive: &Path, dest: &Path) -> Result<()> {
    let file = File::open(archive)?;
    let mut zip = ZipArchive::new(file)?;

    for i in 0..zip.len() {
        let mut entry = zip.by_index(i)?;
        let rel = match entry.enclosed_name() {
            Some(p) => p.to_owned(),
            None => {
                debug!("skipping unsafe archive entry: {}", entry.name());
                continue;
            }
        };

        let dest_path = dest.join(&rel);
        if entry.is_dir() {
            fs::create_dir_all(&dest_path)?;
            continue;
        }
        if let Some(parent) = dest_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&dest_path)?;
        io::copy(&mut entry, &mut out)?;
    }
    Ok(())
}

/// Packs the tree under `src` into a new zip at `archive`. Entries are
/// written in sorted order with forward-slash names, so repacking the
/// same tree yields the same listing.
pub fn pack_archive(src: &Path, archive: &Path) -> Result<()> {
    let out = File::create(archive)?;
    let mut zip = ZipWriter::new(out);
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    for entry in util::walk_directory(src)? {
        match entry.kind {
            EntryKind::Dir => {
                zip.add_directory(entry.relative_path.as_str(), options)?;
            }
            EntryKind::File => {
                zip.start_file(entry.relative_path.as_str(), options)?;
                let mut file = File::open(&entry.full_path)?;
                io::copy(&mut file, &mut zip)?;
            }
        }
    }
    zip.finish()?;
    Ok(())
}
