//! Uniform facade over the binary-diff algorithms.
//!
//! Patch payloads are opaque to the rest of the engine: `create` turns an
//! old/new byte pair into a patch, `apply` turns an old payload plus a
//! patch back into the new bytes, and nothing outside this module ever
//! inspects the format in between.

use std::io::{self, Cursor, Read};
use std::path::Path;

use bidiff::DiffParams;

use crate::error::{Error, Result};

// Leaves a core free for bookkeeping while the suffix sort runs.
const SORT_PARTITIONS: usize = 3;
// 128 KiB scan chunks balance core utilization against memory per diff.
const SCAN_CHUNK_SIZE: usize = 128 * 1024;

/// Patches compress well; the raw bidiff output is mostly copy runs.
const PATCH_COMPRESSION_LEVEL: i32 = 3;

/// Creates a bsdiff-style patch that rebuilds `new` from `old`.
/// Deterministic for a given input pair.
pub fn create_bsdiff(old: &[u8], new: &[u8]) -> Result<Vec<u8>> {
    let mut patch = Cursor::new(Vec::new());

    let diff_params = DiffParams::new(SORT_PARTITIONS, Some(SCAN_CHUNK_SIZE))
        .map_err(|e| invalid_patch(format!("failed to create diff params: {e}")))?;
    bidiff::simple_diff_with_params(old, new, &mut patch, &diff_params)
        .map_err(|e| invalid_patch(format!("failed to diff: {e}")))?;

    let compressed = zstd::bulk::compress(patch.get_ref(), PATCH_COMPRESSION_LEVEL)
        .map_err(|e| invalid_patch(format!("failed to compress patch: {e}")))?;
    Ok(compressed)
}

/// Rebuilds the new payload from `old` plus a patch produced by
/// [`create_bsdiff`].
pub fn apply_bsdiff(old: &[u8], patch: &[u8]) -> Result<Vec<u8>> {
    let raw = zstd::decode_all(patch)
        .map_err(|e| invalid_patch(format!("failed to decompress patch: {e}")))?;

    let mut reader = bipatch::Reader::new(Cursor::new(raw), Cursor::new(old))
        .map_err(|e| invalid_patch(format!("failed to open patch: {e}")))?;
    let mut new = Vec::new();
    reader
        .read_to_end(&mut new)
        .map_err(|e| invalid_patch(format!("failed to apply patch: {e}")))?;
    Ok(new)
}

fn invalid_patch(detail: String) -> Error {
    Error::Io(io::Error::new(io::ErrorKind::InvalidData, detail))
}

/// Applies a legacy msdelta patch via the OS-provided routine.
///
/// Only Windows ships that routine; this toolchain recognizes the payload
/// so old deltas fail with a clear error instead of a dispatch miss.
pub fn apply_msdelta(_patch: &Path, _old: &Path, _out: &Path) -> Result<()> {
    Err(Error::MsDeltaUnsupported)
}
