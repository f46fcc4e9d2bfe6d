use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The input did not match the loose version grammar.
    #[error("malformed version string {0:?}")]
    MalformedVersion(String),
    /// A release entry line did not have the `SHA1 FILENAME SIZE` shape.
    #[error("malformed release entry {0:?}")]
    MalformedEntry(String),
    /// Deltas only go forward: the base package must not be newer than the target.
    #[error("base package {base} is newer than target package {new}")]
    NonMonotonicVersion { base: String, new: String },
    #[error("input package not found: {0}")]
    MissingInput(PathBuf),
    /// Existing outputs are never overwritten.
    #[error("output path already exists: {0}")]
    OutputExists(PathBuf),
    /// Creating or applying a per-file patch failed.
    #[error("failed to patch {path}: {detail}")]
    PatchFailed { path: String, detail: String },
    /// A reconstructed file did not match its recorded identity.
    #[error("checksum mismatch for {path}")]
    ChecksumFailed { path: String },
    #[error("msdelta patches require the OS-provided codec, which is unavailable on this platform")]
    MsDeltaUnsupported,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("archive error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("directory walk error: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("background task failed: {0}")]
    TaskFailed(String),
}

pub type Result<T> = std::result::Result<T, Error>;
