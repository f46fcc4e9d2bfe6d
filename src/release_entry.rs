use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use sha1::{Digest, Sha1};

use crate::error::{Error, Result};

/// A file's identity record: name, size in bytes, and uppercase-hex SHA-1.
///
/// Serialized as a single whitespace-separated line, `SHA1 FILENAME SIZE`,
/// the form carried in `.shasum` sidecars and release listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseEntry {
    pub filename: String,
    pub size: u64,
    pub sha1: String,
}

impl ReleaseEntry {
    /// Hashes a byte stream to completion.
    /// Reads through a large buffer to keep syscall overhead down on big payloads.
    pub fn from_reader(mut reader: impl Read, filename: &str) -> Result<Self> {
        let mut hasher = Sha1::new();
        let mut buf = vec![0u8; 256 * 1024];
        let mut size = 0u64;
        loop {
            let n = reader.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
            size += n as u64;
        }
        Ok(Self {
            filename: filename.to_string(),
            size,
            sha1: to_hex_upper(&hasher.finalize()),
        })
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::MalformedEntry(path.display().to_string()))?
            .to_string();
        let file = File::open(path)?;
        Self::from_reader(BufReader::with_capacity(256 * 1024, file), &filename)
    }

    pub fn from_bytes(bytes: &[u8], filename: &str) -> Self {
        Self {
            filename: filename.to_string(),
            size: bytes.len() as u64,
            sha1: to_hex_upper(&Sha1::digest(bytes)),
        }
    }

    /// Parses the one-line serialized form. The SHA-1 field must be 40 hex
    /// digits and the size a decimal integer; anything else is rejected.
    pub fn parse(line: &str) -> Result<Self> {
        let malformed = || Error::MalformedEntry(line.to_string());

        let mut fields = line.split_whitespace();
        let (sha1, filename, size) = match (fields.next(), fields.next(), fields.next(), fields.next())
        {
            (Some(sha1), Some(filename), Some(size), None) => (sha1, filename, size),
            _ => return Err(malformed()),
        };

        if sha1.len() != 40 || !sha1.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(malformed());
        }
        let size = size.parse().map_err(|_| malformed())?;

        Ok(Self {
            filename: filename.to_string(),
            size,
            sha1: sha1.to_ascii_uppercase(),
        })
    }

    /// True when `other` records the same payload bytes, regardless of name.
    pub fn same_content(&self, other: &ReleaseEntry) -> bool {
        self.size == other.size && self.sha1.eq_ignore_ascii_case(&other.sha1)
    }
}

impl fmt::Display for ReleaseEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.sha1, self.filename, self.size)
    }
}

fn to_hex_upper(digest: &[u8]) -> String {
    digest.iter().map(|b| format!("{b:02X}")).collect()
}
