use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{Error, Result};

/// Accepts 1 to 4 numeric components with optional whitespace around the
/// dots, followed by an optional pre-release tag. The tag must start with
/// a letter.
static VERSION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^\s*(\d+)(?:\s*\.\s*(\d+))?(?:\s*\.\s*(\d+))?(?:\s*\.\s*(\d+))?\s*(?:-([a-z][0-9a-z-]*))?\s*$",
    )
    .expect("version grammar must compile")
});

/// Splits a pre-release tag into an alphabetic prefix plus a trailing
/// integer, e.g. `beta10` into `beta` and `10`.
static TAG_TAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)([a-z]+)([0-9]+)$").expect("tag grammar must compile"));

/// A loose semantic version: four numeric components plus an optional
/// pre-release tag.
///
/// Missing trailing components normalize to zero, so `1.2` and `1.2.0.0`
/// are equal and hash identically. The string the version was parsed from
/// is preserved for display only and never participates in comparison.
#[derive(Debug, Clone)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub build: u64,
    pub revision: u64,
    special: String,
    original: String,
}

impl Version {
    /// Parses a loose version string, accepting 1 to 4 numeric components.
    pub fn parse(input: &str) -> Result<Self> {
        Self::parse_inner(input, false)
    }

    /// Like [`Version::parse`], but requires exactly three numeric
    /// components before normalization.
    pub fn parse_strict(input: &str) -> Result<Self> {
        Self::parse_inner(input, true)
    }

    fn parse_inner(input: &str, strict: bool) -> Result<Self> {
        let caps = VERSION_RE
            .captures(input)
            .ok_or_else(|| Error::MalformedVersion(input.to_string()))?;

        let mut parts = [0u64; 4];
        let mut provided = 0usize;
        for (slot, part) in parts.iter_mut().enumerate() {
            if let Some(m) = caps.get(slot + 1) {
                *part = m
                    .as_str()
                    .parse()
                    .map_err(|_| Error::MalformedVersion(input.to_string()))?;
                provided += 1;
            }
        }
        if strict && provided != 3 {
            return Err(Error::MalformedVersion(input.to_string()));
        }

        let special = caps.get(5).map(|m| m.as_str().to_string()).unwrap_or_default();

        Ok(Self {
            major: parts[0],
            minor: parts[1],
            build: parts[2],
            revision: parts[3],
            special,
            original: input.trim().to_string(),
        })
    }

    /// Builds a version from its four numeric components, with a canonical
    /// display form.
    pub fn new(major: u64, minor: u64, build: u64, revision: u64) -> Self {
        Self {
            major,
            minor,
            build,
            revision,
            special: String::new(),
            original: format!("{major}.{minor}.{build}.{revision}"),
        }
    }

    /// The pre-release tag, empty for a full release.
    pub fn special(&self) -> &str {
        &self.special
    }

    /// The trimmed string this version was parsed from.
    pub fn original(&self) -> &str {
        &self.original
    }
}

impl FromStr for Version {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.original)
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.major == other.major
            && self.minor == other.minor
            && self.build == other.build
            && self.revision == other.revision
            && self.special.eq_ignore_ascii_case(&other.special)
    }
}

impl Eq for Version {}

impl Hash for Version {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (self.major, self.minor, self.build, self.revision).hash(state);
        self.special.to_ascii_lowercase().hash(state);
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let lhs = (self.major, self.minor, self.build, self.revision);
        let rhs = (other.major, other.minor, other.build, other.revision);
        match lhs.cmp(&rhs) {
            Ordering::Equal => cmp_special(&self.special, &other.special),
            ord => ord,
        }
    }
}

/// Pre-release ordering: a tagless version outranks a tagged one; tags
/// with the same alphabetic prefix order by their trailing integer;
/// anything else falls back to a case-insensitive ordinal compare.
fn cmp_special(a: &str, b: &str) -> Ordering {
    match (a.is_empty(), b.is_empty()) {
        (true, true) => return Ordering::Equal,
        (true, false) => return Ordering::Greater,
        (false, true) => return Ordering::Less,
        (false, false) => {}
    }

    if let (Some(ca), Some(cb)) = (TAG_TAIL_RE.captures(a), TAG_TAIL_RE.captures(b)) {
        let (prefix_a, tail_a) = (&ca[1], &ca[2]);
        let (prefix_b, tail_b) = (&cb[1], &cb[2]);
        if prefix_a.eq_ignore_ascii_case(prefix_b) {
            if let (Ok(na), Ok(nb)) = (tail_a.parse::<u64>(), tail_b.parse::<u64>()) {
                return na.cmp(&nb);
            }
        }
    }

    a.to_ascii_lowercase().cmp(&b.to_ascii_lowercase())
}
