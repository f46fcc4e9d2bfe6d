//! Naming and layout conventions inside a delta archive.
//!
//! Files under `lib/` encode per-file operations through suffixes: a plain
//! entry is a new file carried in full, `.bsdiff` and `.diff` are patch
//! payloads, and `.shasum` holds the identity record of the patched
//! result. Everything outside `lib/` travels verbatim.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::version::Version;

pub const LIB_PREFIX: &str = "lib";
pub const BSDIFF_SUFFIX: &str = ".bsdiff";
pub const MSDELTA_SUFFIX: &str = ".diff";
pub const SHASUM_SUFFIX: &str = ".shasum";

/// Open-packaging content-type manifest carried at the archive root.
pub const CONTENT_TYPES_FILE: &str = "[Content_Types].xml";

const FULL_PACKAGE_MARKER: &str = "-full";
const DELTA_PACKAGE_MARKER: &str = "-delta";

/// How a file in the new tree relates to the base tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileClass {
    Added,
    Unchanged,
    Changed,
}

/// True for files below the `lib/` root. The prefix segment is matched
/// case-insensitively; a root-level file literally named `lib` does not
/// qualify.
pub fn is_lib_path(rel: &str) -> bool {
    match rel.split_once('/') {
        Some((first, rest)) => first.eq_ignore_ascii_case(LIB_PREFIX) && !rest.is_empty(),
        None => false,
    }
}

pub fn is_bsdiff(rel: &str) -> bool {
    ends_with_ignore_case(rel, BSDIFF_SUFFIX)
}

pub fn is_msdelta(rel: &str) -> bool {
    ends_with_ignore_case(rel, MSDELTA_SUFFIX)
}

pub fn is_shasum(rel: &str) -> bool {
    ends_with_ignore_case(rel, SHASUM_SUFFIX)
}

/// Strips a `.bsdiff` or `.diff` patch suffix, preserving case.
pub fn strip_patch_suffix(rel: &str) -> &str {
    strip_ignore_case(rel, BSDIFF_SUFFIX)
        .or_else(|| strip_ignore_case(rel, MSDELTA_SUFFIX))
        .unwrap_or(rel)
}

/// The lowercased, suffix-stripped form used to match delta entries
/// against working-tree files.
pub fn canonical_path(rel: &str) -> String {
    strip_patch_suffix(rel).to_ascii_lowercase()
}

/// The `.shasum` companion for a patch entry, preserving the entry's case.
pub fn shasum_companion(rel: &str) -> String {
    format!("{}{}", strip_patch_suffix(rel), SHASUM_SUFFIX)
}

/// A sidecar path next to `target`: the same file name with `suffix`
/// appended.
pub fn sidecar_path(target: &Path, suffix: &str) -> PathBuf {
    let mut name = target.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

/// Extracts the package version from an archive file name such as
/// `MyApp-1.2.3-full.zip`: the extension and a trailing `-full`/`-delta`
/// marker are dropped, then the first `-`-boundary suffix that parses
/// under the loose grammar wins.
pub fn package_version(path: &Path) -> Result<Version> {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| Error::MalformedVersion(path.display().to_string()))?;
    let stem = stem
        .strip_suffix(FULL_PACKAGE_MARKER)
        .or_else(|| stem.strip_suffix(DELTA_PACKAGE_MARKER))
        .unwrap_or(stem);

    for (idx, _) in stem.match_indices('-') {
        if let Ok(version) = Version::parse(&stem[idx + 1..]) {
            return Ok(version);
        }
    }
    Err(Error::MalformedVersion(stem.to_string()))
}

/// Declares the delta sidecar extensions in the tree's content-type
/// manifest, when one is present. Already-declared extensions are left
/// alone.
pub fn declare_delta_extensions(root: &Path) -> Result<()> {
    let manifest = root.join(CONTENT_TYPES_FILE);
    if !manifest.is_file() {
        return Ok(());
    }

    let mut text = fs::read_to_string(&manifest)?;
    let mut changed = false;
    for ext in ["bsdiff", "diff", "shasum"] {
        if text.contains(&format!("Extension=\"{ext}\"")) {
            continue;
        }
        let declaration =
            format!("<Default Extension=\"{ext}\" ContentType=\"application/octet-stream\" />");
        if let Some(idx) = text.rfind("</Types>") {
            text.insert_str(idx, &declaration);
            changed = true;
        }
    }
    if changed {
        fs::write(&manifest, text)?;
    }
    Ok(())
}

fn ends_with_ignore_case(s: &str, suffix: &str) -> bool {
    s.len() >= suffix.len()
        && s.get(s.len() - suffix.len()..)
            .map_or(false, |tail| tail.eq_ignore_ascii_case(suffix))
}

fn strip_ignore_case<'a>(s: &'a str, suffix: &str) -> Option<&'a str> {
    if ends_with_ignore_case(s, suffix) {
        Some(&s[..s.len() - suffix.len()])
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lib_prefix_matching() {
        assert!(is_lib_path("lib/x.dll"));
        assert!(is_lib_path("LIB/sub/x.dll"));
        assert!(is_lib_path("Lib/x.dll.bsdiff"));
        assert!(!is_lib_path("lib"));
        assert!(!is_lib_path("library/x.dll"));
        assert!(!is_lib_path("other/lib/x.dll"));
    }

    #[test]
    fn test_suffix_classification() {
        assert!(is_bsdiff("lib/x.dll.bsdiff"));
        assert!(is_msdelta("lib/x.dll.diff"));
        assert!(is_shasum("lib/x.dll.shasum"));
        assert!(!is_bsdiff("lib/x.dll"));
        assert!(!is_msdelta("lib/x.dll.bsdiff"));
    }

    #[test]
    fn test_canonical_path_strips_one_suffix() {
        assert_eq!(canonical_path("lib/X.dll.bsdiff"), "lib/x.dll");
        assert_eq!(canonical_path("lib/X.dll.diff"), "lib/x.dll");
        assert_eq!(canonical_path("lib/X.dll"), "lib/x.dll");
        // only the patch suffix comes off
        assert_eq!(canonical_path("lib/x.dll.bsdiff.bsdiff"), "lib/x.dll.bsdiff");
    }

    #[test]
    fn test_shasum_companion() {
        assert_eq!(shasum_companion("lib/X.dll.bsdiff"), "lib/X.dll.shasum");
        assert_eq!(shasum_companion("lib/X.dll.diff"), "lib/X.dll.shasum");
    }

    #[test]
    fn test_sidecar_path() {
        assert_eq!(
            sidecar_path(Path::new("/tmp/work/lib/x.dll"), BSDIFF_SUFFIX),
            Path::new("/tmp/work/lib/x.dll.bsdiff")
        );
    }

    #[test]
    fn test_package_version_from_name() {
        let version = package_version(Path::new("MyApp-1.2.3-full.zip")).unwrap();
        assert_eq!(version, Version::parse("1.2.3").unwrap());

        let version = package_version(Path::new("My-App-2.0.1-beta2-delta.zip")).unwrap();
        assert_eq!(version, Version::parse("2.0.1-beta2").unwrap());

        let version = package_version(Path::new("/some/dir/App-0.9.zip")).unwrap();
        assert_eq!(version, Version::parse("0.9").unwrap());

        assert!(package_version(Path::new("NoVersionHere.zip")).is_err());
    }

    #[test]
    fn test_declare_delta_extensions() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join(CONTENT_TYPES_FILE);
        fs::write(
            &manifest,
            "<?xml version=\"1.0\"?><Types><Default Extension=\"dll\" ContentType=\"application/octet-stream\" /></Types>",
        )
        .unwrap();

        declare_delta_extensions(dir.path()).unwrap();
        let text = fs::read_to_string(&manifest).unwrap();
        for ext in ["bsdiff", "diff", "shasum", "dll"] {
            assert!(text.contains(&format!("Extension=\"{ext}\"")), "missing {ext}");
        }

        // a second pass must not duplicate declarations
        declare_delta_extensions(dir.path()).unwrap();
        let again = fs::read_to_string(&manifest).unwrap();
        assert_eq!(again.matches("Extension=\"bsdiff\"").count(), 1);
    }

    #[test]
    fn test_declare_without_manifest_is_a_noop() {
        let dir = tempfile::tempdir().unwrap();
        declare_delta_extensions(dir.path()).unwrap();
    }
}
