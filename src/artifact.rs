//! Artifact file name matching.
//!
//! An artifact is a container image archive named `<name>-<version>.tar`,
//! for example `alpine-3.16.tar`. The name may contain letters, digits,
//! hyphens and underscores; the version is one or more decimal groups
//! separated by dots.

use std::fmt;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;

/// Extension of the archives produced by `docker save`.
pub const ARTIFACT_EXTENSION: &str = "tar";

static ARTIFACT_PATTERN: OnceLock<Regex> = OnceLock::new();

fn artifact_pattern() -> &'static Regex {
    ARTIFACT_PATTERN.get_or_init(|| {
        Regex::new(r"^([A-Za-z0-9_-]+)-([0-9]+(?:\.[0-9]+)*)\.tar$")
            .expect("artifact pattern is a valid regex")
    })
}

/// Logical image name and version tag parsed from an archive file name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtifactIdentity {
    name: String,
    version: String,
}

impl ArtifactIdentity {
    /// Logical image name, e.g. `alpine`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Version tag, e.g. `3.16`.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Fully-qualified image reference `name:version`.
    pub fn reference(&self) -> String {
        format!("{}:{}", self.name, self.version)
    }
}

impl fmt::Display for ArtifactIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.version)
    }
}

/// Parse an archive file name. Anything outside the grammar yields `None`.
pub fn identify(file_name: &str) -> Option<ArtifactIdentity> {
    let captures = artifact_pattern().captures(file_name)?;
    Some(ArtifactIdentity {
        name: captures[1].to_string(),
        version: captures[2].to_string(),
    })
}

/// Parse the final component of a path.
pub fn identify_path(path: &Path) -> Option<ArtifactIdentity> {
    path.file_name()
        .and_then(|name| name.to_str())
        .and_then(identify)
}

/// Whether the path carries the archive extension, regardless of the name.
///
/// Used to tell "not an archive at all" apart from "an archive with a name we
/// cannot parse" when logging skipped files.
pub fn has_artifact_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext == ARTIFACT_EXTENSION)
}
