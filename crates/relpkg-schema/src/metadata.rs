//! Per-build package metadata.
//!
//! A [`Metadata`] value describes one package instance (one source, one
//! architecture, one target). It starts from defaults bound to a fresh
//! scratch directory, gets the packager from the global config, is replaced
//! wholesale by whichever resolver strategy runs, and is then only read by
//! the builder and the templates.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::TagVersion;

/// One `%changelog`-style entry: an author/date label and its text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangelogEntry {
    /// Author and date line, e.g. `Thu Jun 17 2021 Jane <jane@example.com>`.
    pub label: String,
    /// Free-text entry.
    pub text: String,
}

impl ChangelogEntry {
    /// Create an entry.
    pub fn new(label: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            text: text.into(),
        }
    }
}

/// Everything a packaging template needs to know about one package.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    /// Logical package name.
    pub name: String,
    /// One-line summary.
    pub summary: String,
    /// Architecture. Holds the translated (upstream) identifier while
    /// resolving and the packaging identifier while building.
    pub arch: String,
    /// Upstream version, already normalised.
    pub version: String,
    /// Secondary version counter (build number).
    pub release: String,
    /// Project homepage.
    pub url: String,
    /// Package group.
    pub group: String,
    /// License identifier.
    pub license: String,
    /// `Name <email>` list of the maintainers.
    pub packager: String,
    /// Runtime requirements.
    pub requires: Vec<String>,
    /// Upstream creation time, used as the reproducible build timestamp.
    pub created_at: DateTime<Utc>,
    /// Scratch directory owned by this build iteration.
    pub buildroot: PathBuf,
    /// Long description.
    pub description: String,
    /// Install destination of the packaged files.
    pub destination: String,
    /// Changelog, newest first.
    pub changelog: Vec<ChangelogEntry>,
}

impl Metadata {
    /// Defaults bound to a fresh scratch directory.
    pub fn new(buildroot: impl Into<PathBuf>) -> Self {
        let created_at = Utc::now();
        Self {
            name: "example".to_string(),
            summary: "Example summary".to_string(),
            arch: std::env::consts::ARCH.to_string(),
            version: "0.0.1".to_string(),
            release: "0".to_string(),
            url: "https://example.com".to_string(),
            group: "System".to_string(),
            license: "unknown".to_string(),
            packager: "Example Team".to_string(),
            requires: vec!["bash".to_string()],
            created_at,
            buildroot: buildroot.into(),
            description: "Example description".to_string(),
            destination: "/usr/bin".to_string(),
            changelog: vec![ChangelogEntry::new(
                format!("{} Example Team", changelog_date(&created_at)),
                "initial package",
            )],
        }
    }

    /// Replace the packager string.
    pub fn with_packager(mut self, packager: impl Into<String>) -> Self {
        self.packager = packager.into();
        self
    }

    /// Replace the architecture.
    pub fn with_arch(mut self, arch: impl Into<String>) -> Self {
        self.arch = arch.into();
        self
    }

    /// Apply a normalised tag. The release keeps its current value when the
    /// tag carries none.
    pub fn with_tag(mut self, tag: TagVersion) -> Self {
        self.version = tag.version;
        if let Some(release) = tag.release {
            self.release = release;
        }
        self
    }

    /// Seconds since the epoch of [`Metadata::created_at`], the value handed
    /// to packaging tools as `SOURCE_DATE_EPOCH`.
    pub fn source_date_epoch(&self) -> i64 {
        self.created_at.timestamp()
    }

    /// Directory that resolved artifacts are written to.
    pub fn sources_dir(&self) -> PathBuf {
        self.buildroot.join("SOURCES")
    }

    /// Scratch directory of this iteration.
    pub fn buildroot(&self) -> &Path {
        &self.buildroot
    }
}

/// Date in the `Thu Jun 17 2021` form packaging changelogs expect.
pub fn changelog_date(at: &DateTime<Utc>) -> String {
    at.format("%a %b %d %Y").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize_tag;

    #[test]
    fn test_defaults() {
        let m = Metadata::new("/tmp/x");
        assert_eq!(m.release, "0");
        assert_eq!(m.group, "System");
        assert_eq!(m.destination, "/usr/bin");
        assert_eq!(m.requires, vec!["bash"]);
        assert_eq!(m.changelog.len(), 1);
        assert_eq!(m.sources_dir(), PathBuf::from("/tmp/x/SOURCES"));
    }

    #[test]
    fn test_tag_without_release_keeps_default() {
        let m = Metadata::new("/tmp/x").with_tag(normalize_tag("v1.4.0"));
        assert_eq!(m.version, "1.4.0");
        assert_eq!(m.release, "0");
    }

    #[test]
    fn test_tag_with_release() {
        let m = Metadata::new("/tmp/x").with_tag(normalize_tag("v1.4.0-3"));
        assert_eq!(m.version, "1.4.0");
        assert_eq!(m.release, "3");
    }

    #[test]
    fn test_source_date_epoch() {
        let mut m = Metadata::new("/tmp/x");
        m.created_at = DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(m.source_date_epoch(), 1_714_564_800);
        assert_eq!(changelog_date(&m.created_at), "Wed May 01 2024");
    }
}
