//! What a repository already contains.
//!
//! A [`RepoSnapshot`] is taken once per target before any resolution
//! starts. Resolvers consult it through [`BuiltIndex`] to skip releases
//! whose package is already published, without touching the directory
//! that the same run is about to write into.

use std::collections::HashSet;
use std::path::Path;

/// Read-only view of already published package files.
pub trait BuiltIndex: Send + Sync {
    /// Whether a package file with exactly this name is published.
    fn contains(&self, file_name: &str) -> bool;
}

/// File names present in a repository directory at one point in time.
#[derive(Debug, Clone, Default)]
pub struct RepoSnapshot {
    files: HashSet<String>,
}

impl RepoSnapshot {
    /// Record every file in `dir` ending in `.{extension}`. A missing
    /// directory yields an empty snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if `dir` exists but cannot be listed.
    pub fn scan(dir: &Path, extension: &str) -> std::io::Result<Self> {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(e),
        };

        let mut files = HashSet::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if Path::new(&name).extension().is_some_and(|ext| ext == extension) {
                files.insert(name);
            }
        }
        tracing::debug!("{} packages already in {}", files.len(), dir.display());
        Ok(Self { files })
    }

    /// Snapshot from an explicit list of names.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            files: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Number of recorded files.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether nothing is published yet.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl BuiltIndex for RepoSnapshot {
    fn contains(&self, file_name: &str) -> bool {
        self.files.contains(file_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = RepoSnapshot::scan(&dir.path().join("rpm"), "rpm").unwrap();
        assert!(snapshot.is_empty());
    }

    #[test]
    fn test_scan_filters_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("yq-4.44.1-0.x86_64.rpm"), b"").unwrap();
        std::fs::write(dir.path().join("index.html"), b"").unwrap();
        std::fs::create_dir(dir.path().join("repodata")).unwrap();

        let snapshot = RepoSnapshot::scan(dir.path(), "rpm").unwrap();
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.contains("yq-4.44.1-0.x86_64.rpm"));
        assert!(!snapshot.contains("yq-4.44.1-1.x86_64.rpm"));
    }

    #[test]
    fn test_snapshot_does_not_see_later_files() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = RepoSnapshot::scan(dir.path(), "rpm").unwrap();
        std::fs::write(dir.path().join("late-1-0.noarch.rpm"), b"").unwrap();
        assert!(!snapshot.contains("late-1-0.noarch.rpm"));
    }
}
