//! Repository publishing.
//!
//! Runs once per target after every build for that target has finished.
//! Unlike builds, each step here is fatal: the repository metadata covers
//! the whole directory, so a half-regenerated index must stop the run.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use minijinja::context;
use relpkg_schema::Target;
use thiserror::Error;
use tokio::process::Command;

use crate::io::process::{self, ToolError};
use crate::template::{FILE_INDEX, RenderError, Renderer};

#[derive(Error, Debug)]
pub enum PublishError {
    #[error("Failed to move {from} to {to}: {reason}")]
    Move {
        from: PathBuf,
        to: PathBuf,
        reason: String,
    },

    #[error("Repository metadata generation failed: {0}")]
    Index(#[from] ToolError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Regenerates repository metadata for a directory of packages.
#[async_trait]
pub trait RepoIndexer: Send + Sync {
    /// Regenerate the metadata of `repo` for the packages named in
    /// `filelist` (one file name per line, relative to `repo`).
    async fn regenerate(&self, repo: &Path, filelist: &Path) -> Result<(), PublishError>;
}

/// `createrepo` (or `createrepo_c`) indexer for RPM repositories.
#[derive(Debug, Clone)]
pub struct CreateRepo {
    program: String,
    timeout: Duration,
}

impl CreateRepo {
    pub fn new(timeout: Duration) -> Self {
        Self {
            program: "createrepo".to_string(),
            timeout,
        }
    }

    /// Use `program` instead of `createrepo`.
    #[must_use]
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Prefer `createrepo_c` when it is installed and plain `createrepo` is not.
    #[must_use]
    pub fn detect(self) -> Self {
        if which::which(&self.program).is_err() && which::which("createrepo_c").is_ok() {
            return self.with_program("createrepo_c");
        }
        self
    }
}

#[async_trait]
impl RepoIndexer for CreateRepo {
    async fn regenerate(&self, repo: &Path, filelist: &Path) -> Result<(), PublishError> {
        let mut cmd = Command::new(&self.program);
        cmd.arg("-i")
            .arg(filelist)
            .arg("--update")
            .arg(repo)
            .arg("--skip-stat");
        process::run(&mut cmd, self.timeout).await?;
        Ok(())
    }
}

/// Moves built packages into the repository and refreshes its index.
#[derive(Debug, Clone)]
pub struct Publisher {
    renderer: Arc<Renderer>,
}

impl Publisher {
    pub fn new(renderer: Arc<Renderer>) -> Self {
        Self { renderer }
    }

    /// Publish `packages` into `repo` (the target's directory), regenerate
    /// its metadata and write `index.html`. Returns every package file name
    /// in the repository afterwards, sorted.
    ///
    /// # Errors
    ///
    /// Any failure is fatal for the run; see [`PublishError`].
    pub async fn publish(
        &self,
        target: Target,
        packages: &[PathBuf],
        repo: &Path,
        indexer: &dyn RepoIndexer,
    ) -> Result<Vec<String>, PublishError> {
        std::fs::create_dir_all(repo)?;
        for package in packages {
            move_into(package, repo)?;
        }

        let files = list_packages(repo, target.extension())?;
        let mut filelist = tempfile::NamedTempFile::new()?;
        for file in &files {
            writeln!(filelist, "{file}")?;
        }
        filelist.flush()?;

        tracing::info!(
            "Regenerating {target} metadata in {} ({} packages)",
            repo.display(),
            files.len()
        );
        indexer.regenerate(repo, filelist.path()).await?;

        let index = self
            .renderer
            .render(FILE_INDEX, context! { files => &files, target => target.as_str() })?;
        std::fs::write(repo.join("index.html"), index)?;

        Ok(files)
    }
}

/// Move `package` into `dir`, falling back to copy-and-delete across
/// filesystems.
fn move_into(package: &Path, dir: &Path) -> Result<PathBuf, PublishError> {
    let file_name = package.file_name().ok_or_else(|| PublishError::Move {
        from: package.to_path_buf(),
        to: dir.to_path_buf(),
        reason: "not a file".to_string(),
    })?;
    let dest = dir.join(file_name);

    if std::fs::rename(package, &dest).is_err() {
        let options = fs_extra::file::CopyOptions::new().overwrite(true);
        fs_extra::file::move_file(package, &dest, &options).map_err(|e| PublishError::Move {
            from: package.to_path_buf(),
            to: dest.clone(),
            reason: e.to_string(),
        })?;
    }
    tracing::debug!("Moved {} to {}", package.display(), dest.display());
    Ok(dest)
}

/// Names of all `*.{extension}` files directly in `dir`, sorted.
fn list_packages(dir: &Path, extension: &str) -> std::io::Result<Vec<String>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_file() && path.extension().is_some_and(|ext| ext == extension) {
            files.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingIndexer {
        calls: Mutex<Vec<(PathBuf, String)>>,
    }

    #[async_trait]
    impl RepoIndexer for RecordingIndexer {
        async fn regenerate(&self, repo: &Path, filelist: &Path) -> Result<(), PublishError> {
            let list = std::fs::read_to_string(filelist)?;
            self.calls.lock().unwrap().push((repo.to_path_buf(), list));
            Ok(())
        }
    }

    struct FailingIndexer;

    #[async_trait]
    impl RepoIndexer for FailingIndexer {
        async fn regenerate(&self, _repo: &Path, _filelist: &Path) -> Result<(), PublishError> {
            Err(PublishError::Index(ToolError::Timeout {
                program: "createrepo".to_string(),
                timeout: Duration::from_secs(1),
            }))
        }
    }

    fn built(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, name).unwrap();
        path
    }

    #[tokio::test]
    async fn test_publish_moves_indexes_and_renders() {
        let scratch = tempfile::tempdir().unwrap();
        let base = tempfile::tempdir().unwrap();
        let repo = base.path().join("rpm");
        std::fs::create_dir_all(&repo).unwrap();
        std::fs::write(repo.join("old-1.0-0.x86_64.rpm"), b"old").unwrap();

        let packages = vec![
            built(scratch.path(), "yq-4.44.1-0.x86_64.rpm"),
            built(scratch.path(), "jq-1.7-0.x86_64.rpm"),
        ];
        let indexer = RecordingIndexer::default();
        let publisher = Publisher::new(Arc::new(Renderer::default()));

        let files = publisher
            .publish(Target::Rpm, &packages, &repo, &indexer)
            .await
            .unwrap();

        assert_eq!(
            files,
            vec!["jq-1.7-0.x86_64.rpm", "old-1.0-0.x86_64.rpm", "yq-4.44.1-0.x86_64.rpm"]
        );
        assert!(!packages[0].exists());
        assert!(repo.join("yq-4.44.1-0.x86_64.rpm").exists());

        let calls = indexer.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, repo);
        assert_eq!(
            calls[0].1,
            "jq-1.7-0.x86_64.rpm\nold-1.0-0.x86_64.rpm\nyq-4.44.1-0.x86_64.rpm\n"
        );

        let index = std::fs::read_to_string(repo.join("index.html")).unwrap();
        assert!(index.contains("Index of rpm"));
        assert!(index.contains(r#"<a href="yq-4.44.1-0.x86_64.rpm">"#));
    }

    #[tokio::test]
    async fn test_indexer_failure_is_fatal() {
        let base = tempfile::tempdir().unwrap();
        let repo = base.path().join("rpm");
        let publisher = Publisher::new(Arc::new(Renderer::default()));

        let result = publisher
            .publish(Target::Rpm, &[], &repo, &FailingIndexer)
            .await;

        assert!(matches!(result, Err(PublishError::Index(_))));
        assert!(!repo.join("index.html").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_createrepo_nonzero_exit_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let filelist = dir.path().join("filelist");
        std::fs::write(&filelist, "").unwrap();
        let indexer = CreateRepo::new(Duration::from_secs(10)).with_program("false");

        let err = indexer.regenerate(dir.path(), &filelist).await.unwrap_err();
        assert!(matches!(err, PublishError::Index(ToolError::Failed { .. })));
    }
}
