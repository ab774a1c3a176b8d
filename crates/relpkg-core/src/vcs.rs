//! Pushing the published tree through git.

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;

use crate::io::process::{self, ToolError};

#[derive(Error, Debug)]
pub enum VcsError {
    #[error("git {step} failed: {source}")]
    Git {
        step: &'static str,
        source: ToolError,
    },
}

/// Result of a push attempt that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// A commit was created and pushed.
    Pushed,
    /// Nothing was staged, so no commit was made.
    NothingToPush,
}

/// Stages, commits and pushes paths inside a git work tree.
#[derive(Debug, Clone)]
pub struct GitPublisher {
    workdir: PathBuf,
    timeout: Duration,
}

impl GitPublisher {
    /// Operate on the work tree containing `workdir`.
    pub fn new(workdir: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            workdir: workdir.into(),
            timeout,
        }
    }

    /// Stage `paths`, commit them with `message` and push. An empty staging
    /// area is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`VcsError::Git`] naming the step that failed.
    pub async fn push(&self, paths: &[PathBuf], message: &str) -> Result<PushOutcome, VcsError> {
        self.git("add", |cmd| {
            cmd.arg("add").arg("--all").arg("--").args(paths);
        })
        .await?;

        // `diff --cached --quiet` exits 1 when something is staged.
        let mut diff = self.command();
        diff.args(["diff", "--cached", "--quiet"]);
        let staged = process::output(&mut diff, self.timeout)
            .await
            .map_err(|source| VcsError::Git {
                step: "diff",
                source,
            })?;
        if staged.status.success() {
            tracing::info!("No repository changes to push");
            return Ok(PushOutcome::NothingToPush);
        }

        self.git("commit", |cmd| {
            cmd.args(["commit", "--quiet", "-m", message]);
        })
        .await?;
        self.git("push", |cmd| {
            cmd.arg("push");
        })
        .await?;

        tracing::info!("Pushed repository changes");
        Ok(PushOutcome::Pushed)
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new("git");
        cmd.arg("-C").arg(&self.workdir);
        cmd
    }

    async fn git(
        &self,
        step: &'static str,
        build: impl FnOnce(&mut Command),
    ) -> Result<(), VcsError> {
        let mut cmd = self.command();
        build(&mut cmd);
        process::run(&mut cmd, self.timeout)
            .await
            .map(drop)
            .map_err(|source| VcsError::Git { step, source })
    }

    /// Work tree the publisher operates on.
    pub fn workdir(&self) -> &Path {
        &self.workdir
    }
}
