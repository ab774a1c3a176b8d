//! Package builds.
//!
//! A [`PackageBuilder`] turns the artifacts of one resolution into a single
//! package file inside the iteration's scratch directory. [`build_package`]
//! is the failure boundary of the pipeline: whatever goes wrong inside one
//! build is logged there and reported as "no package", so the remaining
//! sources still get built.
//!
//! # Build environment
//!
//! | Variable | Value |
//! |----------|-------|
//! | `SOURCE_DATE_EPOCH` | Upstream creation time of the release, in seconds |
//!
//! The variable is set on the packaging tool's process only. The pipeline's
//! own environment is never modified, so it cannot leak into the next build.

use std::collections::BTreeSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use minijinja::context;
use relpkg_schema::{Config, Metadata, Target};
use thiserror::Error;
use tokio::process::Command;

use crate::io::process::{self, ToolError};
use crate::template::{RPM_SPEC, RenderError, Renderer};

/// Mode every artifact is normalised to before packaging. The spec file
/// decides the installed mode.
pub const ARTIFACT_MODE: u32 = 0o644;

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("{program} not found in PATH")]
    ToolNotFound { program: String },

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Expected package {0} was not produced")]
    MissingOutput(PathBuf),
}

/// Inputs of one build.
#[derive(Debug, Clone, Copy)]
pub struct BuildRequest<'a> {
    /// Files to package.
    pub artifacts: &'a BTreeSet<PathBuf>,
    /// Global configuration.
    pub config: &'a Config,
    /// Metadata with the packaging architecture.
    pub metadata: &'a Metadata,
}

#[async_trait]
pub trait PackageBuilder: Send + Sync {
    /// Build a package and return the path of the produced file.
    async fn build(&self, req: BuildRequest<'_>) -> Result<PathBuf, BuildError>;
}

/// Builds RPMs with `rpmbuild` from the [`RPM_SPEC`] template.
#[derive(Debug, Clone)]
pub struct RpmBuilder {
    renderer: Arc<Renderer>,
    program: OsString,
    leading_args: Vec<OsString>,
    timeout: Duration,
}

impl RpmBuilder {
    pub fn new(renderer: Arc<Renderer>, timeout: Duration) -> Self {
        Self {
            renderer,
            program: OsString::from("rpmbuild"),
            leading_args: Vec::new(),
            timeout,
        }
    }

    /// Run `program` with `leading_args` instead of `rpmbuild`.
    #[must_use]
    pub fn with_command(
        mut self,
        program: impl Into<OsString>,
        leading_args: impl IntoIterator<Item = impl Into<OsString>>,
    ) -> Self {
        self.program = program.into();
        self.leading_args = leading_args.into_iter().map(Into::into).collect();
        self
    }

    /// Fail early if the packaging tool is not installed.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::ToolNotFound`] when the program cannot be
    /// located.
    pub fn check_available(&self) -> Result<PathBuf, BuildError> {
        which::which(&self.program).map_err(|_| BuildError::ToolNotFound {
            program: self.program.to_string_lossy().into_owned(),
        })
    }

    /// Render the spec file for `req` into the scratch directory.
    fn write_spec(&self, req: &BuildRequest<'_>) -> Result<PathBuf, BuildError> {
        let files: Vec<String> = req
            .artifacts
            .iter()
            .map(|p| p.display().to_string())
            .collect();
        let spec = self.renderer.render(
            RPM_SPEC,
            context! { files => files, config => req.config, metadata => req.metadata },
        )?;
        tracing::debug!("Spec for {}:\n{spec}", req.metadata.name);

        let path = req
            .metadata
            .buildroot()
            .join(format!("{}.spec", req.metadata.name));
        std::fs::create_dir_all(req.metadata.buildroot())?;
        std::fs::write(&path, spec)?;
        Ok(path)
    }
}

#[async_trait]
impl PackageBuilder for RpmBuilder {
    async fn build(&self, req: BuildRequest<'_>) -> Result<PathBuf, BuildError> {
        let spec = self.write_spec(&req)?;
        let topdir = req.metadata.buildroot().canonicalize()?;
        let arch = req.metadata.arch.as_str();

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.leading_args)
            .arg("--define")
            .arg(format!("_topdir {}", topdir.display()))
            .arg("--target")
            .arg(arch)
            .arg("-bb")
            .arg(&spec)
            .env(
                "SOURCE_DATE_EPOCH",
                req.metadata.source_date_epoch().to_string(),
            );
        process::run(&mut cmd, self.timeout).await?;

        let package = topdir
            .join("RPMS")
            .join(arch)
            .join(Target::Rpm.package_file_name(req.metadata, arch));
        if !package.is_file() {
            return Err(BuildError::MissingOutput(package));
        }
        Ok(package)
    }
}

/// Set every artifact to [`ARTIFACT_MODE`].
///
/// # Errors
///
/// Returns an error if a file's permissions cannot be changed.
pub fn normalize_permissions(artifacts: &BTreeSet<PathBuf>) -> std::io::Result<()> {
    for path in artifacts {
        set_mode(path)?;
    }
    Ok(())
}

#[cfg(unix)]
fn set_mode(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(ARTIFACT_MODE))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

/// Build one package, isolating failures.
///
/// Returns the package path, or `None` after logging the error.
pub async fn build_package(builder: &dyn PackageBuilder, req: BuildRequest<'_>) -> Option<PathBuf> {
    let name = &req.metadata.name;
    let arch = &req.metadata.arch;

    if let Err(e) = normalize_permissions(req.artifacts) {
        tracing::error!("Build of {name} ({arch}) failed: {e}");
        return None;
    }

    match builder.build(req).await {
        Ok(path) => {
            tracing::info!("Built {}", path.display());
            Some(path)
        }
        Err(e) => {
            tracing::error!("Build of {name} ({arch}) failed: {e}");
            None
        }
    }
}
