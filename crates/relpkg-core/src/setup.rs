//! Top-level setup instructions page.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use minijinja::context;
use relpkg_schema::{Config, Target};
use thiserror::Error;

use crate::template::{RenderError, Renderer, SETUP_INSTRUCTIONS};

#[derive(Error, Debug)]
pub enum SetupError {
    #[error("No {package} package found in {}", .dir.display())]
    MissingRepoPackage { package: String, dir: PathBuf },

    #[error("Invalid search pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Writes `<repobase>/index.html` pointing users at the repository package.
#[derive(Debug, Clone)]
pub struct SetupPage {
    renderer: Arc<Renderer>,
}

impl SetupPage {
    pub fn new(renderer: Arc<Renderer>) -> Self {
        Self { renderer }
    }

    /// Render the page for `package`, the name of the package shipping the
    /// repository definition. Returns the written path.
    ///
    /// # Errors
    ///
    /// Returns [`SetupError::MissingRepoPackage`] if no build of `package`
    /// has been published yet.
    pub fn write(&self, config: &Config, package: &str) -> Result<PathBuf, SetupError> {
        let dir = config.repo_dir(Target::Rpm);
        let repofile = newest_package(&dir, package)?.ok_or_else(|| {
            SetupError::MissingRepoPackage {
                package: package.to_string(),
                dir: dir.clone(),
            }
        })?;

        let page = self.renderer.render(
            SETUP_INSTRUCTIONS,
            context! { rpm_repofile => repofile, repo_url => config.base_url() },
        )?;
        let path = config.repobase.join("index.html");
        std::fs::create_dir_all(&config.repobase)?;
        std::fs::write(&path, page)?;
        tracing::info!("Wrote {}", path.display());
        Ok(path)
    }
}

/// File name of the most recently modified `<package>-*.rpm` in `dir`.
fn newest_package(dir: &Path, package: &str) -> Result<Option<String>, SetupError> {
    let pattern = format!(
        "{}/{}-*.rpm",
        glob::Pattern::escape(&dir.to_string_lossy()),
        glob::Pattern::escape(package)
    );

    let mut newest: Option<(SystemTime, String)> = None;
    for path in glob::glob(&pattern)?.flatten() {
        let Some(name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            continue;
        };
        if package_name(&name) != Some(package) {
            continue;
        }
        let modified = std::fs::metadata(&path)?
            .modified()
            .unwrap_or(SystemTime::UNIX_EPOCH);
        if newest.as_ref().is_none_or(|(t, _)| modified >= *t) {
            newest = Some((modified, name));
        }
    }
    Ok(newest.map(|(_, name)| name))
}

/// Name part of `<name>-<version>-<release>.<arch>.rpm`.
fn package_name(file: &str) -> Option<&str> {
    let stem = file.strip_suffix(".rpm")?;
    let (nvr, _arch) = stem.rsplit_once('.')?;
    let (nv, _release) = nvr.rsplit_once('-')?;
    let (name, _version) = nv.rsplit_once('-')?;
    Some(name)
}
