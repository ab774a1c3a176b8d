//! Source resolution: turning a declared source into local artifacts.
//!
//! Each [`SourceType`] has one [`Strategy`]. The [`Resolver`] owns the
//! registry and dispatches on the source's type, so adding a new kind of
//! upstream means implementing the trait and registering it.

pub mod github;
pub mod template;

use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;

use async_trait::async_trait;
use relpkg_schema::{Arch, Metadata, Source, SourceType, Target};
use thiserror::Error;

use crate::index::BuiltIndex;
use crate::io::download::DownloadError;
use crate::template::RenderError;

pub use github::GithubStrategy;
pub use template::TemplateStrategy;

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("Invalid repository '{0}'")]
    Repo(String),

    #[error("GitHub API error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Download of {asset} failed: {source}")]
    Download {
        asset: String,
        source: DownloadError,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Template file not found: {0}")]
    MissingTemplate(PathBuf),

    #[error("Template source is missing extra.{0}")]
    MissingExtra(&'static str),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error("No strategy registered for source type '{0}'")]
    Unsupported(SourceType),
}

/// Everything a strategy needs to resolve one source for one architecture.
#[derive(Clone, Copy)]
pub struct ResolveRequest<'a> {
    /// Source being resolved.
    pub source: &'a Source,
    /// Requested (packaging) architecture.
    pub arch: &'a Arch,
    /// Target the package will be built for.
    pub target: Target,
    /// Packages already published for `target`.
    pub built: &'a dyn BuiltIndex,
}

impl std::fmt::Debug for ResolveRequest<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolveRequest")
            .field("source", &self.source.name)
            .field("arch", &self.arch)
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

/// Whether a strategy produced new artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveStatus {
    /// Artifacts were written to the scratch directory.
    Fetched,
    /// The matching package is already published; nothing was fetched.
    UpToDate,
}

/// Outcome of resolving one source for one architecture.
#[derive(Debug, Clone)]
pub struct Resolved {
    /// Absolute paths of the produced artifacts. Empty when up to date or
    /// when nothing matched.
    pub artifacts: BTreeSet<PathBuf>,
    /// Metadata to build with.
    pub metadata: Metadata,
    /// Fetched or up to date.
    pub status: ResolveStatus,
}

impl Resolved {
    /// Nothing to do: the package for this release is already published.
    pub fn up_to_date(metadata: Metadata) -> Self {
        Self {
            artifacts: BTreeSet::new(),
            metadata,
            status: ResolveStatus::UpToDate,
        }
    }

    /// Artifacts written for `metadata`.
    pub fn fetched(artifacts: BTreeSet<PathBuf>, metadata: Metadata) -> Self {
        Self {
            artifacts,
            metadata,
            status: ResolveStatus::Fetched,
        }
    }
}

#[async_trait]
pub trait Strategy: Send + Sync {
    /// Resolve `req` into artifacts under `base.sources_dir()`.
    ///
    /// `base` carries the defaults, the packager and the translated
    /// architecture. The returned metadata replaces it; on
    /// [`ResolveStatus::UpToDate`] it is returned unchanged.
    async fn resolve(
        &self,
        req: ResolveRequest<'_>,
        base: Metadata,
    ) -> Result<Resolved, ResolveError>;
}

/// Registry of strategies keyed by source type.
#[derive(Default)]
pub struct Resolver {
    strategies: HashMap<SourceType, Box<dyn Strategy>>,
}

impl std::fmt::Debug for Resolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver")
            .field("strategies", &self.strategies.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Resolver {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `strategy` for `kind`, replacing any previous one.
    #[must_use]
    pub fn register(mut self, kind: SourceType, strategy: impl Strategy + 'static) -> Self {
        self.strategies.insert(kind, Box::new(strategy));
        self
    }
}

#[async_trait]
impl Strategy for Resolver {
    async fn resolve(
        &self,
        req: ResolveRequest<'_>,
        base: Metadata,
    ) -> Result<Resolved, ResolveError> {
        let strategy = self
            .strategies
            .get(&req.source.kind)
            .ok_or(ResolveError::Unsupported(req.source.kind))?;
        strategy.resolve(req, base).await
    }
}
