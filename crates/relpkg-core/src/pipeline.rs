//! The top-level driver.
//!
//! Walks targets, then sources, then each source's architectures. Every
//! (source, architecture) iteration gets a fresh scratch directory and a
//! fresh [`Metadata`]; a failure inside one iteration is logged and the
//! walk continues. The repository of a target is only written once all of
//! its iterations are done, and the "already built" check reads a snapshot
//! taken before the first iteration of that target.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use relpkg_schema::{Arch, Config, Metadata, Source, Target};

use crate::builder::{BuildRequest, PackageBuilder, build_package};
use crate::index::RepoSnapshot;
use crate::publish::{Publisher, RepoIndexer};
use crate::resolver::{ResolveRequest, ResolveStatus, Strategy};
use crate::setup::SetupPage;
use crate::template::Renderer;
use crate::vcs::{GitPublisher, PushOutcome};

/// Builder and repository indexer of one target.
#[derive(Clone)]
pub struct Backend {
    /// Produces package files.
    pub builder: Arc<dyn PackageBuilder>,
    /// Regenerates the repository metadata.
    pub indexer: Arc<dyn RepoIndexer>,
}

impl fmt::Debug for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Backend").finish_non_exhaustive()
    }
}

/// What happened to one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetReport {
    pub target: Target,
    /// File names of packages built this run.
    pub built: Vec<String>,
    /// Iterations whose package was already published.
    pub up_to_date: usize,
    /// Iterations that failed to resolve or build.
    pub failed: usize,
    /// Iterations skipped for the host architecture or for lack of artifacts.
    pub skipped: usize,
    /// Every package file in the repository after publishing.
    pub published: Vec<String>,
}

impl TargetReport {
    fn new(target: Target) -> Self {
        Self {
            target,
            built: Vec::new(),
            up_to_date: 0,
            failed: 0,
            skipped: 0,
            published: Vec::new(),
        }
    }
}

impl fmt::Display for TargetReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} built, {} up to date, {} failed, {} skipped, {} published",
            self.target,
            self.built.len(),
            self.up_to_date,
            self.failed,
            self.skipped,
            self.published.len()
        )
    }
}

/// Result of the final push step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushStatus {
    Disabled,
    Pushed,
    NothingToPush,
    Failed(String),
}

impl fmt::Display for PushStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disabled => f.write_str("push disabled"),
            Self::Pushed => f.write_str("pushed"),
            Self::NothingToPush => f.write_str("nothing to push"),
            Self::Failed(e) => write!(f, "push failed: {e}"),
        }
    }
}

/// Summary of a whole run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub targets: Vec<TargetReport>,
    pub setup_page: Option<PathBuf>,
    pub push: PushStatus,
}

impl RunReport {
    /// Iterations that failed across all targets.
    pub fn failed(&self) -> usize {
        self.targets.iter().map(|t| t.failed).sum()
    }
}

/// Resolve, build, publish and push.
pub struct Pipeline {
    config: Config,
    sources: Vec<Source>,
    host: Arch,
    resolver: Box<dyn Strategy>,
    backends: HashMap<Target, Backend>,
    publisher: Publisher,
    setup: SetupPage,
    push: Option<GitPublisher>,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("targets", &self.config.targets)
            .field("sources", &self.sources.len())
            .field("host", &self.host)
            .field("push", &self.push)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// A pipeline for the running host with no backends and push disabled.
    pub fn new(
        config: Config,
        sources: Vec<Source>,
        resolver: impl Strategy + 'static,
        renderer: Arc<Renderer>,
    ) -> Self {
        Self {
            config,
            sources,
            host: Arch::current(),
            resolver: Box::new(resolver),
            backends: HashMap::new(),
            publisher: Publisher::new(Arc::clone(&renderer)),
            setup: SetupPage::new(renderer),
            push: None,
        }
    }

    /// Build for `host` instead of the running machine.
    #[must_use]
    pub fn with_host(mut self, host: Arch) -> Self {
        self.host = host;
        self
    }

    /// Register the builder and indexer for `target`.
    #[must_use]
    pub fn with_backend(mut self, target: Target, backend: Backend) -> Self {
        self.backends.insert(target, backend);
        self
    }

    /// Push the repository tree through `git` at the end of the run.
    #[must_use]
    pub fn with_push(mut self, git: GitPublisher) -> Self {
        self.push = Some(git);
        self
    }

    /// Run every configured target.
    ///
    /// # Errors
    ///
    /// Fails if a target has no backend, the repository cannot be scanned or
    /// published, or the setup page cannot be written. Resolution and build
    /// failures are counted in the report instead.
    pub async fn run(&self) -> Result<RunReport> {
        let mut targets = Vec::with_capacity(self.config.targets.len());
        for &target in &self.config.targets {
            targets.push(self.run_target(target).await?);
        }

        let setup_page = match &self.config.repo_package {
            Some(package) => Some(
                self.setup
                    .write(&self.config, package)
                    .context("Failed to write setup instructions")?,
            ),
            None => None,
        };

        let built: usize = targets.iter().map(|t| t.built.len()).sum();
        let push = self.push(built).await;

        Ok(RunReport {
            targets,
            setup_page,
            push,
        })
    }

    async fn run_target(&self, target: Target) -> Result<TargetReport> {
        let backend = self
            .backends
            .get(&target)
            .ok_or_else(|| anyhow!("No builder registered for target {target}"))?;
        let repo = self.config.repo_dir(target);
        let snapshot = RepoSnapshot::scan(&repo, target.extension())
            .with_context(|| format!("Failed to scan {}", repo.display()))?;

        tracing::info!("Target {target}: {} packages already published", snapshot.len());

        let mut report = TargetReport::new(target);
        let mut packages = Vec::new();
        // Built packages live in their scratch directories until published.
        let mut scratch_dirs = Vec::new();

        for source in &self.sources {
            for arch in &source.arch {
                if !arch.applies_to(&self.host) {
                    tracing::debug!(
                        "Skipping {} ({arch}): not buildable on {}",
                        source.name,
                        self.host
                    );
                    report.skipped += 1;
                    continue;
                }

                let scratch = tempfile::Builder::new()
                    .prefix(&format!("relpkg-{}-", source.name))
                    .tempdir()
                    .context("Failed to create scratch directory")?;
                let base = Metadata::new(scratch.path())
                    .with_packager(self.config.packager())
                    .with_arch(source.arch_translation.translate(arch));

                let req = ResolveRequest {
                    source,
                    arch,
                    target,
                    built: &snapshot,
                };
                let resolved = match self.resolver.resolve(req, base).await {
                    Ok(resolved) => resolved,
                    Err(e) => {
                        tracing::error!("Resolving {} ({arch}) failed: {e}", source.name);
                        report.failed += 1;
                        continue;
                    }
                };

                if resolved.status == ResolveStatus::UpToDate {
                    report.up_to_date += 1;
                    continue;
                }
                if resolved.artifacts.is_empty() {
                    tracing::info!("Nothing to package for {} ({arch})", source.name);
                    report.skipped += 1;
                    continue;
                }

                let metadata = resolved.metadata.with_arch(arch.as_str());
                let req = BuildRequest {
                    artifacts: &resolved.artifacts,
                    config: &self.config,
                    metadata: &metadata,
                };
                match build_package(backend.builder.as_ref(), req).await {
                    Some(package) => {
                        if let Some(name) = package.file_name() {
                            report.built.push(name.to_string_lossy().into_owned());
                        }
                        packages.push(package);
                        scratch_dirs.push(scratch);
                    }
                    None => report.failed += 1,
                }
            }
        }

        report.published = self
            .publisher
            .publish(target, &packages, &repo, backend.indexer.as_ref())
            .await
            .with_context(|| format!("Failed to publish {target} repository"))?;
        drop(scratch_dirs);

        tracing::info!("{report}");
        Ok(report)
    }

    async fn push(&self, built: usize) -> PushStatus {
        let paths = [self.config.repobase.clone()];
        let Some(git) = &self.push else {
            tracing::warn!("Push disabled (set DO_PUSH=1 to enable); not pushing:");
            for entry in walkdir::WalkDir::new(&self.config.repobase)
                .sort_by_file_name()
                .into_iter()
                .flatten()
                .filter(|e| e.file_type().is_file())
            {
                tracing::warn!("  {}", entry.path().display());
            }
            return PushStatus::Disabled;
        };

        let message = format!("Update repository ({built} new packages)");
        match git.push(&paths, &message).await {
            Ok(PushOutcome::Pushed) => PushStatus::Pushed,
            Ok(PushOutcome::NothingToPush) => PushStatus::NothingToPush,
            Err(e) => {
                tracing::error!("{e}");
                PushStatus::Failed(e.to_string())
            }
        }
    }
}
