//! relpkg - package upstream releases into a browsable RPM repository
//!
//! Reads `config.yaml` and `sources.yaml`, resolves the latest release of
//! every source for every architecture the host can build, packages the
//! artifacts, regenerates the repository metadata and optionally pushes
//! the repository tree with git.
#![allow(clippy::missing_errors_doc)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use clap::builder::FalseyValueParser;

use relpkg_core::builder::RpmBuilder;
use relpkg_core::github::{DEFAULT_API_BASE, GitHubClient, ReleaseCache};
use relpkg_core::pipeline::Backend;
use relpkg_core::publish::CreateRepo;
use relpkg_core::resolver::{GithubStrategy, TemplateStrategy};
use relpkg_core::vcs::GitPublisher;
use relpkg_core::{Pipeline, Renderer, Resolver, RunReport};
use relpkg_schema::{Arch, Config, SourceType, Target, load_sources};

/// Command-line arguments, with environment fallbacks for CI use.
#[derive(Parser, Debug)]
#[command(name = "relpkg")]
#[command(author, version, about = "relpkg - package upstream releases into an RPM repository")]
pub struct Cli {
    /// Global configuration
    #[arg(long, default_value = "config.yaml")]
    pub config: PathBuf,

    /// Declared upstream sources
    #[arg(long, default_value = "sources.yaml")]
    pub sources: PathBuf,

    /// Architecture to build for (defaults to this machine)
    #[arg(long, value_name = "ARCH")]
    pub host_arch: Option<Arch>,

    /// Commit and push the repository tree when done. Any non-empty `DO_PUSH`
    /// enables it except 0, false, no, off, n and f
    #[arg(long, env = "DO_PUSH", value_parser = FalseyValueParser::new())]
    pub push: bool,

    /// Ignore the cached release descriptors
    #[arg(long)]
    pub no_cache: bool,

    /// GitHub API root
    #[arg(long, env = "RELPKG_GITHUB_API", default_value = DEFAULT_API_BASE)]
    pub github_api: String,

    /// Token for the GitHub API
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub github_token: Option<String>,

    /// Deadline in seconds for each network request and external tool
    #[arg(long, default_value_t = 300)]
    pub timeout: u64,

    /// Debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

/// Default log filter for the given verbosity.
pub fn default_filter(verbose: bool) -> &'static str {
    if verbose { "relpkg=debug" } else { "relpkg=info" }
}

/// Run the whole pipeline as described by `cli`.
pub async fn run(cli: Cli) -> Result<RunReport> {
    let config = Config::load(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    let sources = load_sources(&cli.sources)
        .with_context(|| format!("Failed to load {}", cli.sources.display()))?;
    let timeout = Duration::from_secs(cli.timeout);

    let renderer = Arc::new(Renderer::new(config.templates.clone()));

    let mut client = GitHubClient::new(&cli.github_api, timeout)
        .context("Failed to create HTTP client")?
        .with_token(cli.github_token);
    if !cli.no_cache {
        client = client.with_cache(ReleaseCache::load());
    }

    let resolver = Resolver::new()
        .register(SourceType::Github, GithubStrategy::new(Arc::new(client)))
        .register(
            SourceType::Template,
            TemplateStrategy::new(Arc::clone(&renderer)),
        );

    let host = cli.host_arch.unwrap_or_else(Arch::current);
    tracing::info!(
        "Building {} sources for {host} into {}",
        sources.len(),
        config.repobase.display()
    );

    let mut pipeline = Pipeline::new(config.clone(), sources, resolver, Arc::clone(&renderer))
        .with_host(host);
    for target in &config.targets {
        let backend = match target {
            Target::Rpm => rpm_backend(&renderer, timeout),
        };
        pipeline = pipeline.with_backend(*target, backend);
    }
    if cli.push {
        pipeline = pipeline.with_push(GitPublisher::new(".", timeout));
    }

    pipeline.run().await
}

fn rpm_backend(renderer: &Arc<Renderer>, timeout: Duration) -> Backend {
    let builder = RpmBuilder::new(Arc::clone(renderer), timeout);
    if let Err(e) = builder.check_available() {
        tracing::warn!("{e}; rpm builds will fail");
    }
    Backend {
        builder: Arc::new(builder),
        indexer: Arc::new(CreateRepo::new(timeout).detect()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["relpkg"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("config.yaml"));
        assert_eq!(cli.sources, PathBuf::from("sources.yaml"));
        assert_eq!(cli.timeout, 300);
        assert!(!cli.no_cache);
        assert!(cli.host_arch.is_none());
    }

    #[test]
    fn test_host_arch_and_push() {
        let cli =
            Cli::try_parse_from(["relpkg", "--host-arch", "aarch64", "--push", "-v"]).unwrap();
        assert_eq!(cli.host_arch, Some(Arch::new("aarch64")));
        assert!(cli.push);
        assert!(cli.verbose);
    }

    #[test]
    fn test_blank_host_arch_rejected() {
        assert!(Cli::try_parse_from(["relpkg", "--host-arch", " "]).is_err());
    }

    #[test]
    fn test_default_filter() {
        assert_eq!(default_filter(false), "relpkg=info");
        assert_eq!(default_filter(true), "relpkg=debug");
    }
}
