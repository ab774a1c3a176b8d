//! Latest-release resolution for GitHub sources.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use relpkg_schema::{ChangelogEntry, GitHubRepo, Metadata, Source, changelog_date, normalize_tag};

use super::{ResolveError, ResolveRequest, Resolved, Strategy};
use crate::github::{GitHubClient, Release, ReleaseAsset};
use crate::io::download::download_to;

/// Resolves a source to the assets of its repository's latest release.
#[derive(Debug, Clone)]
pub struct GithubStrategy {
    client: Arc<GitHubClient>,
}

impl GithubStrategy {
    pub fn new(client: Arc<GitHubClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Strategy for GithubStrategy {
    async fn resolve(
        &self,
        req: ResolveRequest<'_>,
        base: Metadata,
    ) -> Result<Resolved, ResolveError> {
        let source = req.source;
        let repo = GitHubRepo::new(&source.source).map_err(ResolveError::Repo)?;
        let release = self.client.latest_release(&repo).await?;
        let metadata = release_metadata(source, &repo, &release, base.clone());

        let package = req.target.package_file_name(&metadata, req.arch.as_str());
        if req.built.contains(&package) {
            tracing::info!("{package} is already published");
            return Ok(Resolved::up_to_date(base));
        }

        let selected = select_assets(source, &release.assets, &metadata.arch);
        if selected.is_empty() {
            tracing::info!(
                "No asset of {repo} {} matches {} for {}",
                release.tag_name,
                source.files_regex.as_str(),
                metadata.arch
            );
            return Ok(Resolved::fetched(BTreeSet::new(), metadata));
        }
        if selected.len() > 1 {
            tracing::warn!(
                "{} assets of {repo} {} match for {}; each is written as {}",
                selected.len(),
                release.tag_name,
                metadata.arch,
                source.name
            );
        }

        let dest = metadata.sources_dir().join(&source.name);
        let mut artifacts = BTreeSet::new();
        for asset in selected {
            tracing::info!("Downloading {}", asset.browser_download_url);
            let bytes = download_to(self.client.http(), &asset.browser_download_url, &dest)
                .await
                .map_err(|source| ResolveError::Download {
                    asset: asset.name.clone(),
                    source,
                })?;
            tracing::debug!("Wrote {bytes} bytes to {}", dest.display());
            artifacts.insert(dest.clone());
        }

        Ok(Resolved::fetched(artifacts, metadata))
    }
}

/// Metadata describing `release`, layered over `base`.
pub fn release_metadata(
    source: &Source,
    repo: &GitHubRepo,
    release: &Release,
    base: Metadata,
) -> Metadata {
    let mut metadata = base.with_tag(normalize_tag(&release.tag_name));
    metadata.name.clone_from(&source.name);
    metadata.summary = release
        .name
        .as_deref()
        .filter(|n| !n.trim().is_empty())
        .unwrap_or(&release.tag_name)
        .to_string();
    metadata.url = repo.html_url();
    metadata.description = release.body.clone().unwrap_or_default();
    metadata.created_at = release.created_at;
    metadata.changelog = vec![ChangelogEntry::new(
        format!("{} {}", changelog_date(&release.created_at), metadata.packager),
        format!("Release {}", release.tag_name),
    )];
    metadata
}

/// Assets whose name matches the source's pattern and whose captured
/// architecture equals `arch` (the upstream spelling).
pub fn select_assets<'a>(
    source: &Source,
    assets: &'a [ReleaseAsset],
    arch: &str,
) -> Vec<&'a ReleaseAsset> {
    assets
        .iter()
        .filter(|asset| match source.files_regex.captures(&asset.name) {
            None => {
                tracing::debug!("Skipping {}: no match", asset.name);
                false
            }
            Some(m) if m.arch != arch => {
                tracing::debug!("Skipping {}: arch {} is not {arch}", asset.name, m.arch);
                false
            }
            Some(_) => true,
        })
        .collect()
}
