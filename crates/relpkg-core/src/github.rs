//! GitHub Releases API client.
//!
//! Only the "latest release" endpoint is used. Responses can be kept in an
//! on-disk [`ReleaseCache`] so that repeated runs within a few hours do not
//! spend API quota on unchanged repositories.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use relpkg_schema::GitHubRepo;
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// Default API root.
pub const DEFAULT_API_BASE: &str = "https://api.github.com";

/// How long a cached release descriptor stays valid.
pub const CACHE_TTL_HOURS: i64 = 12;

/// A published release as returned by the API. Unknown fields are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    /// Git tag, e.g. `v4.44.1`.
    pub tag_name: String,
    /// Human readable title; may be missing or null.
    #[serde(default)]
    pub name: Option<String>,
    /// Release notes.
    #[serde(default)]
    pub body: Option<String>,
    /// When the release was created.
    pub created_at: DateTime<Utc>,
    /// Downloadable files.
    #[serde(default)]
    pub assets: Vec<ReleaseAsset>,
}

/// One downloadable file attached to a release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseAsset {
    /// File name.
    pub name: String,
    /// Direct download URL.
    pub browser_download_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedRelease {
    release: Release,
    fetched_at: DateTime<Utc>,
}

/// Persistent on-disk cache mapping `owner/repo` to its latest release.
///
/// Entries older than [`CACHE_TTL_HOURS`] are ignored. A missing or
/// unreadable cache file is treated as empty.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ReleaseCache {
    entries: HashMap<String, CachedRelease>,
    #[serde(skip)]
    path: Option<PathBuf>,
}

impl ReleaseCache {
    /// Load the cache from its default location (see
    /// [`crate::paths::release_cache_path`]).
    pub fn load() -> Self {
        match crate::paths::release_cache_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    /// Load the cache from `path`, remembering it for [`ReleaseCache::save`].
    pub fn load_from(path: &Path) -> Self {
        let mut cache = std::fs::read_to_string(path)
            .ok()
            .and_then(|content| serde_json::from_str::<Self>(&content).ok())
            .unwrap_or_default();
        cache.path = Some(path.to_path_buf());
        cache
    }

    /// Persist the cache, creating its directory if needed. A cache without a
    /// backing file is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the file
    /// cannot be written.
    pub fn save(&self) -> anyhow::Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Cached release for `repo` if it was fetched less than
    /// [`CACHE_TTL_HOURS`] before `now`.
    pub fn get(&self, repo: &GitHubRepo, now: DateTime<Utc>) -> Option<&Release> {
        let entry = self.entries.get(repo.as_str())?;
        (now - entry.fetched_at < chrono::Duration::hours(CACHE_TTL_HOURS))
            .then_some(&entry.release)
    }

    /// Insert or replace the entry for `repo`.
    pub fn insert(&mut self, repo: &GitHubRepo, release: Release, fetched_at: DateTime<Utc>) {
        self.entries.insert(
            repo.as_str().to_string(),
            CachedRelease {
                release,
                fetched_at,
            },
        );
    }
}

/// Thin client over the GitHub REST API.
pub struct GitHubClient {
    http: Client,
    api_base: String,
    token: Option<String>,
    cache: Option<Mutex<ReleaseCache>>,
}

impl std::fmt::Debug for GitHubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubClient")
            .field("api_base", &self.api_base)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("cached", &self.cache.is_some())
            .finish_non_exhaustive()
    }
}

impl GitHubClient {
    /// Create a client against `api_base` whose requests give up after
    /// `timeout`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(api_base: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = Client::builder()
            .user_agent(crate::USER_AGENT)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            token: None,
            cache: None,
        })
    }

    /// Authenticate API requests with a bearer token.
    #[must_use]
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|t| !t.trim().is_empty());
        self
    }

    /// Serve and record release descriptors through `cache`.
    #[must_use]
    pub fn with_cache(mut self, cache: ReleaseCache) -> Self {
        self.cache = Some(Mutex::new(cache));
        self
    }

    /// Underlying HTTP client, shared with asset downloads.
    pub fn http(&self) -> &Client {
        &self.http
    }

    /// Fetch the latest published release of `repo`.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, a non-2xx status or an
    /// unparseable body.
    pub async fn latest_release(&self, repo: &GitHubRepo) -> Result<Release, reqwest::Error> {
        if let Some(release) = self.cached(repo) {
            tracing::debug!("Using cached release {} for {repo}", release.tag_name);
            return Ok(release);
        }

        let url = format!("{}/repos/{}/releases/latest", self.api_base, repo);
        tracing::debug!("GET {url}");

        let mut request = self
            .http
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json");
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let release: Release = request.send().await?.error_for_status()?.json().await?;
        self.remember(repo, &release);
        Ok(release)
    }

    fn cached(&self, repo: &GitHubRepo) -> Option<Release> {
        let cache = self.cache.as_ref()?.lock().ok()?;
        cache.get(repo, Utc::now()).cloned()
    }

    fn remember(&self, repo: &GitHubRepo, release: &Release) {
        let Some(cache) = &self.cache else {
            return;
        };
        if let Ok(mut cache) = cache.lock() {
            cache.insert(repo, release.clone(), Utc::now());
            if let Err(e) = cache.save() {
                tracing::warn!("Failed to save release cache: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    const RELEASE_JSON: &str = r#"{
        "tag_name": "v4.44.1",
        "name": "v4.44.1",
        "body": "Bug fixes",
        "created_at": "2024-05-01T12:00:00Z",
        "draft": false,
        "assets": [
            {"name": "yq_linux_amd64", "browser_download_url": "https://example.com/yq_linux_amd64", "size": 10}
        ]
    }"#;

    fn repo() -> GitHubRepo {
        GitHubRepo::new("mikefarah/yq").unwrap()
    }

    #[tokio::test]
    async fn test_latest_release_parses_and_authenticates() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/repos/mikefarah/yq/releases/latest")
            .match_header("authorization", "Bearer secret")
            .match_header("accept", Matcher::Regex("github".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(RELEASE_JSON)
            .create_async()
            .await;

        let client = GitHubClient::new(&server.url(), Duration::from_secs(10))
            .unwrap()
            .with_token(Some("secret".to_string()));
        let release = client.latest_release(&repo()).await.unwrap();

        mock.assert_async().await;
        assert_eq!(release.tag_name, "v4.44.1");
        assert_eq!(release.assets.len(), 1);
        assert_eq!(release.assets[0].name, "yq_linux_amd64");
        assert!(!format!("{client:?}").contains("secret"));
    }

    #[tokio::test]
    async fn test_not_found_is_an_error() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/repos/mikefarah/yq/releases/latest")
            .with_status(404)
            .create_async()
            .await;

        let client = GitHubClient::new(&server.url(), Duration::from_secs(10)).unwrap();
        let err = client.latest_release(&repo()).await.unwrap_err();
        assert_eq!(err.status(), Some(reqwest::StatusCode::NOT_FOUND));
    }

    #[tokio::test]
    async fn test_cache_avoids_second_request() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/repos/mikefarah/yq/releases/latest")
            .with_status(200)
            .with_body(RELEASE_JSON)
            .expect(1)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let cache_path = dir.path().join("cache").join("releases.json");
        let client = GitHubClient::new(&server.url(), Duration::from_secs(10))
            .unwrap()
            .with_cache(ReleaseCache::load_from(&cache_path));

        client.latest_release(&repo()).await.unwrap();
        client.latest_release(&repo()).await.unwrap();
        mock.assert_async().await;

        // Persisted for the next run.
        let reloaded = ReleaseCache::load_from(&cache_path);
        assert!(reloaded.get(&repo(), Utc::now()).is_some());
    }

    #[test]
    fn test_cache_entries_expire() {
        let release: Release = serde_json::from_str(RELEASE_JSON).unwrap();
        let mut cache = ReleaseCache::default();
        let fetched = Utc::now();
        cache.insert(&repo(), release, fetched);

        assert!(cache.get(&repo(), fetched + chrono::Duration::hours(1)).is_some());
        assert!(
            cache
                .get(&repo(), fetched + chrono::Duration::hours(CACHE_TTL_HOURS))
                .is_none()
        );
    }

    #[test]
    fn test_release_without_name_or_body() {
        let release: Release = serde_json::from_str(
            r#"{"tag_name": "1.0", "name": null, "created_at": "2024-05-01T12:00:00Z"}"#,
        )
        .unwrap();
        assert!(release.name.is_none());
        assert!(release.body.is_none());
        assert!(release.assets.is_empty());
    }
}
