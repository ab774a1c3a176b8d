//! Local template sources.
//!
//! The source locator is a file on disk. Its content is rendered with the
//! package metadata bound as `metadata` and the result becomes the single
//! artifact, so a repository definition file or a wrapper script can be
//! packaged the same way as a downloaded binary.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use minijinja::context;
use relpkg_schema::{Metadata, Source};

use super::{ResolveError, ResolveRequest, Resolved, Strategy};
use crate::template::Renderer;

#[derive(Debug, Clone)]
pub struct TemplateStrategy {
    renderer: Arc<Renderer>,
}

impl TemplateStrategy {
    pub fn new(renderer: Arc<Renderer>) -> Self {
        Self { renderer }
    }
}

#[async_trait]
impl Strategy for TemplateStrategy {
    async fn resolve(
        &self,
        req: ResolveRequest<'_>,
        base: Metadata,
    ) -> Result<Resolved, ResolveError> {
        let source = req.source;
        let path = PathBuf::from(&source.source);
        if !path.is_file() {
            return Err(ResolveError::MissingTemplate(path));
        }

        let metadata = template_metadata(source, base)?;
        let content = tokio::fs::read_to_string(&path).await?;
        let rendered = self
            .renderer
            .render_str(&content, context! { metadata => &metadata })?;

        let dir = metadata.sources_dir();
        tokio::fs::create_dir_all(&dir).await?;
        let dest = dir.join(&source.name);
        tokio::fs::write(&dest, rendered).await?;
        tracing::debug!("Rendered {} to {}", path.display(), dest.display());

        Ok(Resolved::fetched(BTreeSet::from([dest]), metadata))
    }
}

/// `base` with name, summary, version and url taken from the source.
///
/// # Errors
///
/// Returns [`ResolveError::MissingExtra`] if one of the keys is absent.
pub fn template_metadata(source: &Source, base: Metadata) -> Result<Metadata, ResolveError> {
    let extra = |key: &'static str| source.extra_str(key).ok_or(ResolveError::MissingExtra(key));

    let mut metadata = base;
    metadata.name.clone_from(&source.name);
    metadata.summary = extra("summary")?;
    metadata.version = extra("version")?;
    metadata.url = extra("url")?;
    Ok(metadata)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::RepoSnapshot;
    use crate::resolver::ResolveStatus;
    use relpkg_schema::{Arch, Target};

    fn source(path: &std::path::Path) -> Source {
        serde_yaml::from_str(&format!(
            r"
source: {}
files_regex: '^(?P<name>.+)_(?P<arch>\w+)$'
type: template
arch: [noarch]
name: example-repo
extra:
  summary: S
  version: 1.0
  url: http://x
",
            path.display()
        ))
        .unwrap()
    }

    async fn resolve(src: &Source, scratch: &std::path::Path) -> Result<Resolved, ResolveError> {
        let arch = Arch::noarch();
        let built = RepoSnapshot::default();
        let req = ResolveRequest {
            source: src,
            arch: &arch,
            target: Target::Rpm,
            built: &built,
        };
        TemplateStrategy::new(Arc::new(Renderer::default()))
            .resolve(req, Metadata::new(scratch))
            .await
    }

    #[tokio::test]
    async fn test_renders_extra_values() {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("example.repo.j2");
        std::fs::write(
            &template,
            "[{{ metadata.name }}]\nname={{ metadata.summary }} {{ metadata.version }}\nbaseurl={{ metadata.url }}\n",
        )
        .unwrap();
        let scratch = dir.path().join("scratch");

        let resolved = resolve(&source(&template), &scratch).await.unwrap();

        assert_eq!(resolved.status, ResolveStatus::Fetched);
        let artifact = scratch.join("SOURCES").join("example-repo");
        assert!(resolved.artifacts.contains(&artifact));
        assert_eq!(
            std::fs::read_to_string(artifact).unwrap(),
            "[example-repo]\nname=S 1.0\nbaseurl=http://x\n"
        );
        assert_eq!(resolved.metadata.version, "1.0");
        assert_eq!(resolved.metadata.url, "http://x");
    }

    #[tokio::test]
    async fn test_missing_template_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = resolve(&source(&dir.path().join("nope.j2")), dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::MissingTemplate(_)));
    }

    #[test]
    fn test_missing_extra_key() {
        let mut src = source(std::path::Path::new("/tmp/x"));
        src.extra.remove("url");
        let err = template_metadata(&src, Metadata::new("/tmp/x")).unwrap_err();
        assert!(matches!(err, ResolveError::MissingExtra("url")));
    }
}
