//! Jinja-style template rendering.
//!
//! Wraps a [`minijinja::Environment`] with the filters the packaging
//! templates need. Three templates ship with the binary; a file with the
//! same name in the override directory replaces the built-in one.

use std::borrow::Cow;
use std::path::{Path, PathBuf};

use minijinja::{Environment, UndefinedBehavior};
use serde::Serialize;
use thiserror::Error;

/// Spec file handed to `rpmbuild`.
pub const RPM_SPEC: &str = "rpm_spec.j2";
/// Per-target `index.html`.
pub const FILE_INDEX: &str = "file_index.j2";
/// Top-level `index.html` with setup instructions.
pub const SETUP_INSTRUCTIONS: &str = "setup_instructions.j2";

const BUILTIN: [(&str, &str); 3] = [
    (RPM_SPEC, include_str!("../templates/rpm_spec.j2")),
    (FILE_INDEX, include_str!("../templates/file_index.j2")),
    (
        SETUP_INSTRUCTIONS,
        include_str!("../templates/setup_instructions.j2"),
    ),
];

/// Errors raised while loading or rendering a template.
#[derive(Error, Debug)]
pub enum RenderError {
    /// The template failed to parse or evaluate.
    #[error("Failed to render {name}: {source}")]
    Template {
        /// Template name, or `<inline>` for ad-hoc sources.
        name: String,
        /// Engine error.
        source: minijinja::Error,
    },

    /// An override template could not be read.
    #[error("Failed to read template {path}: {source}")]
    Io {
        /// Override file.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// No template with that name exists.
    #[error("Unknown template: {0}")]
    Unknown(String),
}

/// Template renderer shared by resolvers, builders and the publisher.
pub struct Renderer {
    env: Environment<'static>,
    overrides: Option<PathBuf>,
}

impl std::fmt::Debug for Renderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Renderer")
            .field("overrides", &self.overrides)
            .finish_non_exhaustive()
    }
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new(None)
    }
}

impl Renderer {
    /// Create a renderer. Templates in `overrides` take precedence over the
    /// built-in ones.
    pub fn new(overrides: Option<PathBuf>) -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        env.add_filter("basename", basename);
        env.add_filter("rpm_escape", rpm_escape);
        Self { env, overrides }
    }

    /// Render the named template with `ctx` as its context.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError`] if the template is unknown, an override
    /// cannot be read, or rendering fails.
    pub fn render<S: Serialize>(&self, name: &str, ctx: S) -> Result<String, RenderError> {
        let source = self.source(name)?;
        self.env
            .render_str(&source, ctx)
            .map_err(|source| RenderError::Template {
                name: name.to_string(),
                source,
            })
    }

    /// Render an ad-hoc template source.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::Template`] if the source fails to parse or
    /// evaluate.
    pub fn render_str<S: Serialize>(&self, source: &str, ctx: S) -> Result<String, RenderError> {
        self.env
            .render_str(source, ctx)
            .map_err(|source| RenderError::Template {
                name: "<inline>".to_string(),
                source,
            })
    }

    fn source(&self, name: &str) -> Result<Cow<'static, str>, RenderError> {
        if let Some(dir) = &self.overrides {
            let path = dir.join(name);
            if path.is_file() {
                tracing::debug!("Using template override {}", path.display());
                return std::fs::read_to_string(&path)
                    .map(Cow::Owned)
                    .map_err(|source| RenderError::Io { path, source });
            }
        }
        BUILTIN
            .iter()
            .find(|(builtin, _)| *builtin == name)
            .map(|(_, source)| Cow::Borrowed(*source))
            .ok_or_else(|| RenderError::Unknown(name.to_string()))
    }
}

/// Final path component, or the input unchanged if it has none.
fn basename(path: String) -> String {
    match Path::new(&path).file_name() {
        Some(name) => name.to_string_lossy().into_owned(),
        None => path,
    }
}

/// Double `%` so upstream text cannot expand rpm macros.
fn rpm_escape(text: String) -> String {
    text.replace('%', "%%")
}

#[cfg(test)]
mod tests {
    use super::*;
    use minijinja::context;
    use relpkg_schema::{ChangelogEntry, Config, Metadata};

    fn config() -> Config {
        Config::from_yaml(
            r"
maintainers:
  - name: Jane Doe
    email: jane@example.com
targets: [rpm]
repobase: repo
repo_url: https://packages.example.com
",
        )
        .unwrap()
    }

    #[test]
    fn test_render_str_with_metadata() {
        let renderer = Renderer::default();
        let mut metadata = Metadata::new("/tmp/x");
        metadata.summary = "S".to_string();
        let out = renderer
            .render_str("{{ metadata.summary }}-{{ metadata.release }}", context! { metadata => &metadata })
            .unwrap();
        assert_eq!(out, "S-0");
    }

    #[test]
    fn test_undefined_is_an_error() {
        let renderer = Renderer::default();
        let err = renderer
            .render_str("{{ metadata.nope }}", context! { metadata => Metadata::new("/tmp/x") })
            .unwrap_err();
        assert!(matches!(err, RenderError::Template { .. }));
    }

    #[test]
    fn test_rpm_spec_lists_files_by_basename() {
        let renderer = Renderer::default();
        let mut metadata = Metadata::new("/tmp/x").with_arch("x86_64");
        metadata.name = "yq".to_string();
        metadata.description = "100% YAML".to_string();
        metadata.changelog = vec![ChangelogEntry::new("Wed May 01 2024 Jane", "Release v4")];
        let files = vec!["/tmp/x/SOURCES/yq".to_string()];

        let spec = renderer
            .render(
                RPM_SPEC,
                context! { files => files, config => config(), metadata => &metadata },
            )
            .unwrap();

        assert!(spec.contains("Name:           yq\n"));
        assert!(spec.contains("BuildArch:      x86_64\n"));
        assert!(spec.contains("Requires:       bash\n"));
        assert!(spec.contains("install -m 0755 /tmp/x/SOURCES/yq %{buildroot}/usr/bin/yq\n"));
        assert!(spec.contains("\n/usr/bin/yq\n"));
        assert!(spec.contains("100%% YAML"));
        assert!(spec.contains("* Wed May 01 2024 Jane\n- Release v4"));
    }

    #[test]
    fn test_override_directory_wins() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(FILE_INDEX), "custom {{ files | length }}").unwrap();
        let renderer = Renderer::new(Some(dir.path().to_path_buf()));
        let out = renderer
            .render(FILE_INDEX, context! { files => vec!["a.rpm", "b.rpm"], target => "rpm" })
            .unwrap();
        assert_eq!(out, "custom 2");
    }

    #[test]
    fn test_unknown_template() {
        assert!(matches!(
            Renderer::default().render("nope.j2", context! {}),
            Err(RenderError::Unknown(_))
        ));
    }
}
