//! Process-wide configuration and source list loading.
//!
//! Both documents are YAML. They are parsed once at startup and validated
//! eagerly so that malformed input fails before any network or build work
//! starts.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::{Arch, Source, Target};

/// Errors raised while loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A configuration file could not be read.
    #[error("Failed to read {path}: {source}")]
    Io {
        /// File that failed.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The YAML document did not match the expected shape.
    #[error("Parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A maintainer email failed validation.
    #[error("Invalid email address: '{0}'")]
    InvalidEmail(String),

    /// The repository URL is not an absolute http(s) URL.
    #[error("Invalid repository URL '{url}': {reason}")]
    InvalidUrl {
        /// Offending value.
        url: String,
        /// Why it was rejected.
        reason: String,
    },

    /// `files_regex` did not compile.
    #[error("Invalid files_regex '{pattern}': {reason}")]
    InvalidRegex {
        /// Offending pattern.
        pattern: String,
        /// Compiler message.
        reason: String,
    },

    /// `files_regex` lacks a required named group.
    #[error("files_regex '{pattern}' has no named group '{group}'")]
    MissingGroup {
        /// Offending pattern.
        pattern: String,
        /// Missing group name.
        group: &'static str,
    },

    /// A source record violates an invariant.
    #[error("Invalid source '{name}': {reason}")]
    InvalidSource {
        /// Source name.
        name: String,
        /// Violation.
        reason: String,
    },

    /// Two sources build the same package for the same architecture.
    #[error("Source '{name}' is declared more than once for {arch}")]
    DuplicateSource {
        /// Source name.
        name: String,
        /// Architecture both declarations cover.
        arch: Arch,
    },

    /// Structural problem with the config document itself.
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// A syntactically valid email address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Email(String);

impl Email {
    /// Validate `s` as `local@domain.tld`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidEmail`] when the address is malformed.
    pub fn new(s: &str) -> Result<Self, ConfigError> {
        let s = s.trim();
        let invalid = || ConfigError::InvalidEmail(s.to_string());

        let (local, domain) = s.split_once('@').ok_or_else(invalid)?;
        if local.is_empty() || domain.contains('@') || s.contains(char::is_whitespace) {
            return Err(invalid());
        }
        let labels: Vec<&str> = domain.split('.').collect();
        if labels.len() < 2 || labels.iter().any(|l| l.is_empty()) {
            return Err(invalid());
        }
        Ok(Self(s.to_string()))
    }

    /// The address.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Email {
    type Error = ConfigError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(&s)
    }
}

impl From<Email> for String {
    fn from(e: Email) -> Self {
        e.0
    }
}

impl fmt::Display for Email {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A person credited as packager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Maintainer {
    /// Display name.
    pub name: String,
    /// Contact address.
    pub email: Email,
}

impl fmt::Display for Maintainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <{}>", self.name, self.email)
    }
}

/// Process-wide configuration, read once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Packagers credited in every package.
    pub maintainers: Vec<Maintainer>,
    /// Formats to publish, in order.
    pub targets: Vec<Target>,
    /// Root of the published repository tree.
    pub repobase: PathBuf,
    /// Public URL the repository tree is served from.
    pub repo_url: Url,
    /// Package shipping the repository definition, linked from the setup page.
    #[serde(default)]
    pub repo_package: Option<String>,
    /// Directory whose templates override the built-in ones.
    #[serde(default)]
    pub templates: Option<PathBuf>,
}

impl Config {
    /// Parse and validate a YAML document.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the document does not parse or fails
    /// validation.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, otherwise see
    /// [`Config::from_yaml`].
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        Self::from_yaml(&read(path)?)
    }

    /// Check invariants not expressible in the serde model.
    ///
    /// # Errors
    ///
    /// Returns the first violation found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.maintainers.is_empty() {
            return Err(ConfigError::Invalid(
                "at least one maintainer is required".to_string(),
            ));
        }
        if !matches!(self.repo_url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidUrl {
                url: self.repo_url.to_string(),
                reason: "scheme must be http or https".to_string(),
            });
        }
        if self.repo_url.host_str().is_none() {
            return Err(ConfigError::InvalidUrl {
                url: self.repo_url.to_string(),
                reason: "missing host".to_string(),
            });
        }
        Ok(())
    }

    /// `Name <email>` of every maintainer, comma separated.
    pub fn packager(&self) -> String {
        self.maintainers
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Directory holding the repository for `target`.
    pub fn repo_dir(&self, target: Target) -> PathBuf {
        self.repobase.join(target.as_str())
    }

    /// `repo_url` without a trailing slash, for joining in templates.
    pub fn base_url(&self) -> &str {
        self.repo_url.as_str().trim_end_matches('/')
    }
}

/// Parse and validate a YAML list of sources.
///
/// # Errors
///
/// Returns a [`ConfigError`] if the document does not parse, a source is
/// invalid, or two sources declare the same name for the same architecture.
pub fn parse_sources(content: &str) -> Result<Vec<Source>, ConfigError> {
    let sources: Vec<Source> = serde_yaml::from_str(content)?;

    let mut seen = HashSet::new();
    for source in &sources {
        source.validate()?;
        for arch in &source.arch {
            if !seen.insert((source.name.as_str(), arch)) {
                return Err(ConfigError::DuplicateSource {
                    name: source.name.clone(),
                    arch: arch.clone(),
                });
            }
        }
    }
    Ok(sources)
}

/// Read and parse the source list at `path`.
///
/// # Errors
///
/// See [`parse_sources`]; additionally [`ConfigError::Io`] on read failure.
pub fn load_sources(path: &Path) -> Result<Vec<Source>, ConfigError> {
    parse_sources(&read(path)?)
}

fn read(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}
