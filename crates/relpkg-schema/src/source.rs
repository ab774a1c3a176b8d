//! Declared upstream sources.
//!
//! A [`Source`] names one upstream (a GitHub repository or a local template
//! file), the architectures it is packaged for and the pattern used to pick
//! release assets. Sources are validated when they are loaded so the
//! resolver can rely on the invariants documented here.

use std::collections::BTreeMap;
use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::Arch;
use crate::config::ConfigError;

/// How a source's artifacts are obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    /// Latest release of a GitHub repository.
    Github,
    /// A local file rendered through the templating engine.
    Template,
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Github => "github",
            Self::Template => "template",
        })
    }
}

/// Named groups every `files_regex` has to expose.
const REQUIRED_GROUPS: [&str; 2] = ["arch", "name"];

/// Asset selection pattern with named groups `arch` and `name`.
///
/// The `arch` group selects assets for the requested architecture; the
/// `name` group is available for renaming, although the package name always
/// wins when artifacts are written.
#[derive(Debug, Clone)]
pub struct FilesRegex(Regex);

/// Captures extracted from a matching asset name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetMatch {
    /// Architecture spelled the upstream way.
    pub arch: String,
    /// Name captured from the asset.
    pub name: String,
}

impl FilesRegex {
    /// Compile `pattern`, checking that it exposes both required groups.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidRegex`] if the pattern does not compile
    /// and [`ConfigError::MissingGroup`] if `arch` or `name` is absent.
    pub fn new(pattern: &str) -> Result<Self, ConfigError> {
        let re = Regex::new(pattern).map_err(|e| ConfigError::InvalidRegex {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;

        for group in REQUIRED_GROUPS {
            if !re.capture_names().flatten().any(|n| n == group) {
                return Err(ConfigError::MissingGroup {
                    pattern: pattern.to_string(),
                    group,
                });
            }
        }
        Ok(Self(re))
    }

    /// Whether `asset` matches at all.
    pub fn is_match(&self, asset: &str) -> bool {
        self.0.is_match(asset)
    }

    /// Captures for `asset`, or `None` if it does not match or one of the
    /// groups did not take part in the match (optional groups).
    pub fn captures(&self, asset: &str) -> Option<AssetMatch> {
        let caps = self.0.captures(asset)?;
        Some(AssetMatch {
            arch: caps.name("arch")?.as_str().to_string(),
            name: caps.name("name")?.as_str().to_string(),
        })
    }

    /// Source pattern.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl Serialize for FilesRegex {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for FilesRegex {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let pattern = String::deserialize(deserializer)?;
        Self::new(&pattern).map_err(serde::de::Error::custom)
    }
}

/// Mapping from a packaging architecture to the identifier upstream uses
/// in asset names (`x86_64` -> `amd64`). Unmapped architectures translate
/// to themselves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArchTranslation(BTreeMap<String, String>);

impl ArchTranslation {
    /// Build from pairs.
    pub fn new(pairs: impl IntoIterator<Item = (String, String)>) -> Self {
        Self(pairs.into_iter().collect())
    }

    /// Upstream spelling of `arch`.
    pub fn translate<'a>(&'a self, arch: &'a Arch) -> &'a str {
        self.0
            .get(arch.as_str())
            .map_or(arch.as_str(), String::as_str)
    }
}

impl Default for ArchTranslation {
    fn default() -> Self {
        Self::new([("x86_64".to_string(), "x86_64".to_string())])
    }
}

/// A validated GitHub repository reference in `owner/repo` format.
///
/// # Example
///
/// ```
/// use relpkg_schema::GitHubRepo;
///
/// let repo = GitHubRepo::new("mikefarah/yq").unwrap();
/// assert_eq!(repo.owner(), "mikefarah");
/// assert_eq!(repo.name(), "yq");
/// assert_eq!(repo.html_url(), "https://github.com/mikefarah/yq");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GitHubRepo(String);

impl GitHubRepo {
    /// Create a new `GitHubRepo`, validating the `owner/repo` format.
    ///
    /// # Errors
    ///
    /// Returns an error string if `s` is not in `owner/repo` format or if
    /// either component is empty.
    pub fn new(s: &str) -> Result<Self, String> {
        let mut parts = s.split('/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(owner), Some(name), None) if !owner.is_empty() && !name.is_empty() => {
                Ok(Self(s.to_string()))
            }
            _ => Err(format!(
                "Invalid GitHub repo format: expected 'owner/repo', got '{s}'"
            )),
        }
    }

    /// Get the owner part.
    pub fn owner(&self) -> &str {
        self.0.split('/').next().unwrap_or("")
    }

    /// Get the repo name part.
    pub fn name(&self) -> &str {
        self.0.split('/').nth(1).unwrap_or("")
    }

    /// Return the raw `owner/repo` string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Canonical browser URL of the repository.
    pub fn html_url(&self) -> String {
        format!("https://github.com/{}", self.0)
    }
}

impl fmt::Display for GitHubRepo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Keys a template source must define in `extra`.
pub const TEMPLATE_EXTRA_KEYS: [&str; 3] = ["summary", "version", "url"];

/// One declared upstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    /// `owner/repo` for GitHub sources, a file path for template sources.
    pub source: String,
    /// Asset selection pattern.
    pub files_regex: FilesRegex,
    /// Resolution strategy.
    #[serde(rename = "type")]
    pub kind: SourceType,
    /// Architectures this source is packaged for, in build order.
    pub arch: Vec<Arch>,
    /// Logical package name.
    pub name: String,
    /// Packaging-to-upstream architecture names.
    #[serde(default)]
    pub arch_translation: ArchTranslation,
    /// Free-form values seeding template sources.
    #[serde(default)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Source {
    /// String value of an `extra` key. Scalars are stringified so that an
    /// unquoted YAML `version: 1.0` still reads as `"1.0"`.
    pub fn extra_str(&self, key: &str) -> Option<String> {
        match self.extra.get(key)? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            serde_json::Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Check the invariants the resolver depends on.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidSource`] naming the first violation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidSource {
            name: self.name.clone(),
            reason,
        };

        if self.name.trim().is_empty() {
            return Err(invalid("name is empty".to_string()));
        }
        if self.name.contains(|c: char| c == '/' || c.is_whitespace()) {
            return Err(invalid("name may not contain '/' or whitespace".to_string()));
        }
        if self.arch.is_empty() {
            return Err(invalid("arch list is empty".to_string()));
        }

        match self.kind {
            SourceType::Github => {
                GitHubRepo::new(&self.source).map_err(invalid)?;
            }
            SourceType::Template => {
                for key in TEMPLATE_EXTRA_KEYS {
                    if self.extra_str(key).is_none() {
                        return Err(invalid(format!("template source needs extra.{key}")));
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_regex_requires_both_groups() {
        assert!(FilesRegex::new(r"^(?P<name>yq)_linux_(?P<arch>\w+)$").is_ok());
        assert!(matches!(
            FilesRegex::new(r"^yq_linux_(?P<arch>\w+)$"),
            Err(ConfigError::MissingGroup { group: "name", .. })
        ));
        assert!(matches!(
            FilesRegex::new(r"^(?P<name>yq"),
            Err(ConfigError::InvalidRegex { .. })
        ));
    }

    #[test]
    fn test_captures() {
        let re = FilesRegex::new(r"^(?P<name>yq)_linux_(?P<arch>\w+)$").unwrap();
        let m = re.captures("yq_linux_amd64").unwrap();
        assert_eq!(m.arch, "amd64");
        assert_eq!(m.name, "yq");
        assert!(re.captures("yq_darwin_amd64.tar.gz").is_none());
    }

    #[test]
    fn test_optional_group_that_did_not_participate() {
        let re = FilesRegex::new(r"^foo(?:_(?P<name>bar))?_(?P<arch>\w+)$").unwrap();
        assert!(re.is_match("foo_amd64"));
        assert!(re.captures("foo_amd64").is_none());
        assert!(re.captures("foo_bar_amd64").is_some());
    }

    #[test]
    fn test_translation_falls_back_to_identity() {
        let t = ArchTranslation::new([("x86_64".to_string(), "amd64".to_string())]);
        assert_eq!(t.translate(&Arch::new("x86_64")), "amd64");
        assert_eq!(t.translate(&Arch::new("aarch64")), "aarch64");
        assert_eq!(ArchTranslation::default().translate(&Arch::new("x86_64")), "x86_64");
    }

    #[test]
    fn test_github_repo_validation() {
        assert!(GitHubRepo::new("owner/repo").is_ok());
        assert!(GitHubRepo::new("owner").is_err());
        assert!(GitHubRepo::new("owner/").is_err());
        assert!(GitHubRepo::new("a/b/c").is_err());
    }

    #[test]
    fn test_source_from_yaml() {
        let yaml = r#"
source: mikefarah/yq
files_regex: '^(?P<name>yq)_linux_(?P<arch>\w+)$'
type: github
arch: [x86_64, aarch64]
name: yq
arch_translation:
  x86_64: amd64
  aarch64: arm64
"#;
        let source: Source = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(source.kind, SourceType::Github);
        assert_eq!(source.arch, vec![Arch::new("x86_64"), Arch::new("aarch64")]);
        assert_eq!(source.arch_translation.translate(&Arch::new("aarch64")), "arm64");
        assert!(source.validate().is_ok());
    }

    #[test]
    fn test_template_source_needs_extra() {
        let yaml = r"
source: templates/repo.j2
files_regex: '^(?P<name>.+)(?P<arch>noarch)$'
type: template
arch: [noarch]
name: the-repo
extra:
  summary: Repository definition
  version: 1.0
";
        let mut source: Source = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(source.extra_str("version").as_deref(), Some("1.0"));
        assert!(matches!(
            source.validate(),
            Err(ConfigError::InvalidSource { .. })
        ));

        source
            .extra
            .insert("url".to_string(), "https://example.com".into());
        assert!(source.validate().is_ok());
    }
}
