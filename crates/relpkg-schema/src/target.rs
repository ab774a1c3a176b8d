//! Package formats a repository is published in.

use crate::Metadata;

/// Package format a repository is published in.
///
/// Each variant owns one directory under the repository base
/// (`<repobase>/rpm`) and one file naming convention.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Target {
    /// RPM packages built with `rpmbuild`, indexed with `createrepo`.
    Rpm,
}

impl Target {
    /// Directory name under the repository base, also the config spelling.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Rpm => "rpm",
        }
    }

    /// File extension of produced packages.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Rpm => "rpm",
        }
    }

    /// File name the packaging tool produces for `metadata` built for `arch`.
    ///
    /// ```
    /// use relpkg_schema::{Metadata, Target};
    ///
    /// let mut m = Metadata::new("/tmp/scratch");
    /// m.name = "yq".into();
    /// m.version = "4.44.1".into();
    /// m.release = "0".into();
    /// assert_eq!(Target::Rpm.package_file_name(&m, "x86_64"), "yq-4.44.1-0.x86_64.rpm");
    /// ```
    pub fn package_file_name(self, metadata: &Metadata, arch: &str) -> String {
        match self {
            Self::Rpm => format!(
                "{}-{}-{}.{arch}.rpm",
                metadata.name, metadata.version, metadata.release
            ),
        }
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Target {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "rpm" => Ok(Self::Rpm),
            _ => Err(format!("Unknown target: {s}")),
        }
    }
}
