//! Architecture identifiers and host applicability.

/// Identifier used by sources whose content runs on every host.
pub const NOARCH: &str = "noarch";

/// CPU architecture as declared by a source or reported by the host.
///
/// Architectures are an open set (`x86_64`, `aarch64`, `armv7hl`, ...), so
/// this is a thin newtype rather than an enum. The wildcard [`NOARCH`] marks
/// content that is built on whichever host runs the pipeline.
///
/// # Example
///
/// ```
/// use relpkg_schema::Arch;
///
/// let host = Arch::new("x86_64");
/// assert!(Arch::noarch().applies_to(&host));
/// assert!(!Arch::new("aarch64").applies_to(&host));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct Arch(String);

impl Arch {
    /// Wrap an architecture identifier.
    pub fn new(arch: impl Into<String>) -> Self {
        Self(arch.into())
    }

    /// Architecture of the running machine (matches `uname -m` on Linux).
    pub fn current() -> Self {
        Self(std::env::consts::ARCH.to_string())
    }

    /// The wildcard architecture.
    pub fn noarch() -> Self {
        Self(NOARCH.to_string())
    }

    /// Whether this is the wildcard architecture.
    pub fn is_noarch(&self) -> bool {
        self.0 == NOARCH
    }

    /// Whether a source declaring this architecture is built on `host`.
    pub fn applies_to(&self, host: &Arch) -> bool {
        self.is_noarch() || self == host
    }

    /// Raw identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Arch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for Arch {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || s.contains(char::is_whitespace) {
            return Err(format!("Invalid architecture: '{s}'"));
        }
        Ok(Self(s.to_string()))
    }
}

impl From<&str> for Arch {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noarch_applies_everywhere() {
        assert!(Arch::noarch().applies_to(&Arch::new("x86_64")));
        assert!(Arch::noarch().applies_to(&Arch::new("aarch64")));
    }

    #[test]
    fn test_host_filter() {
        let host = Arch::new("x86_64");
        assert!(Arch::new("x86_64").applies_to(&host));
        assert!(!Arch::new("aarch64").applies_to(&host));
    }

    #[test]
    fn test_from_str_rejects_blank() {
        assert!("".parse::<Arch>().is_err());
        assert!("x86 64".parse::<Arch>().is_err());
        assert_eq!("aarch64".parse::<Arch>().unwrap(), Arch::new("aarch64"));
    }
}
