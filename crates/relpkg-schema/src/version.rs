//! Upstream tag normalisation.
//!
//! Release tags arrive in whatever shape the upstream project likes
//! (`v1.2.3`, `1.2.3`, `v1.2.3-2`). Packaging tools want a bare version
//! plus an optional release counter, so tags are split here once.

/// Version and optional release counter derived from an upstream tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagVersion {
    /// Version without a leading `v` and without the release suffix.
    pub version: String,
    /// Second hyphen-separated field of the tag, when present.
    pub release: Option<String>,
}

/// Normalise an upstream release tag.
///
/// A leading `v` is stripped only when it is immediately followed by a
/// digit (`v1.0` becomes `1.0`, `vim-9` stays untouched). If the tag contains
/// a hyphen, the text before the first hyphen is the version and the next
/// field is the release.
///
/// # Example
///
/// ```
/// use relpkg_schema::normalize_tag;
///
/// let t = normalize_tag("v1.2.3-2");
/// assert_eq!(t.version, "1.2.3");
/// assert_eq!(t.release.as_deref(), Some("2"));
/// ```
pub fn normalize_tag(tag: &str) -> TagVersion {
    let tag = tag.trim();
    let stripped = match tag.strip_prefix('v') {
        Some(rest) if rest.starts_with(|c: char| c.is_ascii_digit()) => rest,
        _ => tag,
    };

    let mut fields = stripped.split('-');
    let version = fields.next().unwrap_or_default().to_string();
    let release = fields
        .next()
        .filter(|r| !r.is_empty())
        .map(ToString::to_string);

    TagVersion { version, release }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_leading_v_before_digit() {
        let t = normalize_tag("v1.2.3");
        assert_eq!(t.version, "1.2.3");
        assert_eq!(t.release, None);
    }

    #[test]
    fn test_hyphen_suffix_becomes_release() {
        let t = normalize_tag("v1.2.3-2");
        assert_eq!(t.version, "1.2.3");
        assert_eq!(t.release.as_deref(), Some("2"));
    }

    #[test]
    fn test_plain_version_is_unchanged() {
        let t = normalize_tag("1.2.3");
        assert_eq!(t.version, "1.2.3");
        assert_eq!(t.release, None);
    }

    #[test]
    fn test_v_without_digit_is_kept() {
        assert_eq!(normalize_tag("vim9").version, "vim9");
        assert_eq!(normalize_tag("v").version, "v");
    }

    #[test]
    fn test_only_second_field_is_release() {
        let t = normalize_tag("v2.0.0-rc-1");
        assert_eq!(t.version, "2.0.0");
        assert_eq!(t.release.as_deref(), Some("rc"));
    }

    #[test]
    fn test_trailing_hyphen_has_no_release() {
        assert_eq!(normalize_tag("1.0-").release, None);
    }
}
