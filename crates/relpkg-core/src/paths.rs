use std::path::PathBuf;

/// Returns the cache directory, or None if no user cache location exists.
///
/// `RELPKG_CACHE_DIR` overrides the platform default
/// (`~/.cache/relpkg` on Linux).
pub fn cache_dir() -> Option<PathBuf> {
    if let Ok(val) = std::env::var("RELPKG_CACHE_DIR") {
        return Some(PathBuf::from(val));
    }
    dirs::cache_dir().map(|c| c.join("relpkg"))
}

/// Release descriptor cache: `<cache_dir>/releases.json`
pub fn release_cache_path() -> Option<PathBuf> {
    cache_dir().map(|c| c.join("releases.json"))
}
