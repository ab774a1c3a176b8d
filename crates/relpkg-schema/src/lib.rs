//! Shared types for relpkg.
//!
//! Everything here is plain data: the YAML configuration model, the declared
//! upstream sources, the per-build [`Metadata`] record and the small pure
//! helpers (tag normalisation, asset name matching) that the resolution and
//! build stages in `relpkg-core` rely on.

pub mod arch;
pub mod config;
pub mod metadata;
pub mod source;
pub mod target;
pub mod version;

// Re-exports
pub use arch::*;
pub use config::{Config, ConfigError, Email, Maintainer, load_sources, parse_sources};
pub use metadata::{ChangelogEntry, Metadata, changelog_date};
pub use source::{ArchTranslation, AssetMatch, FilesRegex, GitHubRepo, Source, SourceType};
pub use target::Target;
pub use version::{TagVersion, normalize_tag};
