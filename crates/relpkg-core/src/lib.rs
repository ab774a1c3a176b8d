//! Release resolution, package builds and repository publishing.
//!
//! The [`pipeline::Pipeline`] drives everything: for each configured target
//! it resolves every source and architecture to a set of artifacts, builds
//! a package from them, regenerates the repository index once and finally
//! pushes the tree through git.

pub mod builder;
pub mod github;
pub mod index;
pub mod io;
pub mod paths;
pub mod pipeline;
pub mod publish;
pub mod resolver;
pub mod setup;
pub mod template;
pub mod vcs;

pub use pipeline::{Pipeline, RunReport, TargetReport};
pub use resolver::{ResolveStatus, Resolved, Resolver, Strategy};
pub use template::Renderer;

/// User Agent string for outgoing HTTP requests
pub const USER_AGENT: &str = concat!("relpkg/", env!("CARGO_PKG_VERSION"));
