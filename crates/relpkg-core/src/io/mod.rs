//! IO modules - side effects (network, external processes)

pub mod download;
pub mod process;
