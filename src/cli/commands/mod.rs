//! CLI command implementations

pub mod archive;
pub mod completions;
pub mod config;
pub mod extract;
pub mod import;
pub mod init;
pub mod seed;
pub mod slugs;
