//! # Configuration System
//!
//! Configuration for the project review sync client.
//!
//! This crate provides:
//! - Configuration structures for the remote store, sync scheduling, the
//!   local mirror, the workspace and observability
//! - Environment variable loading
//! - Configuration file loading (TOML/YAML)
//! - Configuration precedence (CLI > env > file > defaults)
//! - Configuration validation

pub mod config;
pub mod file_loader;
pub mod loader;
pub mod precedence;
pub mod validation;

pub use config::{
    Config, MirrorConfig, ObservabilityConfig, RemoteConfig, SyncConfig, WorkspaceConfig,
};
pub use file_loader::{ConfigFileError, FileFormat, load_from_file, load_from_toml, load_from_yaml};
pub use loader::load_from_env;
pub use precedence::merge_configs;
pub use validation::validate;
pub use validator::Validate;

use std::path::Path;

/// Defaults, then `file` when given, then the environment, then `overrides`.
/// The result is validated.
pub fn load(
    file: Option<&Path>,
    overrides: Option<Config>,
) -> Result<Config, Box<dyn std::error::Error>> {
    let from_file = match file {
        Some(path) => load_from_file(path)?,
        None => Config::default(),
    };
    let from_env = load_from_env()?;

    let config = merge_configs(
        Config::default(),
        from_file,
        "file",
        from_env,
        "env",
        overrides,
        "cli",
    );
    validate(&config)?;
    Ok(config)
}
