//! Subcommand implementations.
//!
//! Each command returns the process exit code on success; errors bubble up
//! to `main`, which prints them and exits with 1.

use origin_pm::Config;
use std::path::PathBuf;
use tracing::debug;

pub mod add;
pub mod audit;
pub mod registry;
pub mod remove;

/// Configuration for the project around the current directory
pub fn load_config(registry: Option<PathBuf>) -> anyhow::Result<Config> {
    let cwd = std::env::current_dir()?;
    let config = Config::discover(&cwd);

    let config = match registry {
        Some(path) => config.with_registry_path(path),
        None => config,
    };

    debug!(
        root = %config.project_root.display(),
        registry = %config.registry_path.display(),
        "resolved configuration"
    );
    Ok(config)
}
