//! Project configuration
//!
//! Paths and tuning knobs shared by [`PackageManager`](crate::install::PackageManager)
//! and [`DependencyAuditor`](crate::audit::DependencyAuditor).

use crate::fetch::RetryPolicy;
use crate::lockfile::LOCKFILE_NAME;
use crate::manifest::{find_project_root, MANIFEST_NAME};
use crate::registry::{Registry, REGISTRY_FILE};
use std::path::{Path, PathBuf};

/// Project-local state directory
pub const ORIGIN_DIR: &str = ".origin";

/// Install root inside [`ORIGIN_DIR`]
pub const LIBS_DIR: &str = "libs";

/// Environment variable overriding the registry location
pub const REGISTRY_ENV: &str = "ORIGIN_REGISTRY";

/// Resolved configuration for one project
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Directory containing `pkg.json`
    pub project_root: PathBuf,
    /// Where packages are installed (`<root>/.origin/libs`)
    pub lib_dir: PathBuf,
    /// `<root>/origin.lock`
    pub lockfile_path: PathBuf,
    /// `<root>/pkg.json`
    pub manifest_path: PathBuf,
    /// Registry JSON file
    pub registry_path: PathBuf,
    /// Download retry schedule
    pub retry: RetryPolicy,
}

impl Config {
    /// Configuration rooted at `project_root`
    ///
    /// The registry comes from `$ORIGIN_REGISTRY`, then `~/.origin/registry.json`,
    /// falling back to a relative `.origin/registry.json` without a home directory.
    pub fn for_project(project_root: impl Into<PathBuf>) -> Self {
        let project_root = project_root.into();
        let registry_path = std::env::var_os(REGISTRY_ENV)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .or_else(Registry::default_path)
            .unwrap_or_else(|| PathBuf::from(ORIGIN_DIR).join(REGISTRY_FILE));

        Self {
            lib_dir: project_root.join(ORIGIN_DIR).join(LIBS_DIR),
            lockfile_path: project_root.join(LOCKFILE_NAME),
            manifest_path: project_root.join(MANIFEST_NAME),
            registry_path,
            retry: RetryPolicy::default(),
            project_root,
        }
    }

    /// Configuration for the project enclosing `start_dir`
    ///
    /// Without an enclosing `pkg.json`, `start_dir` itself is used as the root.
    pub fn discover(start_dir: &Path) -> Self {
        let root = find_project_root(start_dir).unwrap_or_else(|| start_dir.to_path_buf());
        Self::for_project(root)
    }

    /// Use a specific registry file
    pub fn with_registry_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.registry_path = path.into();
        self
    }

    /// Use a specific retry policy
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Install directory for `name`
    pub fn package_dir(&self, name: &str) -> PathBuf {
        self.lib_dir.join(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_paths() {
        let config = Config::for_project("/work/app").with_registry_path("/tmp/reg.json");
        assert_eq!(config.lib_dir, PathBuf::from("/work/app/.origin/libs"));
        assert_eq!(config.lockfile_path, PathBuf::from("/work/app/origin.lock"));
        assert_eq!(config.manifest_path, PathBuf::from("/work/app/pkg.json"));
        assert_eq!(config.registry_path, PathBuf::from("/tmp/reg.json"));
        assert_eq!(config.package_dir("math"), PathBuf::from("/work/app/.origin/libs/math"));
        assert_eq!(config.retry, RetryPolicy::default());
    }

    #[test]
    fn test_discover_walks_up() {
        let temp = tempfile::tempdir().unwrap();
        std::fs::write(temp.path().join(MANIFEST_NAME), r#"{"name":"a","version":"1.0.0"}"#).unwrap();
        let nested = temp.path().join("src");
        std::fs::create_dir(&nested).unwrap();

        assert_eq!(Config::discover(&nested).project_root, temp.path());
    }
}
