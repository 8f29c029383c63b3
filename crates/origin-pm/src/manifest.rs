//! Package manifest parsing (pkg.json)
//!
//! ```json
//! {
//!   "name": "my-app",
//!   "version": "1.0.0",
//!   "dependencies": { "math_utils": "^1.0.0" },
//!   "repository": "https://github.com/me/my-app"
//! }
//! ```

use crate::semver::Version;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Manifest file name in a project or package root
pub const MANIFEST_NAME: &str = "pkg.json";

/// Errors that can occur during manifest parsing
#[derive(Debug, Error)]
pub enum ManifestError {
    /// Failed to read manifest file
    #[error("Failed to read manifest file: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse JSON
    #[error("Failed to parse pkg.json: {0}")]
    ParseError(#[from] serde_json::Error),

    /// Validation error
    #[error("Invalid manifest: {0}")]
    ValidationError(String),
}

/// Package manifest (pkg.json)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// Package name
    #[serde(default)]
    pub name: String,

    /// Semver version
    #[serde(default)]
    pub version: String,

    /// Dependency name → version range
    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,

    /// Repository URL, used only when publishing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
}

impl Manifest {
    /// Parse and validate a manifest from a file
    pub fn from_file(path: &Path) -> Result<Self, ManifestError> {
        let manifest = Self::from_file_unchecked(path)?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Parse a manifest from a file without validating it
    ///
    /// Installed libraries are read this way: only their dependency table matters.
    pub fn from_file_unchecked(path: &Path) -> Result<Self, ManifestError> {
        let file = File::open(path)?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }

    /// Parse a manifest from a string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, ManifestError> {
        let manifest: Manifest = serde_json::from_str(content)?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Parse `path` if it exists, otherwise return an empty manifest
    pub fn load_or_default(path: &Path) -> Result<Self, ManifestError> {
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Validate the manifest
    ///
    /// Dependency ranges are only checked for presence here; their syntax is
    /// reported by the auditor or rejected when installing.
    pub fn validate(&self) -> Result<(), ManifestError> {
        if self.name.trim().is_empty() {
            return Err(ManifestError::ValidationError(
                "Package name cannot be empty".to_string(),
            ));
        }

        if Version::parse(&self.version).is_err() {
            return Err(ManifestError::ValidationError(format!(
                "Invalid version: {}. Must be valid semver (e.g., 1.2.3)",
                self.version
            )));
        }

        for (name, range) in &self.dependencies {
            if name.is_empty() {
                return Err(ManifestError::ValidationError(
                    "Dependency name cannot be empty".to_string(),
                ));
            }
            if range.trim().is_empty() {
                return Err(ManifestError::ValidationError(format!(
                    "Dependency '{}' has empty version range",
                    name
                )));
            }
        }

        Ok(())
    }
}

/// Find the project root by walking up from `start_dir` until a pkg.json appears
pub fn find_project_root(start_dir: &Path) -> Option<PathBuf> {
    let mut current = start_dir;

    loop {
        if current.join(MANIFEST_NAME).exists() {
            return Some(current.to_path_buf());
        }

        current = current.parent()?;
    }
}
