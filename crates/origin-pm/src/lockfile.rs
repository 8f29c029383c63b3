//! Lockfile management (origin.lock)
//!
//! The lockfile records the exact version and checksum of every installed
//! package:
//!
//! ```json
//! {
//!   "packages": {
//!     "math_utils": {
//!       "checksum": "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08",
//!       "version": "1.2.0"
//!     }
//!   }
//! }
//! ```
//!
//! Object keys are sorted at every nesting level and indentation is fixed at
//! two spaces, so the same dependency set always produces the same bytes.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Lockfile name in the project root
pub const LOCKFILE_NAME: &str = "origin.lock";

/// Top-level key holding the package table
const PACKAGES_KEY: &str = "packages";

/// Errors that can occur during lockfile operations
#[derive(Debug, Error)]
pub enum LockfileError {
    /// Failed to read lockfile
    #[error("Failed to load lockfile {path}: {source}")]
    Read { path: PathBuf, source: io::Error },

    /// Failed to parse JSON
    #[error("Invalid lockfile {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// Root is not a JSON object
    #[error("Lockfile {0} must contain a JSON object")]
    NotAnObject(PathBuf),

    /// `packages` is present but not an object
    #[error("Lockfile {0} has a non-object \"packages\" table")]
    InvalidPackages(PathBuf),

    /// A package entry lacks a version or checksum string
    #[error("Invalid lockfile entry for package '{name}': {source}")]
    InvalidEntry {
        name: String,
        source: serde_json::Error,
    },

    /// Failed to write lockfile
    #[error("Failed to write lockfile {path}: {source}")]
    Write { path: PathBuf, source: io::Error },
}

/// A locked package with exact version and checksum
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockEntry {
    /// Exact version
    pub version: String,

    /// SHA-256 checksum (hex-encoded)
    pub checksum: String,
}

impl LockEntry {
    pub fn new(version: impl Into<String>, checksum: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            checksum: checksum.into(),
        }
    }
}

/// Lockfile handle with an in-memory copy of the last loaded or saved data
#[derive(Debug, Clone)]
pub struct Lockfile {
    path: PathBuf,
    data: Option<Map<String, Value>>,
}

impl Lockfile {
    /// Create a handle for the lockfile at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            data: None,
        }
    }

    /// Handle for `<project_root>/origin.lock`
    pub fn for_project(project_root: &Path) -> Self {
        Self::new(project_root.join(LOCKFILE_NAME))
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the lockfile data
    ///
    /// A missing file yields an empty object. The result is cached until the
    /// next successful [`save`](Self::save), [`clear`](Self::clear) or
    /// [`reload`](Self::reload).
    pub fn load(&mut self) -> Result<&Map<String, Value>, LockfileError> {
        if self.data.is_none() {
            self.data = Some(read_object(&self.path)?);
        }
        Ok(self.data.get_or_insert_with(Map::new))
    }

    /// Discard the cached copy and read the file again
    pub fn reload(&mut self) -> Result<&Map<String, Value>, LockfileError> {
        self.data = None;
        self.load()
    }

    /// Write `data` with recursively sorted keys
    ///
    /// Parent directories are created as needed. The cached copy is replaced
    /// only after the write succeeds.
    pub fn save(&mut self, data: Map<String, Value>) -> Result<(), LockfileError> {
        let write_err = |source| LockfileError::Write {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }

        let content = to_canonical_json(&Value::Object(data.clone()));
        fs::write(&self.path, content).map_err(write_err)?;
        debug!(path = %self.path.display(), "wrote lockfile");

        self.data = Some(data);
        Ok(())
    }

    /// Record `name` at `version`; an existing entry for `name` is replaced
    pub fn add_package(&mut self, name: &str, version: &str, checksum: &str) -> Result<(), LockfileError> {
        let mut data = self.load()?.clone();

        let packages = data
            .entry(PACKAGES_KEY)
            .or_insert_with(|| Value::Object(Map::new()));
        let Value::Object(packages) = packages else {
            return Err(LockfileError::InvalidPackages(self.path.clone()));
        };

        packages.insert(
            name.to_string(),
            serde_json::json!({ "version": version, "checksum": checksum }),
        );

        self.save(data)
    }

    /// Get the entry for `name`
    pub fn get_package(&mut self, name: &str) -> Result<Option<LockEntry>, LockfileError> {
        let path = self.path.clone();
        match packages_table(self.load()?, &path)?.and_then(|p| p.get(name)) {
            Some(value) => parse_entry(name, value).map(Some),
            None => Ok(None),
        }
    }

    /// Check whether `name` is locked
    pub fn has_package(&mut self, name: &str) -> Result<bool, LockfileError> {
        Ok(self.get_package(name)?.is_some())
    }

    /// Remove `name`; removing an absent package is not an error
    pub fn remove_package(&mut self, name: &str) -> Result<(), LockfileError> {
        let path = self.path.clone();
        let present = packages_table(self.load()?, &path)?.is_some_and(|p| p.contains_key(name));
        if !present {
            return Ok(());
        }

        let mut data = self.load()?.clone();
        if let Some(Value::Object(packages)) = data.get_mut(PACKAGES_KEY) {
            packages.remove(name);
        }
        self.save(data)
    }

    /// Every locked package, keyed by name
    pub fn get_all_packages(&mut self) -> Result<BTreeMap<String, LockEntry>, LockfileError> {
        let path = self.path.clone();
        let Some(packages) = packages_table(self.load()?, &path)? else {
            return Ok(BTreeMap::new());
        };

        packages
            .iter()
            .map(|(name, value)| Ok((name.clone(), parse_entry(name, value)?)))
            .collect()
    }

    /// Forget all data and delete the backing file if present
    pub fn clear(&mut self) -> Result<(), LockfileError> {
        self.data = Some(Map::new());
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(LockfileError::Write {
                path: self.path.clone(),
                source,
            }),
        }
    }
}

fn read_object(path: &Path) -> Result<Map<String, Value>, LockfileError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Map::new()),
        Err(source) => {
            return Err(LockfileError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    match serde_json::from_str(&content) {
        Ok(Value::Object(object)) => Ok(object),
        Ok(_) => Err(LockfileError::NotAnObject(path.to_path_buf())),
        Err(source) => Err(LockfileError::Parse {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn packages_table<'a>(
    data: &'a Map<String, Value>,
    path: &Path,
) -> Result<Option<&'a Map<String, Value>>, LockfileError> {
    match data.get(PACKAGES_KEY) {
        None => Ok(None),
        Some(Value::Object(packages)) => Ok(Some(packages)),
        Some(_) => Err(LockfileError::InvalidPackages(path.to_path_buf())),
    }
}

fn parse_entry(name: &str, value: &Value) -> Result<LockEntry, LockfileError> {
    LockEntry::deserialize(value).map_err(|source| LockfileError::InvalidEntry {
        name: name.to_string(),
        source,
    })
}

/// Serialize `value` with object keys sorted at every level
///
/// Output uses two-space indentation and ends with a newline.
pub fn to_canonical_json(value: &Value) -> String {
    let sorted = sort_keys(value);
    // Serializing a `Value` cannot fail: every key is already a string
    let mut out = serde_json::to_string_pretty(&sorted).unwrap_or_default();
    out.push('\n');
    out
}

fn sort_keys(value: &Value) -> Value {
    match value {
        Value::Object(object) => {
            let mut entries: Vec<(&String, &Value)> = object.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.clone(), sort_keys(v)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_keys).collect()),
        other => other.clone(),
    }
}
