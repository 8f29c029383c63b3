//! Package registry
//!
//! The registry is a flat JSON object mapping `name@version` keys to the URL a
//! package can be fetched from:
//!
//! ```json
//! {
//!   "std/math@1.0.0": "https://example.com/math-1.0.0.tar.gz",
//!   "std/math@1.1.0": "https://example.com/math-1.1.0.tar.gz"
//! }
//! ```
//!
//! It lives at `~/.origin/registry.json` unless another path is configured,
//! is read lazily on first use, and stays cached for the life of the
//! [`Registry`] value.

use crate::range::VersionRange;
use crate::semver::{SemverError, Version};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Registry file name inside the `.origin` home directory
pub const REGISTRY_FILE: &str = "registry.json";

/// Errors that can occur during registry operations
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Failed to read the registry file
    #[error("Failed to load registry {path}: {source}")]
    Read { path: PathBuf, source: io::Error },

    /// Registry file is not valid JSON
    #[error("Invalid registry file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// Registry root is not a JSON object
    #[error("Registry file {0} must contain a JSON object")]
    NotAnObject(PathBuf),

    /// An entry maps to something other than a URL string
    #[error("Registry entry '{key}' in {path} must map to a URL string")]
    InvalidEntry { path: PathBuf, key: String },

    /// Failed to write the registry file
    #[error("Failed to write registry {path}: {source}")]
    Write { path: PathBuf, source: io::Error },

    /// Home directory could not be determined
    #[error("Could not determine home directory for the default registry")]
    NoHomeDir,

    /// Caller-supplied range is malformed
    #[error(transparent)]
    Range(#[from] SemverError),
}

/// File-backed registry of `name@version -> url` entries
#[derive(Debug, Clone)]
pub struct Registry {
    path: PathBuf,
    cache: Option<BTreeMap<String, String>>,
}

impl Registry {
    /// Create a registry backed by `path`; nothing is read until first use
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cache: None,
        }
    }

    /// Registry at the default location (`~/.origin/registry.json`)
    pub fn open_default() -> Result<Self, RegistryError> {
        Self::default_path()
            .map(Self::new)
            .ok_or(RegistryError::NoHomeDir)
    }

    /// Default registry path, if a home directory exists
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".origin").join(REGISTRY_FILE))
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Drop the in-memory copy so the next access re-reads the file
    pub fn invalidate(&mut self) {
        self.cache = None;
    }

    /// Load the registry, reusing the cached copy when present
    fn entries(&mut self) -> Result<&BTreeMap<String, String>, RegistryError> {
        if self.cache.is_none() {
            let loaded = load_entries(&self.path)?;
            debug!(path = %self.path.display(), entries = loaded.len(), "loaded registry");
            self.cache = Some(loaded);
        }
        Ok(self.cache.get_or_insert_with(BTreeMap::new))
    }

    /// Look up the URL for an exact `name@version`
    pub fn resolve(&mut self, name: &str, version: &str) -> Result<Option<String>, RegistryError> {
        let key = format!("{}@{}", name, version);
        Ok(self.entries()?.get(&key).cloned())
    }

    /// All parseable versions of `name`, sorted ascending, with their URLs
    ///
    /// Entries whose version suffix is not valid semver are skipped.
    pub fn versions(&mut self, name: &str) -> Result<Vec<(Version, String)>, RegistryError> {
        let prefix = format!("{}@", name);
        let mut versions: Vec<(Version, String)> = self
            .entries()?
            .iter()
            .filter_map(|(key, url)| {
                let suffix = key.strip_prefix(&prefix)?;
                match Version::parse(suffix) {
                    Ok(v) => Some((v, url.clone())),
                    Err(e) => {
                        debug!(key = %key, error = %e, "skipping unparseable registry entry");
                        None
                    }
                }
            })
            .collect();

        versions.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(versions)
    }

    /// Check whether the registry has any entry for `name`
    pub fn has_package(&mut self, name: &str) -> Result<bool, RegistryError> {
        let prefix = format!("{}@", name);
        Ok(self.entries()?.keys().any(|k| k.starts_with(&prefix)))
    }

    /// Find the highest version of `name` that satisfies `range`
    pub fn resolve_range(
        &mut self,
        name: &str,
        range: &str,
    ) -> Result<Option<(Version, String)>, RegistryError> {
        let range = VersionRange::parse(range)?;
        Ok(self
            .versions(name)?
            .into_iter()
            .filter(|(v, _)| range.satisfies(v))
            .max_by(|a, b| a.0.cmp(&b.0)))
    }

    /// Highest non-prerelease version of `name`
    pub fn latest_stable(&mut self, name: &str) -> Result<Option<Version>, RegistryError> {
        Ok(self
            .versions(name)?
            .into_iter()
            .map(|(v, _)| v)
            .filter(|v| !v.is_prerelease())
            .max())
    }

    /// Insert or overwrite an entry and persist the registry
    ///
    /// The cached copy only changes once the file has been written.
    pub fn add_alias(&mut self, key: &str, url: &str) -> Result<(), RegistryError> {
        let mut updated = self.entries()?.clone();
        updated.insert(key.to_string(), url.to_string());

        write_entries(&self.path, &updated)?;
        self.cache = Some(updated);
        Ok(())
    }

    /// Copy of every entry
    pub fn list_aliases(&mut self) -> Result<BTreeMap<String, String>, RegistryError> {
        Ok(self.entries()?.clone())
    }
}

fn load_entries(path: &Path) -> Result<BTreeMap<String, String>, RegistryError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
        Err(source) => {
            return Err(RegistryError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    let value: serde_json::Value =
        serde_json::from_str(&content).map_err(|source| RegistryError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

    let serde_json::Value::Object(object) = value else {
        return Err(RegistryError::NotAnObject(path.to_path_buf()));
    };

    object
        .into_iter()
        .map(|(key, value)| match value {
            serde_json::Value::String(url) => Ok((key, url)),
            _ => Err(RegistryError::InvalidEntry {
                path: path.to_path_buf(),
                key,
            }),
        })
        .collect()
}

fn write_entries(path: &Path, entries: &BTreeMap<String, String>) -> Result<(), RegistryError> {
    let write_err = |source| RegistryError::Write {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(write_err)?;
    }

    let mut content = serde_json::to_string_pretty(entries)
        .map_err(|e| write_err(io::Error::new(io::ErrorKind::InvalidData, e)))?;
    content.push('\n');
    fs::write(path, content).map_err(write_err)
}

/// Split a package spec into name and optional version/range
///
/// The split happens at the last `@` so scoped names keep their prefix:
/// `@org/pkg@^1.0.0` → (`@org/pkg`, `^1.0.0`).
pub fn parse_package_spec(spec: &str) -> (&str, Option<&str>) {
    match spec.rfind('@') {
        Some(0) | None => (spec, None),
        Some(at) => (&spec[..at], Some(&spec[at + 1..])),
    }
}
