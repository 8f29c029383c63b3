//! Package installation
//!
//! [`PackageManager::add`] runs one pipeline per call:
//!
//! 1. classify the source (registry spec, URL, local archive, local directory)
//! 2. download and extract into a scoped temporary directory
//! 3. verify the SHA-256 checksum
//! 4. refuse to overwrite an installed package unless updating
//! 5. stage a copy inside `<project>/.origin/libs` and rename it to `<name>`
//! 6. record registry installs in the lockfile
//!
//! Nothing reaches `<name>` before the rename in step 5, so a failed download,
//! extraction, checksum or copy leaves the project untouched.

use crate::archive::{self, copy_dir_all, is_archive_file, single_top_level_dir, ArchiveError};
use crate::config::Config;
use crate::fetch::{checksums_match, compute_file_checksum, is_url, url_file_name, FetchError, UrlFetcher};
use crate::lockfile::{Lockfile, LockfileError};
use crate::manifest::{Manifest, ManifestError};
use crate::registry::{parse_package_spec, Registry, RegistryError};
use crate::semver::Version;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use tempfile::TempDir;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors that can occur while installing or removing packages
#[derive(Debug, Error)]
pub enum PackageError {
    /// No pkg.json in the project root
    #[error("No pkg.json found in {0}")]
    MissingManifest(PathBuf),

    /// pkg.json exists but is invalid
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    /// Source path does not exist
    #[error("Cannot find library at {0}")]
    SourceNotFound(String),

    /// Source is a file of an unsupported type
    #[error("Unsupported archive format: {0}")]
    UnsupportedArchive(String),

    /// URL has no file name to install under
    #[error("Could not determine filename from URL: {0}")]
    InvalidSource(String),

    /// Package name would escape the install root
    #[error("Invalid package name: '{0}'")]
    InvalidName(String),

    /// Extraction failed or the archive layout is wrong
    #[error(transparent)]
    Archive(#[from] ArchiveError),

    /// Download failed
    #[error(transparent)]
    Network(#[from] FetchError),

    /// Downloaded or local file does not match its checksum
    #[error("Checksum verification failed for {file}. Expected: {expected}, Got: {actual}")]
    ChecksumMismatch {
        file: String,
        expected: String,
        actual: String,
    },

    /// Destination already exists and update was not requested
    #[error("Library '{0}' already installed.")]
    AlreadyInstalled(String),

    /// Nothing installed under that name
    #[error("No installed lib named '{0}'.")]
    NotInstalled(String),

    /// No registry version satisfies the requested range
    #[error("No version of '{name}' in the registry satisfies '{range}'")]
    NoMatchingVersion { name: String, range: String },

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Lockfile(#[from] LockfileError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Options for [`PackageManager::add`]
#[derive(Debug, Clone, Default)]
pub struct AddOptions {
    /// Expected SHA-256 of the archive or downloaded file
    pub checksum: Option<String>,
    /// Replace an existing installation instead of failing
    pub update: bool,
}

/// Where a package comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// `name@range` resolved through the registry
    Registry { name: String, range: String },
    /// `http://`, `https://` or `file://` URL
    Remote(String),
    /// `.tar`, `.tar.gz` or `.zip` on disk
    LocalArchive(PathBuf),
    /// Directory copied as-is
    LocalDir(PathBuf),
}

/// Result of a successful install
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallOutcome {
    /// Name under the install root
    pub name: String,
    /// Installed path
    pub path: PathBuf,
    /// Resolved version for registry installs
    pub version: Option<Version>,
    /// SHA-256 of the fetched file, when one was fetched
    pub checksum: Option<String>,
    /// File name whose checksum was verified
    pub verified: Option<String>,
    /// An existing installation was replaced
    pub replaced: bool,
}

/// Installs and removes packages for one project
#[derive(Debug)]
pub struct PackageManager {
    config: Config,
    registry: Registry,
    lockfile: Lockfile,
    fetcher: UrlFetcher,
}

impl PackageManager {
    /// Open the project described by `config`; its pkg.json must exist
    pub fn new(config: Config) -> Result<Self, PackageError> {
        if !config.manifest_path.is_file() {
            return Err(PackageError::MissingManifest(config.project_root.clone()));
        }

        Manifest::from_file(&config.manifest_path)?;
        let registry = Registry::new(&config.registry_path);
        let lockfile = Lockfile::new(&config.lockfile_path);
        let fetcher = UrlFetcher::with_retry(config.retry)?;

        Ok(Self {
            config,
            registry,
            lockfile,
            fetcher,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Check whether something is installed under `name`
    pub fn is_installed(&self, name: &str) -> bool {
        self.config.package_dir(name).exists()
    }

    /// Decide how `source` will be installed
    ///
    /// A `name@range` spec is only treated as a registry install when the
    /// registry knows `name`; otherwise it falls through to URL and path checks.
    pub fn classify(&mut self, source: &str) -> Result<Source, PackageError> {
        if is_url(source) {
            return Ok(Source::Remote(source.to_string()));
        }

        if let (name, Some(range)) = parse_package_spec(source) {
            if !name.is_empty() && self.registry.has_package(name)? {
                return Ok(Source::Registry {
                    name: name.to_string(),
                    range: range.to_string(),
                });
            }
        }

        let path = PathBuf::from(source);
        if path.is_file() {
            if is_archive_file(&path) {
                Ok(Source::LocalArchive(path))
            } else {
                Err(PackageError::UnsupportedArchive(source.to_string()))
            }
        } else if path.is_dir() {
            Ok(Source::LocalDir(path))
        } else {
            Err(PackageError::SourceNotFound(source.to_string()))
        }
    }

    /// Install a package from `source`
    pub fn add(&mut self, source: &str, options: &AddOptions) -> Result<InstallOutcome, PackageError> {
        let kind = self.classify(source)?;
        debug!(source, ?kind, "classified package source");

        fs::create_dir_all(&self.config.lib_dir)?;

        let outcome = match kind {
            Source::LocalDir(path) => self.install_local_dir(&path, options)?,
            Source::LocalArchive(path) => self.install_local_archive(&path, options)?,
            Source::Remote(url) => self.install_remote(&url, options)?,
            Source::Registry { name, range } => self.install_from_registry(&name, &range, options)?,
        };

        info!(name = %outcome.name, path = %outcome.path.display(), "installed package");
        Ok(outcome)
    }

    fn install_local_dir(&mut self, src: &Path, options: &AddOptions) -> Result<InstallOutcome, PackageError> {
        if options.checksum.is_some() {
            warn!(src = %src.display(), "checksum ignored for directory sources");
        }

        let name = match src.file_name() {
            Some(name) => name.to_string_lossy().into_owned(),
            None => fs::canonicalize(src)?
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or_else(|| PackageError::InvalidName(src.display().to_string()))?,
        };

        let (path, replaced) = self.place(&name, src, options.update)?;
        Ok(InstallOutcome {
            name,
            path,
            version: None,
            checksum: None,
            verified: None,
            replaced,
        })
    }

    fn install_local_archive(
        &mut self,
        archive_path: &Path,
        options: &AddOptions,
    ) -> Result<InstallOutcome, PackageError> {
        let actual = compute_file_checksum(archive_path)?;
        let verified = match &options.checksum {
            Some(expected) => Some(verify_checksum(archive_path, expected, &actual)?),
            None => None,
        };

        let temp = TempDir::new()?;
        archive::extract_archive(archive_path, temp.path())?;
        let root = single_top_level_dir(temp.path())?;

        let name = archive_install_name(archive_path);
        let (path, replaced) = self.place(&name, &root, options.update)?;
        Ok(InstallOutcome {
            name,
            path,
            version: None,
            checksum: Some(actual),
            verified,
            replaced,
        })
    }

    fn install_remote(&mut self, url: &str, options: &AddOptions) -> Result<InstallOutcome, PackageError> {
        let download = self.download(url, options.checksum.as_deref())?;

        if is_archive_file(&download.file) {
            let extract_dir = download.temp.path().join("extract");
            archive::extract_archive(&download.file, &extract_dir)?;
            let root = single_top_level_dir(&extract_dir)?;

            let name = root
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or_else(|| PackageError::InvalidSource(url.to_string()))?;
            let (path, replaced) = self.place(&name, &root, options.update)?;
            return Ok(InstallOutcome {
                name,
                path,
                version: None,
                checksum: Some(download.checksum),
                verified: download.verified,
                replaced,
            });
        }

        let (path, replaced) = self.place(&download.file_name, &download.file, options.update)?;
        Ok(InstallOutcome {
            name: download.file_name,
            path,
            version: None,
            checksum: Some(download.checksum),
            verified: download.verified,
            replaced,
        })
    }

    fn install_from_registry(
        &mut self,
        name: &str,
        range: &str,
        options: &AddOptions,
    ) -> Result<InstallOutcome, PackageError> {
        let (version, url) =
            self.registry
                .resolve_range(name, range)?
                .ok_or_else(|| PackageError::NoMatchingVersion {
                    name: name.to_string(),
                    range: range.to_string(),
                })?;
        debug!(name, %version, url = %url, "resolved registry package");

        let download = self.download(&url, options.checksum.as_deref())?;
        if !is_archive_file(&download.file) {
            return Err(PackageError::UnsupportedArchive(url));
        }

        let extract_dir = download.temp.path().join("extract");
        archive::extract_archive(&download.file, &extract_dir)?;
        let root = single_top_level_dir(&extract_dir)?;

        let (path, replaced) = self.place(name, &root, options.update)?;
        self.lockfile
            .add_package(name, &version.to_string(), &download.checksum)?;

        Ok(InstallOutcome {
            name: name.to_string(),
            path,
            version: Some(version),
            checksum: Some(download.checksum),
            verified: download.verified,
            replaced,
        })
    }

    /// Fetch `url` into a fresh temporary directory and verify it
    ///
    /// An explicit checksum wins; otherwise a `.sha256` sidecar is used when
    /// the server provides one.
    fn download(&self, url: &str, expected: Option<&str>) -> Result<Download, PackageError> {
        let file_name = url_file_name(url).ok_or_else(|| PackageError::InvalidSource(url.to_string()))?;
        validate_name(&file_name)?;

        let temp = TempDir::new()?;
        let file = temp.path().join(&file_name);
        self.fetcher.fetch_to_file(url, &file)?;

        let actual = compute_file_checksum(&file)?;
        let expected = match expected {
            Some(e) => Some(e.to_string()),
            None => self.fetcher.fetch_checksum(url),
        };
        let verified = match expected {
            Some(expected) => Some(verify_checksum(&file, &expected, &actual)?),
            None => None,
        };

        Ok(Download {
            temp,
            file,
            file_name,
            checksum: actual,
            verified,
        })
    }

    /// Install `src` (a directory tree or a single file) at `<lib_dir>/<name>`
    ///
    /// The copy is staged in a temporary directory inside `lib_dir` and then
    /// renamed into place. A failed copy leaves any previous installation as
    /// it was, and the staging directory is removed on every path.
    fn place(&self, name: &str, src: &Path, update: bool) -> Result<(PathBuf, bool), PackageError> {
        validate_name(name)?;
        let dest = self.config.package_dir(name);

        let replaced = dest.exists();
        if replaced && !update {
            return Err(PackageError::AlreadyInstalled(name.to_string()));
        }

        let staging = tempfile::Builder::new()
            .prefix(".staging-")
            .tempdir_in(&self.config.lib_dir)?;
        let staged = staging.path().join("package");
        if src.is_dir() {
            copy_dir_all(src, &staged)?;
        } else {
            fs::copy(src, &staged)?;
        }

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        if replaced {
            debug!(dest = %dest.display(), "replacing existing installation");
        }
        swap_into_place(&staged, &dest, &staging.path().join("previous"))?;

        Ok((dest, replaced))
    }

    /// Remove an installed package and its lockfile entry
    pub fn remove(&mut self, name: &str) -> Result<PathBuf, PackageError> {
        validate_name(name)?;
        let target = self.config.package_dir(name);
        if !target.exists() {
            return Err(PackageError::NotInstalled(name.to_string()));
        }

        remove_path(&target)?;
        self.lockfile.remove_package(name)?;

        info!(name, "removed package");
        Ok(target)
    }
}

/// A verified download living in its own temporary directory
struct Download {
    temp: TempDir,
    file: PathBuf,
    file_name: String,
    checksum: String,
    verified: Option<String>,
}

fn verify_checksum(file: &Path, expected: &str, actual: &str) -> Result<String, PackageError> {
    let file_name = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    if !checksums_match(expected, actual) {
        return Err(PackageError::ChecksumMismatch {
            file: file_name,
            expected: expected.to_string(),
            actual: actual.to_string(),
        });
    }

    debug!(file = %file_name, "checksum verified");
    Ok(file_name)
}

/// Names may contain `/` (e.g. `std/math`) but never `..` or a root
fn validate_name(name: &str) -> Result<(), PackageError> {
    let path = Path::new(name);
    let valid = !name.is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
    if valid {
        Ok(())
    } else {
        Err(PackageError::InvalidName(name.to_string()))
    }
}

/// Rename `staged` to `dest`, first moving an existing `dest` to `backup`
///
/// When the final rename fails the previous contents are moved back.
fn swap_into_place(staged: &Path, dest: &Path, backup: &Path) -> io::Result<()> {
    let had_previous = dest.exists();
    if had_previous {
        fs::rename(dest, backup)?;
    }

    if let Err(e) = fs::rename(staged, dest) {
        if had_previous {
            if let Err(restore) = fs::rename(backup, dest) {
                warn!(dest = %dest.display(), error = %restore, "could not restore previous installation");
            }
        }
        return Err(e);
    }
    Ok(())
}

fn remove_path(path: &Path) -> io::Result<()> {
    if path.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

/// Install name for a local archive
///
/// The archive extension is dropped, then a trailing `-<semver>` suffix:
/// `math_utils-0.2.0.tar.gz` installs as `math_utils`.
pub fn archive_install_name(archive: &Path) -> String {
    let file_name = archive
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let lower = file_name.to_ascii_lowercase();
    let base = [".tar.gz", ".tgz", ".tar", ".zip"]
        .iter()
        .find(|ext| lower.ends_with(*ext))
        .map(|ext| &file_name[..file_name.len() - ext.len()])
        .unwrap_or(&file_name);

    for (i, _) in base.match_indices('-') {
        if i > 0 && Version::parse(&base[i + 1..]).is_ok() {
            return base[..i].to_string();
        }
    }
    base.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_archive_install_name() {
        assert_eq!(archive_install_name(Path::new("math_utils-0.2.0.tar.gz")), "math_utils");
        assert_eq!(archive_install_name(Path::new("dir/strings.zip")), "strings");
        assert_eq!(archive_install_name(Path::new("my-lib-1.0.0-beta.1.tar")), "my-lib");
        assert_eq!(archive_install_name(Path::new("my-lib.tgz")), "my-lib");
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("math").is_ok());
        assert!(validate_name("std/math").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name("../escape").is_err());
        assert!(validate_name("/abs").is_err());
    }

    #[test]
    fn test_verify_checksum_case_insensitive() {
        let path = Path::new("/tmp/pkg.tar.gz");
        assert_eq!(verify_checksum(path, "ABCD", "abcd").unwrap(), "pkg.tar.gz");
        assert!(matches!(
            verify_checksum(path, "abcd", "abce"),
            Err(PackageError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_swap_replaces_previous_install() {
        let temp = tempfile::tempdir().unwrap();
        let staged = temp.path().join("staged");
        fs::create_dir_all(&staged).unwrap();
        fs::write(staged.join("new.origin"), "new").unwrap();
        let dest = temp.path().join("lib");
        fs::create_dir_all(&dest).unwrap();
        fs::write(dest.join("old.origin"), "old").unwrap();
        let backup = temp.path().join("backup");

        swap_into_place(&staged, &dest, &backup).unwrap();
        assert!(dest.join("new.origin").exists());
        assert!(!dest.join("old.origin").exists());
        assert!(backup.join("old.origin").exists());
        assert!(!staged.exists());
    }

    #[test]
    fn test_swap_failure_restores_previous_install() {
        let temp = tempfile::tempdir().unwrap();
        let dest = temp.path().join("lib");
        fs::create_dir_all(&dest).unwrap();
        fs::write(dest.join("old.origin"), "old").unwrap();
        let backup = temp.path().join("backup");

        let missing = temp.path().join("never-staged");
        assert!(swap_into_place(&missing, &dest, &backup).is_err());
        assert_eq!(fs::read_to_string(dest.join("old.origin")).unwrap(), "old");
        assert!(!backup.exists());
    }

    #[test]
    fn test_new_requires_manifest() {
        let temp = tempfile::tempdir().unwrap();
        let config = Config::for_project(temp.path()).with_registry_path(temp.path().join("r.json"));
        assert!(matches!(PackageManager::new(config), Err(PackageError::MissingManifest(_))));
    }
}
