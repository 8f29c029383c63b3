//! Origin Package Manager Library
//!
//! This crate provides package management functionality for Origin, including:
//! - Semver version parsing and ordering
//! - Version range matching (caret, tilde, comparators, wildcards)
//! - The `name@version -> url` registry
//! - Deterministic lockfile management (origin.lock)
//! - Package installation from directories, archives, URLs and the registry
//! - Dependency auditing for conflicts and outdated packages

pub mod archive;
pub mod audit;
pub mod config;
pub mod fetch;
pub mod install;
pub mod lockfile;
pub mod manifest;
pub mod range;
pub mod registry;
pub mod semver;

pub use archive::{extract_archive, is_archive_file, ArchiveError, ArchiveKind};
pub use audit::{
    check_conflicts, exit_code, format_report, AuditError, AuditIssue, DependencyAuditor,
    DependencyNode, DependencyTree, Severity,
};
pub use config::Config;
pub use fetch::{FetchError, RetryPolicy, UrlFetcher};
pub use install::{AddOptions, InstallOutcome, PackageError, PackageManager, Source};
pub use lockfile::{LockEntry, Lockfile, LockfileError};
pub use manifest::{find_project_root, Manifest, ManifestError};
pub use range::{find_highest_compatible, ranges_intersect, Interval, VersionRange};
pub use registry::{parse_package_spec, Registry, RegistryError};
pub use semver::{SemverError, Version};
