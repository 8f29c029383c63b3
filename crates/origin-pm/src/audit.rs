//! Dependency auditing
//!
//! An audit runs in four stages over a snapshot of the project:
//!
//! 1. [`DependencyAuditor::load_dependency_tree`] merges the lockfile
//!    (resolved versions), the project manifest (declared ranges) and the
//!    manifests of installed libraries (transitive ranges).
//! 2. [`check_conflicts`] flags package names whose required ranges have no
//!    common version.
//! 3. [`DependencyAuditor::check_outdated`] compares installed versions with
//!    the newest stable registry version.
//! 4. [`format_report`] renders the issues as text or JSON.
//!
//! No stage writes to disk.

use crate::config::Config;
use crate::lockfile::{Lockfile, LockfileError};
use crate::manifest::{Manifest, ManifestError, MANIFEST_NAME};
use crate::range::{ranges_intersect, VersionRange};
use crate::registry::Registry;
use crate::semver::Version;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, warn};

/// Version given to packages declared in pkg.json but never installed
pub const PLACEHOLDER_VERSION: &str = "0.0.0";

/// Errors that abort an audit
///
/// Only structural problems with the project's own files end up here;
/// per-package registry problems are skipped.
#[derive(Debug, Error)]
pub enum AuditError {
    #[error(transparent)]
    Lockfile(#[from] LockfileError),

    #[error("Failed to load pkg.json: {0}")]
    Manifest(#[from] ManifestError),

    /// Unknown `--level` value
    #[error("Invalid severity level '{0}' (expected info, warn or crit)")]
    InvalidLevel(String),
}

/// Issue severity, ordered `Info < Warn < Crit`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warn,
    Crit,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warn => "warn",
            Severity::Crit => "crit",
        }
    }

    /// Marker used in text reports
    pub fn symbol(&self) -> &'static str {
        match self {
            Severity::Info => "ℹ",
            Severity::Warn => "⚠",
            Severity::Crit => "✖",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = AuditError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "info" => Ok(Severity::Info),
            "warn" => Ok(Severity::Warn),
            "crit" => Ok(Severity::Crit),
            _ => Err(AuditError::InvalidLevel(s.to_string())),
        }
    }
}

/// A single audit finding
#[derive(Debug, Clone, PartialEq)]
pub struct AuditIssue {
    pub package_name: String,
    pub severity: Severity,
    pub message: String,
    pub details: Value,
    pub parent_package: Option<String>,
}

/// One package occurrence in the dependency tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyNode {
    pub name: String,
    /// Resolved version, or [`PLACEHOLDER_VERSION`] when not installed
    pub version: String,
    /// Package that declared this requirement; `None` for the project itself
    pub parent: Option<String>,
    pub required_ranges: Vec<String>,
    pub checksum: Option<String>,
}

impl DependencyNode {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            parent: None,
            required_ranges: Vec::new(),
            checksum: None,
        }
    }

    /// Node for a declared but uninstalled package
    pub fn placeholder(name: impl Into<String>) -> Self {
        Self::new(name, PLACEHOLDER_VERSION)
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn with_range(mut self, range: impl Into<String>) -> Self {
        self.required_ranges.push(range.into());
        self
    }

    pub fn with_checksum(mut self, checksum: impl Into<String>) -> Self {
        self.checksum = Some(checksum.into());
        self
    }

    pub fn is_placeholder(&self) -> bool {
        self.version == PLACEHOLDER_VERSION
    }
}

/// All nodes of one audit run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyTree {
    nodes: Vec<DependencyNode>,
}

impl DependencyTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, node: DependencyNode) {
        self.nodes.push(node);
    }

    pub fn nodes(&self) -> &[DependencyNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The project-level node for `name`
    pub fn get(&self, name: &str) -> Option<&DependencyNode> {
        self.nodes
            .iter()
            .find(|n| n.name == name && n.parent.is_none())
    }

    fn get_mut(&mut self, name: &str) -> Option<&mut DependencyNode> {
        self.nodes
            .iter_mut()
            .find(|n| n.name == name && n.parent.is_none())
    }

    /// Every node for `name`, project-level and transitive
    pub fn nodes_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a DependencyNode> + 'a {
        self.nodes.iter().filter(move |n| n.name == name)
    }
}

impl FromIterator<DependencyNode> for DependencyTree {
    fn from_iter<I: IntoIterator<Item = DependencyNode>>(iter: I) -> Self {
        Self {
            nodes: iter.into_iter().collect(),
        }
    }
}

/// Audits one project against a registry
#[derive(Debug)]
pub struct DependencyAuditor {
    config: Config,
    manifest: Manifest,
    lockfile: Lockfile,
    registry: Registry,
}

impl DependencyAuditor {
    /// Load the project's pkg.json (if any) and prepare lockfile and registry
    pub fn new(config: Config) -> Result<Self, AuditError> {
        let manifest = Manifest::load_or_default(&config.manifest_path)?;
        let lockfile = Lockfile::new(&config.lockfile_path);
        let registry = Registry::new(&config.registry_path);

        Ok(Self {
            config,
            manifest,
            lockfile,
            registry,
        })
    }

    /// Audit against a different registry
    pub fn with_registry(mut self, registry: Registry) -> Self {
        self.registry = registry;
        self
    }

    /// Build the dependency tree from lockfile and manifests
    ///
    /// Installed libraries that ship their own pkg.json add nodes whose
    /// `parent` is the library name.
    pub fn load_dependency_tree(&mut self) -> Result<DependencyTree, AuditError> {
        let mut tree = DependencyTree::new();
        let locked = self.lockfile.get_all_packages()?;

        for (name, entry) in &locked {
            tree.push(DependencyNode::new(name, &entry.version).with_checksum(&entry.checksum));
        }

        for (name, range) in &self.manifest.dependencies {
            match tree.get_mut(name) {
                Some(node) => node.required_ranges.push(range.clone()),
                None => tree.push(DependencyNode::placeholder(name).with_range(range)),
            }
        }

        let roots: BTreeSet<String> = tree.nodes().iter().map(|n| n.name.clone()).collect();
        for library in roots {
            let Some(manifest) = self.library_manifest(&library) else {
                continue;
            };

            for (dep, range) in manifest.dependencies {
                let version = locked
                    .get(&dep)
                    .map(|e| e.version.clone())
                    .unwrap_or_else(|| PLACEHOLDER_VERSION.to_string());
                tree.push(
                    DependencyNode::new(dep, version)
                        .with_parent(&library)
                        .with_range(range),
                );
            }
        }

        debug!(nodes = tree.len(), "loaded dependency tree");
        Ok(tree)
    }

    /// pkg.json of an installed library, skipping unreadable ones
    fn library_manifest(&self, name: &str) -> Option<Manifest> {
        let path = self.config.package_dir(name).join(MANIFEST_NAME);
        if !path.is_file() {
            return None;
        }

        match Manifest::from_file_unchecked(&path) {
            Ok(manifest) => Some(manifest),
            Err(error) => {
                warn!(path = %path.display(), %error, "skipping unreadable library manifest");
                None
            }
        }
    }

    /// Flag installed packages older than the newest stable registry version
    ///
    /// Packages the registry cannot answer for are skipped.
    pub fn check_outdated(&mut self, tree: &DependencyTree, ignore: &[String]) -> Vec<AuditIssue> {
        let mut issues = Vec::new();

        for node in tree.nodes() {
            if node.parent.is_some() || node.is_placeholder() || ignore.contains(&node.name) {
                continue;
            }

            let current = match Version::parse(&node.version) {
                Ok(v) => v,
                Err(e) => {
                    debug!(package = %node.name, error = %e, "skipping outdated check");
                    continue;
                }
            };

            let latest = match self.registry.latest_stable(&node.name) {
                Ok(Some(latest)) => latest,
                Ok(None) => continue,
                Err(e) => {
                    debug!(package = %node.name, error = %e, "registry lookup failed");
                    continue;
                }
            };

            if current < latest {
                issues.push(outdated_issue(&node.name, &current, &latest));
            }
        }

        issues
    }

    /// Run every check and keep issues at or above `level`
    pub fn audit(&mut self, level: Severity, ignore: &[String]) -> Result<Vec<AuditIssue>, AuditError> {
        let tree = self.load_dependency_tree()?;

        let mut issues = check_conflicts(&tree, ignore);
        issues.extend(self.check_outdated(&tree, ignore));
        issues.retain(|issue| issue.severity >= level);

        Ok(issues)
    }
}

/// Flag package names whose collected ranges cannot all be satisfied
///
/// A range that does not parse is reported on its own as a critical issue.
pub fn check_conflicts(tree: &DependencyTree, ignore: &[String]) -> Vec<AuditIssue> {
    let mut groups: BTreeMap<&str, Vec<&DependencyNode>> = BTreeMap::new();
    for node in tree.nodes() {
        if ignore.contains(&node.name) {
            continue;
        }
        groups.entry(node.name.as_str()).or_default().push(node);
    }

    let mut issues = Vec::new();

    for (name, nodes) in groups {
        let mut ranges: Vec<&str> = Vec::new();
        let mut parsed = Vec::new();

        for node in &nodes {
            for range in &node.required_ranges {
                match VersionRange::parse(range) {
                    Ok(r) => {
                        if !ranges.contains(&range.as_str()) {
                            ranges.push(range);
                            parsed.push(r);
                        }
                    }
                    Err(e) => issues.push(AuditIssue {
                        package_name: name.to_string(),
                        severity: Severity::Crit,
                        message: format!("Invalid version range '{}': {}", range, e),
                        details: json!({ "range": range, "error": e.to_string() }),
                        parent_package: node.parent.clone(),
                    }),
                }
            }
        }

        if ranges.len() < 2 || ranges_intersect(&parsed) {
            continue;
        }

        let installed = nodes
            .iter()
            .find(|n| !n.is_placeholder())
            .map(|n| n.version.clone());
        let parents: Vec<&str> = nodes.iter().filter_map(|n| n.parent.as_deref()).collect();

        let mut message = format!("Conflicting version ranges: {}", ranges.join(", "));
        if !parents.is_empty() {
            message.push_str(&format!(" (parents: {})", parents.join(", ")));
        }

        issues.push(AuditIssue {
            package_name: name.to_string(),
            severity: Severity::Crit,
            message,
            details: json!({
                "ranges": ranges,
                "installed_version": installed,
                "parent_packages": parents,
            }),
            parent_package: None,
        });
    }

    issues
}

/// Severity of being behind: the first differing component decides
pub fn outdated_severity(current: &Version, latest: &Version) -> Severity {
    if latest.major > current.major {
        Severity::Crit
    } else if latest.minor > current.minor {
        Severity::Warn
    } else {
        Severity::Info
    }
}

fn outdated_issue(name: &str, current: &Version, latest: &Version) -> AuditIssue {
    // Deltas between u64 components, clamped to what fits in a JSON integer
    let diff = |l: u64, c: u64| {
        (i128::from(l) - i128::from(c)).clamp(i64::MIN.into(), i64::MAX.into()) as i64
    };

    AuditIssue {
        package_name: name.to_string(),
        severity: outdated_severity(current, latest),
        message: format!("Outdated: {} → {}", current, latest),
        details: json!({
            "current_version": current.to_string(),
            "latest_version": latest.to_string(),
            "version_diff": {
                "major": diff(latest.major, current.major),
                "minor": diff(latest.minor, current.minor),
                "patch": diff(latest.patch, current.patch),
            },
        }),
        parent_package: None,
    }
}

#[derive(Serialize)]
struct JsonIssue<'a> {
    package: &'a str,
    severity: Severity,
    message: &'a str,
    details: &'a Value,
    parent_package: Option<&'a str>,
}

#[derive(Serialize)]
struct JsonSummary {
    total: usize,
    critical: usize,
    warnings: usize,
    info: usize,
}

#[derive(Serialize)]
struct JsonReport<'a> {
    issues: Vec<JsonIssue<'a>>,
    summary: JsonSummary,
}

fn count(issues: &[AuditIssue], severity: Severity) -> usize {
    issues.iter().filter(|i| i.severity == severity).count()
}

fn plural(n: usize, word: &str) -> String {
    if n == 1 {
        format!("{} {}", n, word)
    } else {
        format!("{} {}s", n, word)
    }
}

/// Render issues as a text report or a JSON document
pub fn format_report(issues: &[AuditIssue], json_output: bool) -> String {
    if json_output {
        format_json_report(issues)
    } else {
        format_text_report(issues)
    }
}

fn format_text_report(issues: &[AuditIssue]) -> String {
    if issues.is_empty() {
        return "No issues found".to_string();
    }

    let mut lines = Vec::new();
    for severity in [Severity::Crit, Severity::Warn, Severity::Info] {
        for issue in issues.iter().filter(|i| i.severity == severity) {
            let parent = issue
                .parent_package
                .as_ref()
                .map(|p| format!(" (parent: {})", p))
                .unwrap_or_default();
            lines.push(format!(
                "{} {}{} – {}",
                severity.symbol(),
                issue.package_name,
                parent,
                issue.message
            ));
        }
    }

    lines.push(format!(
        "\n{} found ({} critical, {}, {} info)",
        plural(issues.len(), "issue"),
        count(issues, Severity::Crit),
        plural(count(issues, Severity::Warn), "warning"),
        count(issues, Severity::Info)
    ));

    lines.join("\n")
}

fn format_json_report(issues: &[AuditIssue]) -> String {
    let report = JsonReport {
        issues: issues
            .iter()
            .map(|i| JsonIssue {
                package: &i.package_name,
                severity: i.severity,
                message: &i.message,
                details: &i.details,
                parent_package: i.parent_package.as_deref(),
            })
            .collect(),
        summary: JsonSummary {
            total: issues.len(),
            critical: count(issues, Severity::Crit),
            warnings: count(issues, Severity::Warn),
            info: count(issues, Severity::Info),
        },
    };

    serde_json::to_string_pretty(&report).unwrap_or_default()
}

/// Process exit code for a set of issues: 2 if any is critical, 1 for warnings, else 0
pub fn exit_code(issues: &[AuditIssue]) -> i32 {
    match issues.iter().map(|i| i.severity).max() {
        Some(Severity::Crit) => 2,
        Some(Severity::Warn) => 1,
        _ => 0,
    }
}
