//! Integration tests for the dependency auditor

use origin_pm::audit::outdated_severity;
use origin_pm::{
    check_conflicts, exit_code, format_report, AuditError, Config, DependencyAuditor,
    DependencyNode, DependencyTree, Lockfile, Registry, Severity, Version,
};
use std::fs;
use tempfile::TempDir;

fn project(manifest: &str) -> (TempDir, Config) {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("pkg.json"), manifest).unwrap();
    let config = Config::for_project(temp.path()).with_registry_path(temp.path().join("registry.json"));
    (temp, config)
}

fn write_registry(config: &Config, entries: &[&str]) {
    let mut registry = Registry::new(&config.registry_path);
    for key in entries {
        registry.add_alias(key, &format!("https://example.com/{}.tar.gz", key)).unwrap();
    }
}

fn tree(nodes: Vec<DependencyNode>) -> DependencyTree {
    nodes.into_iter().collect()
}

#[test]
fn test_incompatible_ranges_conflict() {
    let tree = tree(vec![
        DependencyNode::new("react", "18.2.0").with_parent("app").with_range("^18.0.0"),
        DependencyNode::new("react", "18.2.0").with_parent("legacy").with_range("^9.0.0"),
    ]);

    let issues = check_conflicts(&tree, &[]);
    assert_eq!(issues.len(), 1);

    let issue = &issues[0];
    assert_eq!(issue.package_name, "react");
    assert_eq!(issue.severity, Severity::Crit);
    assert_eq!(
        issue.message,
        "Conflicting version ranges: ^18.0.0, ^9.0.0 (parents: app, legacy)"
    );
    assert_eq!(issue.details["ranges"][1], "^9.0.0");
    assert_eq!(issue.details["installed_version"], "18.2.0");
    assert_eq!(issue.details["parent_packages"][0], "app");
}

#[test]
fn test_compatible_ranges_do_not_conflict() {
    let tree = tree(vec![
        DependencyNode::new("lib", "1.3.0").with_range("^1.0.0"),
        DependencyNode::new("lib", "1.3.0").with_parent("other").with_range("^1.2.0"),
    ]);
    assert!(check_conflicts(&tree, &[]).is_empty());
}

#[test]
fn test_single_node_with_two_ranges() {
    let tree = tree(vec![DependencyNode::placeholder("lib")
        .with_range(">=2.0.0")
        .with_range("<1.5.0")]);

    let issues = check_conflicts(&tree, &[]);
    assert_eq!(issues.len(), 1);
    assert!(issues[0].details["installed_version"].is_null());
    assert_eq!(issues[0].message, "Conflicting version ranges: >=2.0.0, <1.5.0");
}

#[test]
fn test_ignored_packages_skip_conflicts() {
    let tree = tree(vec![
        DependencyNode::new("x", "1.0.0").with_range("^1.0.0"),
        DependencyNode::new("x", "1.0.0").with_parent("y").with_range("^2.0.0"),
    ]);
    assert!(check_conflicts(&tree, &["x".to_string()]).is_empty());
}

#[test]
fn test_invalid_range_is_critical() {
    let tree = tree(vec![DependencyNode::placeholder("x").with_range("^banana")]);
    let issues = check_conflicts(&tree, &[]);
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].severity, Severity::Crit);
    assert!(issues[0].message.contains("^banana"));
}

#[test]
fn test_outdated_severity_classification() {
    let v = |s: &str| Version::parse(s).unwrap();
    assert_eq!(outdated_severity(&v("1.0.0"), &v("2.0.0")), Severity::Crit);
    assert_eq!(outdated_severity(&v("1.0.0"), &v("1.1.0")), Severity::Warn);
    assert_eq!(outdated_severity(&v("1.0.0"), &v("1.0.1")), Severity::Info);
}

#[test]
fn test_load_dependency_tree_merges_lockfile_and_manifest() {
    let (_temp, config) = project(
        r#"{"name": "app", "version": "1.0.0", "dependencies": {"a": "^1.0.0", "b": "^2.0.0"}}"#,
    );
    Lockfile::new(&config.lockfile_path)
        .add_package("a", "1.0.4", "aaa")
        .unwrap();

    let mut auditor = DependencyAuditor::new(config).unwrap();
    let tree = auditor.load_dependency_tree().unwrap();
    assert_eq!(tree.len(), 2);

    let a = tree.get("a").unwrap();
    assert_eq!(a.version, "1.0.4");
    assert_eq!(a.required_ranges, vec!["^1.0.0".to_string()]);
    assert_eq!(a.checksum.as_deref(), Some("aaa"));

    let b = tree.get("b").unwrap();
    assert!(b.is_placeholder());
    assert_eq!(b.required_ranges, vec!["^2.0.0".to_string()]);
}

#[test]
fn test_transitive_requirements_conflict() {
    let (_temp, config) = project(
        r#"{"name": "app", "version": "1.0.0", "dependencies": {"ui": "^1.0.0", "core": "^2.0.0"}}"#,
    );
    Lockfile::new(&config.lockfile_path).add_package("ui", "1.0.0", "u").unwrap();
    Lockfile::new(&config.lockfile_path).add_package("core", "2.1.0", "c").unwrap();

    let ui_dir = config.package_dir("ui");
    fs::create_dir_all(&ui_dir).unwrap();
    fs::write(
        ui_dir.join("pkg.json"),
        r#"{"name": "ui", "version": "1.0.0", "dependencies": {"core": "^3.0.0"}}"#,
    )
    .unwrap();

    let mut auditor = DependencyAuditor::new(config).unwrap();
    let tree = auditor.load_dependency_tree().unwrap();
    let core: Vec<_> = tree.nodes_named("core").collect();
    assert_eq!(core.len(), 2);
    assert_eq!(core[1].parent.as_deref(), Some("ui"));
    assert_eq!(core[1].version, "2.1.0");

    let issues = auditor.audit(Severity::Info, &[]).unwrap();
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].package_name, "core");
    assert_eq!(issues[0].message, "Conflicting version ranges: ^2.0.0, ^3.0.0 (parents: ui)");
    assert_eq!(exit_code(&issues), 2);
}

#[test]
fn test_outdated_packages_from_registry() {
    let (_temp, config) = project(r#"{"name": "app", "version": "1.0.0"}"#);
    let mut lockfile = Lockfile::new(&config.lockfile_path);
    for name in ["major", "minor", "patch", "current", "unknown", "pre"] {
        lockfile.add_package(name, "1.0.0", "x").unwrap();
    }
    write_registry(
        &config,
        &[
            "major@2.0.0",
            "minor@1.1.0",
            "patch@1.0.1",
            "current@1.0.0",
            "pre@1.0.0",
            "pre@2.0.0-beta.1",
        ],
    );

    let mut auditor = DependencyAuditor::new(config).unwrap();
    let issues = auditor.audit(Severity::Info, &[]).unwrap();

    let severity_of = |name: &str| {
        issues
            .iter()
            .find(|i| i.package_name == name)
            .map(|i| i.severity)
    };
    assert_eq!(issues.len(), 3);
    assert_eq!(severity_of("major"), Some(Severity::Crit));
    assert_eq!(severity_of("minor"), Some(Severity::Warn));
    assert_eq!(severity_of("patch"), Some(Severity::Info));

    let major = issues.iter().find(|i| i.package_name == "major").unwrap();
    assert_eq!(major.message, "Outdated: 1.0.0 → 2.0.0");
    assert_eq!(major.details["version_diff"]["major"], 1);
    assert_eq!(major.details["latest_version"], "2.0.0");
}

#[test]
fn test_level_and_ignore_filtering() {
    let (_temp, config) = project(r#"{"name": "app", "version": "1.0.0"}"#);
    let mut lockfile = Lockfile::new(&config.lockfile_path);
    lockfile.add_package("minor", "1.0.0", "x").unwrap();
    lockfile.add_package("patch", "1.0.0", "x").unwrap();
    write_registry(&config, &["minor@1.1.0", "patch@1.0.1"]);

    let mut auditor = DependencyAuditor::new(config).unwrap();

    let warn = auditor.audit(Severity::Warn, &[]).unwrap();
    assert_eq!(warn.len(), 1);
    assert_eq!(exit_code(&warn), 1);

    let crit = auditor.audit(Severity::Crit, &[]).unwrap();
    assert!(crit.is_empty());
    assert_eq!(exit_code(&crit), 0);

    let ignored = auditor.audit(Severity::Info, &["minor".to_string()]).unwrap();
    assert_eq!(ignored.len(), 1);
    assert_eq!(ignored[0].package_name, "patch");
}

#[test]
fn test_registry_failures_are_skipped() {
    let (_temp, config) = project(r#"{"name": "app", "version": "1.0.0"}"#);
    Lockfile::new(&config.lockfile_path).add_package("a", "1.0.0", "x").unwrap();
    fs::write(&config.registry_path, "{ corrupt").unwrap();

    let mut auditor = DependencyAuditor::new(config).unwrap();
    assert!(auditor.audit(Severity::Info, &[]).unwrap().is_empty());
}

#[test]
fn test_corrupt_project_files_abort() {
    let (_temp, config) = project("{ not json");
    assert!(matches!(DependencyAuditor::new(config), Err(AuditError::Manifest(_))));

    let (_temp, config) = project(r#"{"name": "app", "version": "1.0.0"}"#);
    fs::write(&config.lockfile_path, "[]").unwrap();
    let mut auditor = DependencyAuditor::new(config).unwrap();
    assert!(matches!(auditor.audit(Severity::Info, &[]), Err(AuditError::Lockfile(_))));
}

#[test]
fn test_audit_without_manifest() {
    let temp = TempDir::new().unwrap();
    let config = Config::for_project(temp.path()).with_registry_path(temp.path().join("r.json"));
    let mut auditor = DependencyAuditor::new(config).unwrap();
    let issues = auditor.audit(Severity::Info, &[]).unwrap();
    assert_eq!(format_report(&issues, false), "No issues found");
}

#[test]
fn test_json_report_shape() {
    let tree = tree(vec![
        DependencyNode::new("x", "1.0.0").with_range("^1.0.0"),
        DependencyNode::new("x", "1.0.0").with_parent("y").with_range("^2.0.0"),
    ]);
    let issues = check_conflicts(&tree, &[]);
    let report: serde_json::Value = serde_json::from_str(&format_report(&issues, true)).unwrap();

    assert_eq!(report["summary"]["total"], 1);
    assert_eq!(report["summary"]["critical"], 1);
    assert_eq!(report["summary"]["info"], 0);
    assert_eq!(report["issues"][0]["package"], "x");
    assert_eq!(report["issues"][0]["severity"], "crit");
    assert_eq!(report["issues"][0]["details"]["parent_packages"][0], "y");
}
