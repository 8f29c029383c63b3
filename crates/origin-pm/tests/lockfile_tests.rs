//! Integration tests for lockfile management
//!
//! Tests the Lockfile against realistic origin.lock files on disk.

use origin_pm::{LockEntry, Lockfile, LockfileError};
use serde_json::{json, Map, Value};
use std::fs;
use tempfile::TempDir;

const CHECKSUM: &str = "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => panic!("expected object"),
    }
}

#[test]
fn test_missing_file_loads_empty() {
    let temp = TempDir::new().unwrap();
    let mut lockfile = Lockfile::for_project(temp.path());
    assert!(lockfile.load().unwrap().is_empty());
    assert!(lockfile.get_all_packages().unwrap().is_empty());
    assert!(!lockfile.path().exists());
}

#[test]
fn test_save_sorts_keys_recursively() {
    let temp = TempDir::new().unwrap();
    let mut lockfile = Lockfile::for_project(temp.path());

    lockfile
        .save(object(json!({
            "packages": {
                "zebra": { "version": "1.0.0", "checksum": "c" },
                "alpha": { "version": "2.0.0", "checksum": "a" },
                "beta": { "version": "3.0.0", "checksum": "b" }
            }
        })))
        .unwrap();

    let raw = fs::read_to_string(lockfile.path()).unwrap();
    let alpha = raw.find("\"alpha\"").unwrap();
    let beta = raw.find("\"beta\"").unwrap();
    let zebra = raw.find("\"zebra\"").unwrap();
    assert!(alpha < beta && beta < zebra);

    // checksum sorts before version inside each entry
    assert!(raw.find("\"checksum\": \"a\"").unwrap() < raw.find("\"version\": \"2.0.0\"").unwrap());
}

#[test]
fn test_same_data_same_bytes() {
    let temp = TempDir::new().unwrap();
    let mut first = Lockfile::new(temp.path().join("a.lock"));
    let mut second = Lockfile::new(temp.path().join("b.lock"));

    first.add_package("zeta", "1.0.0", "z").unwrap();
    first.add_package("alpha", "1.0.0", "a").unwrap();
    second.add_package("alpha", "1.0.0", "a").unwrap();
    second.add_package("zeta", "1.0.0", "z").unwrap();

    assert_eq!(
        fs::read(first.path()).unwrap(),
        fs::read(second.path()).unwrap()
    );
}

#[test]
fn test_package_crud() {
    let temp = TempDir::new().unwrap();
    let mut lockfile = Lockfile::for_project(temp.path());

    lockfile.add_package("p", "1.0.0", "abc").unwrap();
    assert!(lockfile.has_package("p").unwrap());
    assert_eq!(lockfile.get_package("p").unwrap(), Some(LockEntry::new("1.0.0", "abc")));

    lockfile.add_package("p", "1.1.0", "def").unwrap();
    assert_eq!(lockfile.get_package("p").unwrap().unwrap().version, "1.1.0");

    lockfile.remove_package("p").unwrap();
    assert!(!lockfile.has_package("p").unwrap());

    lockfile.remove_package("missing").unwrap();
}

#[test]
fn test_persisted_across_handles() {
    let temp = TempDir::new().unwrap();
    Lockfile::for_project(temp.path())
        .add_package("logging", "1.2.3", CHECKSUM)
        .unwrap();

    let mut reopened = Lockfile::for_project(temp.path());
    let all = reopened.get_all_packages().unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all["logging"].checksum, CHECKSUM);
}

#[test]
fn test_get_all_packages_is_a_copy() {
    let temp = TempDir::new().unwrap();
    let mut lockfile = Lockfile::for_project(temp.path());
    lockfile.add_package("a", "1.0.0", "x").unwrap();

    let mut all = lockfile.get_all_packages().unwrap();
    all.clear();
    assert!(lockfile.has_package("a").unwrap());
}

#[test]
fn test_save_creates_parent_dirs() {
    let temp = TempDir::new().unwrap();
    let mut lockfile = Lockfile::new(temp.path().join("deep").join("dir").join("origin.lock"));
    lockfile.add_package("a", "1.0.0", "x").unwrap();
    assert!(lockfile.path().exists());
}

#[test]
fn test_corrupt_lockfile_is_an_error() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("origin.lock");

    fs::write(&path, "not json").unwrap();
    assert!(matches!(Lockfile::new(&path).load(), Err(LockfileError::Parse { .. })));

    fs::write(&path, "[]").unwrap();
    assert!(matches!(Lockfile::new(&path).load(), Err(LockfileError::NotAnObject(_))));

    fs::write(&path, r#"{"packages": []}"#).unwrap();
    assert!(matches!(
        Lockfile::new(&path).get_all_packages(),
        Err(LockfileError::InvalidPackages(_))
    ));
}

#[test]
fn test_clear_deletes_file() {
    let temp = TempDir::new().unwrap();
    let mut lockfile = Lockfile::for_project(temp.path());
    lockfile.add_package("a", "1.0.0", "x").unwrap();

    lockfile.clear().unwrap();
    assert!(!lockfile.path().exists());
    assert!(!lockfile.has_package("a").unwrap());

    // Clearing twice is fine
    lockfile.clear().unwrap();
}

#[test]
fn test_reload_sees_external_changes() {
    let temp = TempDir::new().unwrap();
    let mut lockfile = Lockfile::for_project(temp.path());
    assert!(lockfile.load().unwrap().is_empty());

    fs::write(
        lockfile.path(),
        r#"{"packages": {"ext": {"version": "1.0.0", "checksum": "x"}}}"#,
    )
    .unwrap();
    assert!(lockfile.load().unwrap().is_empty());
    assert!(lockfile.reload().unwrap().contains_key("packages"));
}
