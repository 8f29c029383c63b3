//! `origin registry`: Inspect and extend the package registry.

use super::load_config;
use crate::output::StyledOutput;
use anyhow::{anyhow, bail};
use origin_pm::{parse_package_spec, Registry, Version};
use std::path::PathBuf;

/// `origin registry add <name@version> <url>`
pub fn add(spec: &str, url: &str, registry: Option<PathBuf>, out: &mut StyledOutput) -> anyhow::Result<i32> {
    let (name, version) = parse_package_spec(spec);
    let version = version.ok_or_else(|| anyhow!("Registry entries need an exact version: {}@<version>", name))?;
    if name.is_empty() {
        bail!("Package name cannot be empty");
    }
    let version = Version::parse(version)?;

    let config = load_config(registry)?;
    let mut registry = Registry::new(&config.registry_path);
    let key = format!("{}@{}", name, version);
    registry.add_alias(&key, url)?;

    out.success(&format!("✔ Added {} → {}", key, url));
    Ok(0)
}

/// `origin registry list`
pub fn list(registry: Option<PathBuf>, out: &mut StyledOutput) -> anyhow::Result<i32> {
    let config = load_config(registry)?;
    let mut registry = Registry::new(&config.registry_path);
    let entries = registry.list_aliases()?;

    if entries.is_empty() {
        out.plain(&format!("No entries in {}", registry.path().display()));
        return Ok(0);
    }

    for (key, url) in entries {
        out.plain(&format!("{} → {}", key, url));
    }
    Ok(0)
}
