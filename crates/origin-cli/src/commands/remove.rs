//! `origin remove`: Remove an installed package.

use super::load_config;
use crate::output::StyledOutput;
use origin_pm::PackageManager;
use std::path::PathBuf;

pub fn execute(name: &str, registry: Option<PathBuf>, out: &mut StyledOutput) -> anyhow::Result<i32> {
    let mut manager = PackageManager::new(load_config(registry)?)?;
    manager.remove(name)?;
    out.success(&format!("✖ Removed {}", name));
    Ok(0)
}
