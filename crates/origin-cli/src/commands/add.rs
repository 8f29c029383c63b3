//! `origin add`: Install a package.

use super::load_config;
use crate::output::StyledOutput;
use origin_pm::{AddOptions, PackageManager};
use std::path::PathBuf;

pub fn execute(
    source: &str,
    checksum: Option<String>,
    update: bool,
    registry: Option<PathBuf>,
    out: &mut StyledOutput,
) -> anyhow::Result<i32> {
    let mut manager = PackageManager::new(load_config(registry)?)?;
    let outcome = manager.add(source, &AddOptions { checksum, update })?;

    if let Some(file) = &outcome.verified {
        out.info(&format!("✓ Checksum verified for {}", file));
    }

    let label = match &outcome.version {
        Some(version) => format!("{}@{}", outcome.name, version),
        None => outcome.name.clone(),
    };
    let verb = if outcome.replaced { "Updated" } else { "Installed" };
    out.success(&format!("✔ {} {} → {}", verb, label, outcome.path.display()));

    Ok(0)
}
