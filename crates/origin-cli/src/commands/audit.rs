//! `origin audit`: Report dependency conflicts and outdated packages.
//!
//! Exit code is 2 when a critical issue is reported, 1 for warnings, else 0.

use super::load_config;
use crate::output::StyledOutput;
use origin_pm::{exit_code, format_report, DependencyAuditor, Severity};
use std::path::PathBuf;

pub fn execute(
    json: bool,
    level: &str,
    ignore: &[String],
    registry: Option<PathBuf>,
    out: &mut StyledOutput,
) -> anyhow::Result<i32> {
    let level: Severity = level.parse()?;
    let mut auditor = DependencyAuditor::new(load_config(registry)?)?;
    let issues = auditor.audit(level, ignore)?;

    let report = format_report(&issues, json);
    if json || issues.is_empty() {
        out.plain(&report);
    } else {
        for line in report.lines() {
            match severity_of(line) {
                Some(severity) => out.severity_line(severity, line),
                None => out.plain(line),
            }
        }
    }

    Ok(exit_code(&issues))
}

/// Severity of a text report line, from its leading symbol
fn severity_of(line: &str) -> Option<Severity> {
    [Severity::Crit, Severity::Warn, Severity::Info]
        .into_iter()
        .find(|s| line.starts_with(s.symbol()))
}
