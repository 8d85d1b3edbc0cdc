//! JSON output of dashboard reports.

use crate::dashboard::DashboardReport;
use crate::error::Result;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

/// Pretty-printed JSON of a report.
pub fn to_json(report: &DashboardReport) -> Result<String> {
    Ok(serde_json::to_string_pretty(report)?)
}

/// Write a report as pretty JSON, creating parent directories as needed.
pub fn write_report(report: &DashboardReport, path: &Path) -> Result<PathBuf> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let mut file = File::create(path)?;
    file.write_all(to_json(report)?.as_bytes())?;

    info!("Report saved: {}", path.display());
    Ok(path.to_path_buf())
}
