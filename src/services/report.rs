use crate::domain::constants::{REPORT_DELIMITER, REPORT_HEADER, UTF8_BOM};
use crate::domain::models::{PathEntry, ReportRow};
use anyhow::Context;
use std::path::Path;

/// One entry per non-blank line, trimmed. A leading byte-order mark is ignored.
pub fn parse_path_list(raw: &str) -> Vec<PathEntry> {
    raw.trim_start_matches(UTF8_BOM)
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| PathEntry {
            path: line.to_string(),
        })
        .collect()
}

pub fn read_path_list(path: &Path) -> anyhow::Result<Vec<PathEntry>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read input list {}", path.display()))?;
    let entries = parse_path_list(&raw);
    tracing::info!(path = %path.display(), entries = entries.len(), "loaded input list");
    Ok(entries)
}

fn field(value: &str) -> String {
    if value.contains(REPORT_DELIMITER) || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

pub fn render_row(row: &ReportRow) -> String {
    [
        &row.path,
        &row.identifier,
        &row.display_name,
        &row.account_name,
        &row.email,
    ]
    .iter()
    .map(|v| field(v))
    .collect::<Vec<_>>()
    .join(&REPORT_DELIMITER.to_string())
}

pub fn render_report(rows: &[ReportRow]) -> String {
    let mut out = String::new();
    out.push(UTF8_BOM);
    out.push_str(REPORT_HEADER);
    out.push('\n');
    for row in rows {
        out.push_str(&render_row(row));
        out.push('\n');
    }
    out
}

pub fn write_report(path: &Path, rows: &[ReportRow]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("cannot create report directory {}", parent.display()))?;
    }
    std::fs::write(path, render_report(rows))
        .with_context(|| format!("cannot write report {}", path.display()))?;
    tracing::info!(path = %path.display(), rows = rows.len(), "report written");
    Ok(())
}
