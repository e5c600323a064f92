//! Transcript rendering for the results log and text mode.

use crate::model::RunRecord;
use anyhow::{Context, Result};
use std::path::Path;

/// Render one record as display lines: a header carrying the run label and
/// timestamp, the transcript body, then a separating blank line.
pub(crate) fn render_record(record: &RunRecord) -> Vec<String> {
    let mut lines = Vec::new();
    if record.timestamp_utc.is_empty() {
        lines.push(format!("### {}", record.label));
    } else {
        lines.push(format!("### {} ({})", record.label, record.timestamp_utc));
    }
    for line in record.transcript.lines() {
        lines.push(line.to_string());
    }
    lines.push(String::new());
    lines
}

/// Render the whole run log in insertion order.
pub(crate) fn render_log(records: &[RunRecord]) -> Vec<String> {
    records.iter().flat_map(render_record).collect()
}

/// Export the session's records as pretty-printed JSON.
pub(crate) fn export_json(path: &Path, records: &[RunRecord]) -> Result<()> {
    let json = serde_json::to_string_pretty(records).context("serialize run records")?;
    std::fs::write(path, json).with_context(|| format!("write {}", path.display()))
}
