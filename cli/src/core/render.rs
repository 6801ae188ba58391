//! Text output for previews, statuses and request statistics

use std::fmt::Write as _;

use serde_json::{Map, Value};
use tabpreview::{
    ColumnValidation, DegradedDiscovery, Endpoint, EndpointSummary, FileStatus,
    FileStatusReport, MetricsSink, PipelineEvent, PreviewResult,
};

use super::constants::MAX_CELL_WIDTH;

/// Render one JSON cell as plain text
fn cell_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Cut `text` to `width` characters, marking the cut with an ellipsis
fn truncate(text: &str, width: usize) -> String {
    let single_line: String = text
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect();
    if single_line.chars().count() <= width {
        return single_line;
    }
    let mut out: String = single_line.chars().take(width.saturating_sub(1)).collect();
    out.push('…');
    out
}

fn pad(text: &str, width: usize) -> String {
    let len = text.chars().count();
    format!("{}{}", text, " ".repeat(width.saturating_sub(len)))
}

/// Fixed-width table of the first `limit` rows
pub fn format_table(headers: &[String], rows: &[Map<String, Value>], limit: usize) -> String {
    if headers.is_empty() {
        return "(no rows)\n".to_string();
    }

    let cells: Vec<Vec<String>> = rows
        .iter()
        .take(limit)
        .map(|row| {
            headers
                .iter()
                .map(|h| truncate(&cell_text(row.get(h)), MAX_CELL_WIDTH))
                .collect()
        })
        .collect();
    let header_cells: Vec<String> = headers
        .iter()
        .map(|h| truncate(h, MAX_CELL_WIDTH))
        .collect();

    let widths: Vec<usize> = header_cells
        .iter()
        .enumerate()
        .map(|(i, h)| {
            cells
                .iter()
                .map(|row| row[i].chars().count())
                .chain(std::iter::once(h.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let render_line = |values: &[String]| -> String {
        let line = values
            .iter()
            .zip(&widths)
            .map(|(v, w)| pad(v, *w))
            .collect::<Vec<_>>()
            .join("  ");
        format!("{}\n", line.trim_end())
    };

    let mut out = render_line(&header_cells);
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    out.push_str(&render_line(&rule));
    for row in &cells {
        out.push_str(&render_line(row));
    }
    out
}

/// Table plus a footer describing which slice of the dataset is shown
pub fn format_preview(preview: &PreviewResult, limit: usize) -> String {
    let mut out = format_table(&preview.headers, &preview.data, limit);
    let shown = preview.data.len().min(limit);
    let _ = writeln!(
        out,
        "\nDataset {}: showing {} of {} rows (page {}/{})",
        preview.dataset_id,
        shown,
        preview.total_rows,
        preview.current_page + 1,
        preview.total_pages
    );
    if !preview.validations.is_empty() {
        out.push('\n');
        out.push_str(&format_validations(&preview.validations));
    }
    out
}

/// Per-column validation counts
pub fn format_validations(validations: &[ColumnValidation]) -> String {
    let headers: Vec<String> = ["column", "valid", "invalid", "empty", "pattern"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let rows: Vec<Map<String, Value>> = validations
        .iter()
        .map(|v| {
            let mut row = Map::new();
            row.insert("column".into(), Value::String(v.column_name.clone()));
            row.insert("valid".into(), Value::from(v.valid_count));
            row.insert("invalid".into(), Value::from(v.invalid_count));
            row.insert("empty".into(), Value::from(v.empty_count));
            row.insert("pattern".into(), Value::String(v.pattern.clone()));
            row
        })
        .collect();
    format_table(&headers, &rows, rows.len())
}

/// Warning line for a discovery that fell back to placeholder validations
pub fn format_degraded(degraded: &DegradedDiscovery) -> String {
    let columns = if degraded.columns.is_empty() {
        "all columns".to_string()
    } else {
        degraded.columns.join(", ")
    };
    let repair = if degraded.repair_attempted {
        " after a duplicate-state repair"
    } else {
        ""
    };
    format!(
        "Validation data unavailable for {}{}: {}",
        columns, repair, degraded.reason
    )
}

pub fn format_status(file_id: &str, report: &FileStatusReport) -> String {
    let mut out = format!("File {}: {}", file_id, report.status);
    if let Some(name) = &report.original_name {
        let _ = write!(out, " ({})", name);
    }
    if report.status == FileStatus::Error {
        let _ = write!(
            out,
            "\n  error: {}",
            report.error_message.as_deref().unwrap_or("Unknown error")
        );
    }
    out.push('\n');
    out
}

/// Per-endpoint request summary
pub fn format_stats(stats: &[(Endpoint, EndpointSummary)]) -> String {
    if stats.is_empty() {
        return "No requests were made\n".to_string();
    }
    let headers: Vec<String> = ["endpoint", "calls", "errors", "success", "avg"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let rows: Vec<Map<String, Value>> = stats
        .iter()
        .map(|(endpoint, summary)| {
            let mut row = Map::new();
            row.insert("endpoint".into(), Value::String(endpoint.to_string()));
            row.insert("calls".into(), Value::from(summary.total_calls));
            row.insert("errors".into(), Value::from(summary.error_calls));
            row.insert(
                "success".into(),
                Value::String(format!("{:.0}%", summary.success_rate())),
            );
            row.insert(
                "avg".into(),
                Value::String(format!("{}ms", summary.avg_response_time().as_millis())),
            );
            row
        })
        .collect();
    format_table(&headers, &rows, rows.len())
}

/// One human-readable progress line for a pipeline event, if it warrants one
pub fn format_event(event: &PipelineEvent) -> Option<String> {
    match event {
        PipelineEvent::StageStarted(stage) => Some(format!("→ {}", stage)),
        PipelineEvent::StageCompleted { stage, elapsed } => {
            Some(format!("✓ {} ({:.1}s)", stage, elapsed.as_secs_f64()))
        }
        PipelineEvent::UploadProgress(percent) => Some(format!("  uploading {}%", percent)),
        PipelineEvent::StatusPolled {
            attempt,
            status: Some(status),
        } => Some(format!("  poll #{}: {}", attempt, status)),
        PipelineEvent::DatasetLookup {
            attempt,
            found: false,
        } => Some(format!("  dataset not listed yet (attempt {})", attempt)),
        PipelineEvent::RepairIssued { success, .. } => Some(format!(
            "  duplicate-state repair {}",
            if *success { "issued" } else { "failed" }
        )),
        _ => None,
    }
}

/// Prints stage transitions and upload progress to stderr
#[derive(Debug, Default, Clone, Copy)]
pub struct ProgressReporter;

impl MetricsSink for ProgressReporter {
    fn record(&self, event: &PipelineEvent) {
        if let Some(line) = format_event(event) {
            eprintln!("{}", line);
        }
    }
}
