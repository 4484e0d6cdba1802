use std::borrow::Cow;
use std::fmt::Write as _;

use crate::{
    ingest::{IngestReport, IngestionOutcome},
    storage::QueryRows,
};

const NULL_CELL: &str = "NULL";

pub fn render_table(headers: &[String], rows: &[Vec<String>]) -> String {
    let column_count = headers.len();
    let mut widths = headers.iter().map(|h| display_width(h)).collect::<Vec<_>>();

    for row in rows {
        for (idx, cell) in row.iter().enumerate().take(column_count) {
            widths[idx] = widths[idx].max(display_width(cell));
        }
    }

    for width in &mut widths {
        *width = (*width).max(1);
    }

    let mut output = String::new();

    let header_line = format_row(headers, &widths);
    let _ = writeln!(output, "{header_line}");

    let separator_widths = widths.iter().map(|w| (*w).max(3)).collect::<Vec<usize>>();
    let separator_cells = separator_widths
        .iter()
        .map(|w| "-".repeat(*w))
        .collect::<Vec<_>>();
    let separator_line = format_row(&separator_cells, &separator_widths);
    let _ = writeln!(output, "{separator_line}");

    for row in rows {
        let row_line = format_row(row, &widths);
        let _ = writeln!(output, "{row_line}");
    }

    output
}

pub fn print_table(headers: &[String], rows: &[Vec<String>]) {
    let rendered = render_table(headers, rows);
    print!("{rendered}");
}

pub fn render_query_rows(rows: &QueryRows) -> String {
    let cells = rows
        .rows
        .iter()
        .map(|row| {
            row.iter()
                .map(|value| match value {
                    Some(value) => value.as_display(),
                    None => NULL_CELL.to_string(),
                })
                .collect::<Vec<_>>()
        })
        .collect::<Vec<_>>();
    render_table(&rows.columns, &cells)
}

pub fn print_query_rows(rows: &QueryRows) {
    print!("{}", render_query_rows(rows));
}

/// One line per table, followed by read failures and rejected rows.
pub fn render_report(report: &IngestReport) -> String {
    let headers = ["source", "sheet", "table", "outcome", "rows", "failed", "notes"]
        .iter()
        .map(|h| h.to_string())
        .collect::<Vec<_>>();
    let mut rows = Vec::new();
    for source in &report.sources {
        if let Some(reason) = &source.read_error {
            rows.push(vec![
                source.source.clone(),
                String::new(),
                String::new(),
                "read-failed".to_string(),
                "0".to_string(),
                "0".to_string(),
                reason.clone(),
            ]);
        }
        for table in &source.tables {
            let (loaded, failed, mut notes) = match &table.outcome {
                IngestionOutcome::Loaded {
                    row_count,
                    failed_row_count,
                    ..
                } => (*row_count, *failed_row_count, Vec::new()),
                IngestionOutcome::SkippedEmpty => (0, 0, Vec::new()),
                IngestionOutcome::CreateFailed { reason } => (0, 0, vec![reason.clone()]),
                IngestionOutcome::LoadAborted {
                    reason,
                    rows_committed,
                } => (*rows_committed, 1, vec![reason.clone()]),
            };
            if let Some(first) = &table.collided_with {
                notes.push(format!("same table as {first}"));
            }
            if !table.degraded_columns.is_empty() {
                notes.push(format!("TEXT fallback: {}", table.degraded_columns.join(", ")));
            }
            rows.push(vec![
                source.source.clone(),
                table.sheet.clone(),
                table.table.clone(),
                table.outcome.label().to_string(),
                loaded.to_string(),
                failed.to_string(),
                notes.join("; "),
            ]);
        }
    }

    let mut output = render_table(&headers, &rows);
    for table in report.tables() {
        for failure in &table.row_failures {
            let _ = writeln!(
                output,
                "{}: row {} rejected ({}): {}",
                table.table,
                failure.row_number,
                failure.values.join(", "),
                failure.reason
            );
        }
    }
    output
}

fn format_row(values: &[String], widths: &[usize]) -> String {
    let mut cells = Vec::with_capacity(values.len());
    for (idx, value) in values.iter().enumerate() {
        if idx >= widths.len() {
            break;
        }
        let sanitized = sanitize_cell(value);
        let display = display_width(sanitized.as_ref());
        let mut cell = sanitized.into_owned();
        let padding = widths
            .get(idx)
            .copied()
            .unwrap_or_default()
            .saturating_sub(display);
        if padding > 0 {
            cell.push_str(&" ".repeat(padding));
        }
        cells.push(cell);
    }
    let mut line = cells.join("  ");
    while line.ends_with(' ') {
        line.pop();
    }
    line
}

fn display_width(value: &str) -> usize {
    let mut width = 0usize;
    let mut chars = value.chars();
    while let Some(ch) = chars.next() {
        if ch == '\u{1b}' {
            // Skip ANSI escape sequence (e.g. \x1b[31m)
            for next in chars.by_ref() {
                if next == 'm' {
                    break;
                }
            }
        } else {
            width += 1;
        }
    }
    width
}

fn sanitize_cell(value: &str) -> Cow<'_, str> {
    if value.contains(['\n', '\r', '\t']) {
        let mut sanitized = String::with_capacity(value.len());
        for ch in value.chars() {
            match ch {
                '\n' | '\r' | '\t' => sanitized.push(' '),
                other => sanitized.push(other),
            }
        }
        Cow::Owned(sanitized)
    } else {
        Cow::Borrowed(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        data::Value,
        ingest::{SourceReport, TableReport},
    };

    #[test]
    fn query_rows_render_nulls_explicitly() {
        let rows = QueryRows {
            columns: vec!["id".into(), "amount".into()],
            rows: vec![
                vec![Some(Value::Integer(1)), Some(Value::Float(10.5))],
                vec![Some(Value::Integer(2)), None],
            ],
        };
        let rendered = render_query_rows(&rows);
        let lines = rendered.lines().collect::<Vec<_>>();
        assert_eq!(lines[0], "id  amount");
        assert_eq!(lines[3], "2   NULL");
    }

    #[test]
    fn report_lists_every_table_and_read_failure() {
        let report = IngestReport {
            sources: vec![
                SourceReport {
                    source: "broken.csv".into(),
                    read_error: Some("no such file".into()),
                    tables: Vec::new(),
                },
                SourceReport {
                    source: "book".into(),
                    read_error: None,
                    tables: vec![TableReport {
                        sheet: "Sales".into(),
                        table: "sales".into(),
                        outcome: IngestionOutcome::Loaded {
                            created: true,
                            row_count: 3,
                            failed_row_count: 0,
                        },
                        collided_with: None,
                        degraded_columns: vec!["placed".into()],
                        row_failures: Vec::new(),
                    }],
                },
            ],
        };
        let rendered = render_report(&report);
        assert!(rendered.contains("read-failed"));
        assert!(rendered.contains("no such file"));
        assert!(rendered.contains("created+loaded"));
        assert!(rendered.contains("TEXT fallback: placed"));
    }
}
