//! CSV → 2DA V2.0 conversion.
//!
//! The first non-blank, non-comment row of the sheet is the header; every
//! following row becomes a data row, auto-numbered from 0. Empty cells render
//! as `****` and whitespace inside a cell becomes `_`, since the engine's
//! table reader treats both specially.

use chrono::{DateTime, Local};
use std::collections::HashMap;
use thiserror::Error;

/// Cell written in place of an empty value; the engine reads it as "no entry".
const EMPTY_CELL: &str = "****";

/// Tag expected on the first line of every 2DA file.
const FORMAT_TAG: &str = "2DA V2.0";

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("empty sheet, no rows found")]
    NoRows,
    #[error("no header row found")]
    NoHeader,
    #[error("malformed CSV: {0}")]
    Csv(#[from] csv::Error),
}

/// A parsed sheet: header labels plus data rows, with comment and blank rows
/// already dropped and every cell trimmed.
#[derive(Debug)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Layout for one table: a uniform width per data column plus the width of
/// the leading row-index pseudo-column.
#[derive(Debug, PartialEq, Eq)]
struct ColumnLayout {
    widths: Vec<usize>,
    index_width: usize,
}

/// Convert raw CSV text into formatted 2DA text.
///
/// Deterministic for identical inputs; `synced_at` is stamped into a comment
/// line and is the only thing that varies between runs on the same sheet.
pub fn convert(
    csv_text: &str,
    name: &str,
    forced_widths: &HashMap<String, usize>,
    synced_at: DateTime<Local>,
) -> Result<String, ConvertError> {
    let table = parse_table(csv_text)?;
    let rows = normalize_rows(&table.headers, table.rows);
    let layout = compute_layout(&table.headers, &rows, forced_widths);

    let mut lines = Vec::with_capacity(rows.len() + 8);
    lines.push(FORMAT_TAG.to_string());
    lines.push(String::new());
    lines.push(format!("// Auto-generated by sheet2da  |  Source: {name}"));
    lines.push(format!(
        "// Last sync: {}",
        synced_at.format("%Y-%m-%d %H:%M:%S")
    ));
    lines.push("// DO NOT EDIT MANUALLY - edit the source sheet and re-sync".to_string());
    lines.push(String::new());

    let mut header_line = " ".repeat(layout.index_width);
    for (label, width) in table.headers.iter().zip(&layout.widths) {
        push_padded(&mut header_line, label, *width);
    }
    lines.push(header_line.trim_end().to_string());

    for (ri, row) in rows.iter().enumerate() {
        let mut line = String::new();
        push_padded(&mut line, &ri.to_string(), layout.index_width);
        for (cell, width) in row.iter().zip(&layout.widths) {
            push_padded(&mut line, cell, *width);
        }
        lines.push(line.trim_end().to_string());
    }

    Ok(lines.join("\n") + "\n")
}

/// Parse delimited text into header and data rows, discarding blank rows and
/// rows whose first cell starts with `//`.
pub fn parse_table(csv_text: &str) -> Result<RawTable, ConvertError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(csv_text.as_bytes());

    let mut seen_any = false;
    let mut headers: Option<Vec<String>> = None;
    let mut rows = Vec::new();

    for record in reader.records() {
        let record = record?;
        seen_any = true;
        let cells: Vec<String> = record.iter().map(|c| c.trim().to_string()).collect();
        if cells.iter().all(|c| c.is_empty()) {
            continue;
        }
        if cells.first().is_some_and(|c| c.starts_with("//")) {
            continue;
        }
        match headers {
            None => headers = Some(cells),
            Some(_) => rows.push(cells),
        }
    }

    if !seen_any {
        return Err(ConvertError::NoRows);
    }
    match headers {
        Some(headers) => Ok(RawTable { headers, rows }),
        None => Err(ConvertError::NoHeader),
    }
}

/// Pad or truncate each row to the header's column count, then apply the
/// cell rules: empty → `****`, internal whitespace → `_`.
fn normalize_rows(headers: &[String], rows: Vec<Vec<String>>) -> Vec<Vec<String>> {
    rows.into_iter()
        .map(|mut row| {
            row.resize(headers.len(), String::new());
            row.iter().map(|cell| normalize_cell(cell)).collect()
        })
        .collect()
}

fn normalize_cell(cell: &str) -> String {
    if cell.is_empty() {
        EMPTY_CELL.to_string()
    } else {
        cell.chars()
            .map(|c| if c.is_whitespace() { '_' } else { c })
            .collect()
    }
}

/// Two-pass width computation: every cell of a column is scanned before a
/// single line is emitted. Width = max(longest cell incl. the header label,
/// forced minimum) + 2.
fn compute_layout(
    headers: &[String],
    rows: &[Vec<String>],
    forced_widths: &HashMap<String, usize>,
) -> ColumnLayout {
    let widths = headers
        .iter()
        .enumerate()
        .map(|(ci, label)| {
            let mut max_w = cell_width(label);
            for row in rows {
                if let Some(cell) = row.get(ci) {
                    max_w = max_w.max(cell_width(cell));
                }
            }
            let forced = forced_widths.get(label).copied().unwrap_or(0);
            max_w.max(forced) + 2
        })
        .collect();

    let index_digits = decimal_digits(rows.len().saturating_sub(1));
    ColumnLayout {
        widths,
        index_width: (index_digits + 2).max(6),
    }
}

fn cell_width(cell: &str) -> usize {
    cell.chars().count()
}

fn decimal_digits(mut n: usize) -> usize {
    let mut digits = 1;
    while n >= 10 {
        n /= 10;
        digits += 1;
    }
    digits
}

fn push_padded(line: &mut String, text: &str, width: usize) {
    line.push_str(text);
    for _ in cell_width(text)..width {
        line.push(' ');
    }
}
