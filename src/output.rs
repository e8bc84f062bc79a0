//! Output Formats
//!
//! Every CLI command prints either a [`SuccessEnvelope`] or an [`ErrorEnvelope`]
//! as JSON, or (for `query --format table`) a GitHub-style table built by
//! [`render_table`].
//!
//! # Output Contract
//! - Success: `{"ok": true, "family": "...", "command": "...", "data": [...], "meta": {...}}`
//! - Error: `{"ok": false, "family": "...", "command": "...", "error": {"code": "...", "message": "..."}}`

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::engine::Record;
use crate::error::DbQueryError;

/// Success envelope for command results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessEnvelope<T> {
    /// Always true for success envelopes
    pub ok: bool,

    /// Database family used (mysql, postgres, oracle, mongodb)
    pub family: String,

    /// Command that was executed (query, check, profile)
    pub command: String,

    /// Command-specific data
    pub data: T,

    /// Execution metadata
    pub meta: Metadata,
}

impl<T> SuccessEnvelope<T> {
    pub fn new(family: impl Into<String>, command: impl Into<String>, data: T, meta: Metadata) -> Self {
        Self { ok: true, family: family.into(), command: command.into(), data, meta }
    }
}

/// Error envelope for command failures
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    /// Always false for error envelopes
    pub ok: bool,

    /// Database family, empty when the failure happened before one was known
    pub family: String,

    pub command: String,

    pub error: ErrorInfo,
}

impl ErrorEnvelope {
    pub fn new(family: impl Into<String>, command: impl Into<String>, error: ErrorInfo) -> Self {
        Self { ok: false, family: family.into(), command: command.into(), error }
    }

    /// Create error envelope from a [`DbQueryError`]
    pub fn from_error(family: impl Into<String>, command: impl Into<String>, err: &DbQueryError) -> Self {
        Self::new(family, command, ErrorInfo::new(err.error_code(), err.message()))
    }
}

/// Error information structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Stable error code (e.g. `VALIDATION_ERROR`, `CONNECTION_ERROR`)
    pub code: String,

    /// Human-readable message, never contains a raw password
    pub message: String,
}

impl ErrorInfo {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self { code: code.into(), message: message.into() }
    }
}

/// Execution metadata included in all success responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
    /// Execution time in milliseconds
    pub execution_ms: u64,

    /// Number of records returned (query results only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows_returned: Option<usize>,
}

impl Metadata {
    pub const fn new(execution_ms: u64) -> Self {
        Self { execution_ms, rows_returned: None }
    }

    pub const fn with_rows(execution_ms: u64, rows_returned: usize) -> Self {
        Self { execution_ms, rows_returned: Some(rows_returned) }
    }
}

/// Column headers for a set of records
///
/// The first record's keys in order, followed by keys that only appear in later
/// records, in first-seen order. Documents need not share a shape.
#[must_use]
pub fn column_headers(records: &[Record]) -> Vec<String> {
    let mut headers: Vec<String> = Vec::new();
    for record in records {
        for key in record.keys() {
            if !headers.contains(key) {
                headers.push(key.clone());
            }
        }
    }
    headers
}

/// Render records as a GitHub-flavored Markdown table
///
/// Numbers are right-aligned, everything else left-aligned. A record missing a
/// column gets an empty cell. No records renders as an empty string.
#[must_use]
pub fn render_table(records: &[Record]) -> String {
    let headers = column_headers(records);
    if headers.is_empty() {
        return String::new();
    }

    let rows: Vec<Vec<(String, bool)>> = records
        .iter()
        .map(|record| {
            headers
                .iter()
                .map(|h| record.get(h).map_or((String::new(), false), |v| (cell_text(v), v.is_number())))
                .collect()
        })
        .collect();

    let widths: Vec<usize> = headers
        .iter()
        .enumerate()
        .map(|(i, header)| {
            rows.iter()
                .map(|row| row[i].0.chars().count())
                .chain(std::iter::once(header.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let mut lines = Vec::with_capacity(rows.len() + 2);
    lines.push(table_line(headers.iter().map(|h| (h.as_str(), false)), &widths));
    lines.push(format!(
        "|{}|",
        widths.iter().map(|w| "-".repeat(w + 2)).collect::<Vec<_>>().join("|")
    ));
    for row in &rows {
        lines.push(table_line(row.iter().map(|(text, numeric)| (text.as_str(), *numeric)), &widths));
    }
    lines.join("\n")
}

fn table_line<'a>(cells: impl Iterator<Item = (&'a str, bool)>, widths: &[usize]) -> String {
    let cells: Vec<String> = cells
        .zip(widths)
        .map(|((text, right), width)| {
            if right {
                format!(" {text:>width$} ")
            } else {
                format!(" {text:<width$} ")
            }
        })
        .collect();
    format!("|{}|", cells.join("|"))
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn records(value: Value) -> Vec<Record> {
        value
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_object().unwrap().clone())
            .collect()
    }

    #[test]
    fn test_success_envelope_serialization() {
        let envelope = SuccessEnvelope::new("postgres", "query", json!([{"n": 1}]), Metadata::with_rows(42, 1));

        let json = serde_json::to_string(&envelope).unwrap();
        assert!(json.contains(r#""ok":true"#));
        assert!(json.contains(r#""family":"postgres"#));
        assert!(json.contains(r#""command":"query"#));
        assert!(json.contains(r#""execution_ms":42"#));
        assert!(json.contains(r#""rows_returned":1"#));
    }

    #[test]
    fn test_error_envelope_from_error() {
        let err = DbQueryError::validation("query must be a SELECT statement");
        let envelope = ErrorEnvelope::from_error("mysql", "query", &err);

        assert!(!envelope.ok);
        assert_eq!(envelope.family, "mysql");
        assert_eq!(envelope.error.code, "VALIDATION_ERROR");
        assert!(envelope.error.message.contains("SELECT"));
    }

    #[test]
    fn test_metadata_without_rows() {
        let json = serde_json::to_string(&Metadata::new(100)).unwrap();
        assert!(json.contains(r#""execution_ms":100"#));
        assert!(!json.contains("rows_returned"));
    }

    #[test]
    fn test_headers_union_in_first_seen_order() {
        let rows = records(json!([{"b": 1, "a": 2}, {"a": 3, "c": 4}, {"d": 5, "b": 6}]));
        assert_eq!(column_headers(&rows), ["b", "a", "c", "d"]);
    }

    #[test]
    fn test_render_table() {
        let rows = records(json!([
            {"id": 1, "name": "ada"},
            {"id": 100, "name": "grace hopper"}
        ]));
        insta::assert_snapshot!(render_table(&rows), @r###"
        | id  | name         |
        |-----|--------------|
        |   1 | ada          |
        | 100 | grace hopper |
        "###);
    }

    #[test]
    fn test_render_table_missing_cells() {
        let rows = records(json!([{"a": "x"}, {"b": true}]));
        insta::assert_snapshot!(render_table(&rows), @r###"
        | a | b    |
        |---|------|
        | x |      |
        |   | true |
        "###);
    }

    #[test]
    fn test_render_empty() {
        assert_eq!(render_table(&[]), "");
    }
}
