//! Query Result - tabular rows or a row-count acknowledgement

use serde::{Deserialize, Serialize};
use std::fmt;

/// Ordered rows with named columns. Each row holds one value per column,
/// in the statement's declared output order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RowSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
}

impl RowSet {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<serde_json::Value>>) -> Self {
        Self { columns, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.eq_ignore_ascii_case(name))
    }

    /// Value of `column` in row `row`, if both exist.
    pub fn get(&self, row: usize, column: &str) -> Option<&serde_json::Value> {
        let idx = self.column_index(column)?;
        self.rows.get(row).and_then(|r| r.get(idx))
    }

    /// Text value of `column` in row `row`; SQL NULL becomes `None`.
    pub fn get_str(&self, row: usize, column: &str) -> Option<String> {
        match self.get(row, column)? {
            serde_json::Value::Null => None,
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Rows as JSON objects keyed by column name.
    pub fn to_records(&self) -> Vec<serde_json::Map<String, serde_json::Value>> {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .cloned()
                    .zip(row.iter().cloned())
                    .collect()
            })
            .collect()
    }

    /// Plain-text table: header line, then one line per row, columns
    /// right-aligned to their widest cell.
    pub fn render_table(&self, limit: Option<usize>) -> String {
        let shown = limit.unwrap_or(self.rows.len()).min(self.rows.len());
        let cells: Vec<Vec<String>> = self.rows[..shown]
            .iter()
            .map(|row| row.iter().map(cell_text).collect())
            .collect();

        let widths: Vec<usize> = self
            .columns
            .iter()
            .enumerate()
            .map(|(i, name)| {
                cells
                    .iter()
                    .filter_map(|row| row.get(i))
                    .map(|c| c.chars().count())
                    .chain(std::iter::once(name.chars().count()))
                    .max()
                    .unwrap_or(0)
            })
            .collect();

        let format_line = |values: &[String]| -> String {
            values
                .iter()
                .zip(&widths)
                .map(|(v, w)| format!("{:>width$}", v, width = *w))
                .collect::<Vec<_>>()
                .join(" ")
        };

        let mut lines = Vec::with_capacity(shown + 1);
        lines.push(format_line(&self.columns));
        for row in &cells {
            lines.push(format_line(row));
        }
        lines.join("\n")
    }
}

fn cell_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => "NULL".to_string(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Outcome of one statement: either rows or an acknowledgement, never both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QueryResult {
    Rows(RowSet),
    Acknowledged { rows_affected: u64 },
}

impl QueryResult {
    pub fn rows(&self) -> Option<&RowSet> {
        match self {
            QueryResult::Rows(set) => Some(set),
            QueryResult::Acknowledged { .. } => None,
        }
    }

    pub fn row_count(&self) -> usize {
        match self {
            QueryResult::Rows(set) => set.len(),
            QueryResult::Acknowledged { .. } => 0,
        }
    }
}

impl fmt::Display for QueryResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryResult::Rows(set) if set.is_empty() && set.columns.is_empty() => write!(f, "(no rows)"),
            QueryResult::Rows(set) => write!(f, "{}", set.render_table(None)),
            QueryResult::Acknowledged { rows_affected } => {
                write!(f, "Query executed successfully ({} rows affected)", rows_affected)
            }
        }
    }
}
