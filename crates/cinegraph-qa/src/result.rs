//! Normalized query results.
//!
//! Values here are plain scalars and lists only; engine-native handles
//! (nodes, relationships, paths) are flattened by the executor before a
//! `ResultSet` is built.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResultValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<ResultValue>),
}

impl ResultValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ResultValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ResultValue::Int(i) => Some(*i as f64),
            ResultValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, ResultValue::Null)
    }

    /// Every scalar rendered as text, lists flattened.
    pub fn collect_text(&self, out: &mut Vec<String>) {
        match self {
            ResultValue::Null => {}
            ResultValue::List(items) => items.iter().for_each(|v| v.collect_text(out)),
            other => out.push(other.to_string()),
        }
    }
}

impl fmt::Display for ResultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResultValue::Null => f.write_str("null"),
            ResultValue::Bool(b) => write!(f, "{b}"),
            ResultValue::Int(i) => write!(f, "{i}"),
            // 8.8 stays 8.8, 9.0 prints as 9.0 rather than 9
            ResultValue::Float(x) if x.fract() == 0.0 && x.is_finite() => write!(f, "{x:.1}"),
            ResultValue::Float(x) => write!(f, "{x}"),
            ResultValue::Text(s) => f.write_str(s),
            ResultValue::List(items) => {
                let parts: Vec<String> = items.iter().map(ToString::to_string).collect();
                f.write_str(&parts.join(", "))
            }
        }
    }
}

impl From<&str> for ResultValue {
    fn from(s: &str) -> Self {
        ResultValue::Text(s.to_string())
    }
}

impl From<String> for ResultValue {
    fn from(s: String) -> Self {
        ResultValue::Text(s)
    }
}

impl From<i64> for ResultValue {
    fn from(i: i64) -> Self {
        ResultValue::Int(i)
    }
}

impl From<i32> for ResultValue {
    fn from(i: i32) -> Self {
        ResultValue::Int(i64::from(i))
    }
}

impl From<f64> for ResultValue {
    fn from(x: f64) -> Self {
        ResultValue::Float(x)
    }
}

impl From<bool> for ResultValue {
    fn from(b: bool) -> Self {
        ResultValue::Bool(b)
    }
}

impl<T: Into<ResultValue>> From<Vec<T>> for ResultValue {
    fn from(items: Vec<T>) -> Self {
        ResultValue::List(items.into_iter().map(Into::into).collect())
    }
}

/// One result row; column order follows the query's `RETURN` clause.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Row {
    cells: Vec<(String, ResultValue)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: &str, value: impl Into<ResultValue>) -> Self {
        self.insert(column, value);
        self
    }

    /// Sets `column`, replacing an existing value in place.
    pub fn insert(&mut self, column: &str, value: impl Into<ResultValue>) {
        let value = value.into();
        match self.cells.iter_mut().find(|(c, _)| c == column) {
            Some((_, slot)) => *slot = value,
            None => self.cells.push((column.to_string(), value)),
        }
    }

    pub fn get(&self, column: &str) -> Option<&ResultValue> {
        self.cells.iter().find(|(c, _)| c == column).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ResultValue)> {
        self.cells.iter().map(|(c, v)| (c.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// `col: value` pairs on one line.
    pub fn render(&self) -> String {
        self.iter()
            .map(|(c, v)| format!("{c}: {v}"))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Ordered rows exactly as the engine returned them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl ResultSet {
    pub fn new(columns: Vec<String>, rows: Vec<Row>) -> Self {
        Self { columns, rows }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Builds a set from rows, taking the column list from the first row.
    pub fn from_rows(rows: Vec<Row>) -> Self {
        let columns = rows
            .first()
            .map(|r| r.iter().map(|(c, _)| c.to_string()).collect())
            .unwrap_or_default();
        Self { columns, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    /// One numbered line per row, capped at `max_rows` with a trailing count
    /// of what was left out.
    pub fn render_compact(&self, max_rows: usize) -> String {
        let mut lines: Vec<String> = self
            .rows
            .iter()
            .take(max_rows)
            .enumerate()
            .map(|(i, row)| format!("{}. {}", i + 1, row.render()))
            .collect();
        if self.rows.len() > max_rows {
            lines.push(format!(
                "({} more rows not shown)",
                self.rows.len() - max_rows
            ));
        }
        lines.join("\n")
    }

    /// All scalar values in the set, rendered as text.
    pub fn texts(&self) -> Vec<String> {
        let mut out = Vec::new();
        for row in &self.rows {
            for (_, v) in row.iter() {
                v.collect_text(&mut out);
            }
        }
        out
    }

    /// Case-insensitive substring search over every rendered value.
    pub fn contains_text(&self, needle: &str) -> bool {
        let needle = needle.to_lowercase();
        self.texts()
            .iter()
            .any(|t| t.to_lowercase().contains(&needle))
    }
}
