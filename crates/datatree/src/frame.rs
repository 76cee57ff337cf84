//! Tabular input for ingestion.
//!
//! Updates arrive as a flat frame of equal-length columns, one row per
//! observation. Numeric columns carry the `f64` working representation;
//! string columns carry raw text and are parsed per the schema (timestamps,
//! fixed-length labels) during the pivot.

use std::collections::BTreeMap;

use crate::error::{Result, TreeError};

/// One column of a [`Frame`].
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    F64(Vec<f64>),
    Str(Vec<String>),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Column::F64(v) => v.len(),
            Column::Str(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Numeric view, or an error naming the column.
    pub fn as_f64(&self, name: &str) -> Result<&[f64]> {
        match self {
            Column::F64(v) => Ok(v),
            Column::Str(_) => Err(TreeError::pivot(format!(
                "column '{name}' is text where a numeric column is required"
            ))),
        }
    }

    /// Text view, or an error naming the column.
    pub fn as_str(&self, name: &str) -> Result<&[String]> {
        match self {
            Column::Str(v) => Ok(v),
            Column::F64(_) => Err(TreeError::pivot(format!(
                "column '{name}' is numeric where a text column is required"
            ))),
        }
    }
}

impl From<Vec<f64>> for Column {
    fn from(v: Vec<f64>) -> Self {
        Column::F64(v)
    }
}

impl From<Vec<String>> for Column {
    fn from(v: Vec<String>) -> Self {
        Column::Str(v)
    }
}

impl From<Vec<&str>> for Column {
    fn from(v: Vec<&str>) -> Self {
        Column::Str(v.into_iter().map(str::to_string).collect())
    }
}

/// A set of equal-length named columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    columns: BTreeMap<String, Column>,
    rows: usize,
}

impl Frame {
    pub fn new() -> Frame {
        Frame::default()
    }

    /// Add a column; every column must have the same row count.
    pub fn with_column(mut self, name: &str, column: impl Into<Column>) -> Result<Frame> {
        let column = column.into();
        if self.columns.is_empty() {
            self.rows = column.len();
        } else if column.len() != self.rows {
            return Err(TreeError::pivot(format!(
                "column '{name}' has {} rows, frame has {}",
                column.len(),
                self.rows
            )));
        }
        self.columns.insert(name.to_string(), column);
        Ok(self)
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    /// Look up a column by name.
    pub fn column(&self, name: &str) -> Result<&Column> {
        self.columns.get(name).ok_or_else(|| {
            TreeError::pivot(format!(
                "missing column '{name}', frame has: {}",
                self.column_names().join(", ")
            ))
        })
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.keys().map(String::as_str).collect()
    }
}
