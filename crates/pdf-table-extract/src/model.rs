use serde::{Deserialize, Serialize};

use crate::options::DetectionMode;
use crate::table_parse::{normalize_rows, parse_number};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageText {
    pub page_number: u32,
    pub text: String,
}

/// Detector output for one table, before header and row filtering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTable {
    pub page: u32,
    pub rows: Vec<Vec<String>>,
    pub confidence: Option<f32>,
}

/// One detected table with its extraction metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedTable {
    pub page: u32,
    /// 1-based detection order within `page`.
    pub position: usize,
    pub mode: DetectionMode,
    pub confidence: Option<f32>,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl ExtractedTable {
    /// Builds a rectangular table. Missing column labels become their index.
    #[must_use]
    pub fn new(
        page: u32,
        position: usize,
        mode: DetectionMode,
        confidence: Option<f32>,
        columns: Vec<String>,
        rows: Vec<Vec<String>>,
    ) -> Self {
        let width = rows
            .iter()
            .map(Vec::len)
            .max()
            .unwrap_or(0)
            .max(columns.len());
        let mut columns = columns;
        for index in columns.len()..width {
            columns.push(index.to_string());
        }

        Self {
            page,
            position,
            mode,
            confidence,
            columns,
            rows: normalize_rows(&rows, width),
        }
    }

    #[must_use]
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    #[must_use]
    pub fn cell(&self, row: usize, column: usize) -> Option<&str> {
        self.rows
            .get(row)
            .and_then(|cells| cells.get(column))
            .map(String::as_str)
    }

    /// Replaces one cell and returns the previous value, or `None` when out of bounds.
    pub fn set_cell(&mut self, row: usize, column: usize, value: impl Into<String>) -> Option<String> {
        let slot = self.rows.get_mut(row)?.get_mut(column)?;
        Some(std::mem::replace(slot, value.into()))
    }

    pub fn rename_column(&mut self, column: usize, label: impl Into<String>) -> Option<String> {
        let slot = self.columns.get_mut(column)?;
        Some(std::mem::replace(slot, label.into()))
    }

    /// Columns whose non-empty cells all parse as numbers.
    #[must_use]
    pub fn numeric_columns(&self) -> Vec<usize> {
        (0..self.column_count())
            .filter(|&column| {
                let mut seen = false;
                for row in &self.rows {
                    let value = row[column].trim();
                    if value.is_empty() {
                        continue;
                    }
                    if parse_number(value).is_none() {
                        return false;
                    }
                    seen = true;
                }
                seen
            })
            .collect()
    }
}
