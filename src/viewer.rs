use std::fmt::{Display, Formatter};
use std::str::FromStr;

use pdf_table_extract::{ExtractedTable, parse_number};
use serde::{Deserialize, Serialize};

use crate::session::SessionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartKind {
    #[default]
    Bar,
    Line,
    Area,
}

impl Display for ChartKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Bar => "bar",
            Self::Line => "line",
            Self::Area => "area",
        })
    }
}

impl FromStr for ChartKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "bar" => Ok(Self::Bar),
            "line" => Ok(Self::Line),
            "area" => Ok(Self::Area),
            other => Err(format!(
                "unknown chart kind '{other}', expected bar, line or area"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartData {
    pub kind: ChartKind,
    pub label_column: String,
    pub value_column: String,
    pub labels: Vec<String>,
    pub values: Vec<f64>,
    /// Rows whose value cell is not numeric.
    pub skipped: usize,
}

fn check_column(table: &ExtractedTable, column: usize) -> Result<(), SessionError> {
    if column < table.column_count() {
        Ok(())
    } else {
        Err(SessionError::ColumnOutOfRange {
            column,
            columns: table.column_count(),
        })
    }
}

/// Pairs each row's label with its numeric value.
pub fn chart_series(
    table: &ExtractedTable,
    label_column: usize,
    value_column: usize,
    kind: ChartKind,
) -> Result<ChartData, SessionError> {
    check_column(table, label_column)?;
    check_column(table, value_column)?;

    let mut labels = Vec::new();
    let mut values = Vec::new();
    let mut skipped = 0;
    for row in &table.rows {
        match parse_number(&row[value_column]) {
            Some(value) => {
                labels.push(row[label_column].trim().to_string());
                values.push(value);
            }
            None => skipped += 1,
        }
    }

    Ok(ChartData {
        kind,
        label_column: table.columns[label_column].clone(),
        value_column: table.columns[value_column].clone(),
        labels,
        values,
        skipped,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableSummary {
    pub index: usize,
    pub page: u32,
    pub position: usize,
    pub rows: usize,
    pub columns: usize,
    pub numeric_columns: Vec<usize>,
    pub confidence: Option<f32>,
}

impl TableSummary {
    #[must_use]
    pub fn of(index: usize, table: &ExtractedTable) -> Self {
        Self {
            index,
            page: table.page,
            position: table.position,
            rows: table.row_count(),
            columns: table.column_count(),
            numeric_columns: table.numeric_columns(),
            confidence: table.confidence,
        }
    }
}

/// A full table together with its summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableView {
    pub summary: TableSummary,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl TableView {
    #[must_use]
    pub fn of(index: usize, table: &ExtractedTable) -> Self {
        Self {
            summary: TableSummary::of(index, table),
            columns: table.columns.clone(),
            rows: table.rows.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use pdf_table_extract::{DetectionMode, ExtractedTable};

    use super::{ChartKind, TableSummary, chart_series};
    use crate::session::SessionError;

    fn sales() -> ExtractedTable {
        ExtractedTable::new(
            3,
            1,
            DetectionMode::Stream,
            Some(0.75),
            vec!["Region".to_string(), "Revenue".to_string()],
            vec![
                vec!["North".to_string(), "1,200".to_string()],
                vec!["South".to_string(), "n/a".to_string()],
                vec!["West".to_string(), "15%".to_string()],
            ],
        )
    }

    #[test]
    fn chart_series_skips_non_numeric_rows() {
        let chart = chart_series(&sales(), 0, 1, ChartKind::Line).expect("valid columns");
        assert_eq!(chart.labels, vec!["North", "West"]);
        assert_eq!(chart.values, vec![1200.0, 15.0]);
        assert_eq!(chart.skipped, 1);
        assert_eq!(chart.value_column, "Revenue");
        assert_eq!(chart.kind, ChartKind::Line);
    }

    #[test]
    fn chart_series_rejects_unknown_column() {
        let err = chart_series(&sales(), 0, 2, ChartKind::Bar).expect_err("column 2 is missing");
        assert!(matches!(err, SessionError::ColumnOutOfRange { column: 2, columns: 2 }));
    }

    #[test]
    fn summary_lists_numeric_columns() {
        let mut table = sales();
        table.set_cell(1, 1, "7");
        let summary = TableSummary::of(0, &table);
        assert_eq!(summary.numeric_columns, vec![1]);
        assert_eq!((summary.rows, summary.columns), (3, 2));
    }
}
