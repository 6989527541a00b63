use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::ser::PrettyFormatter;
use serde_json::{Map, Number, Value, json};

use super::{SheetNaming, numeric_cell, sheet_names};
use crate::error::ExtractError;
use crate::model::ExtractedTable;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JsonOrientation {
    /// `[{column: value}]`
    #[default]
    Records,
    /// `{column: {row: value}}`
    Columns,
    /// `{row: {column: value}}`
    Index,
    /// `{columns, index, data}`
    Split,
    /// `[[value]]`
    Values,
}

impl FromStr for JsonOrientation {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "records" => Ok(Self::Records),
            "columns" => Ok(Self::Columns),
            "index" => Ok(Self::Index),
            "split" => Ok(Self::Split),
            "values" => Ok(Self::Values),
            other => Err(format!(
                "unknown JSON orientation '{other}', expected records, columns, index, split or values"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct JsonOptions {
    pub orientation: JsonOrientation,
    /// Spaces per level; 0 writes compact JSON.
    pub indent: usize,
}

fn cell_value(cell: &str) -> Value {
    let Some(number) = numeric_cell(cell) else {
        return Value::String(cell.to_string());
    };
    let trimmed = cell.trim();
    if let Ok(integer) = trimmed.parse::<i64>() {
        return Value::Number(integer.into());
    }
    Number::from_f64(number).map_or_else(|| Value::String(cell.to_string()), Value::Number)
}

fn table_value(table: &ExtractedTable, orientation: JsonOrientation) -> Value {
    let record = |row: &Vec<String>| {
        table
            .columns
            .iter()
            .zip(row)
            .map(|(column, cell)| (column.clone(), cell_value(cell)))
            .collect::<Map<_, _>>()
    };

    match orientation {
        JsonOrientation::Records => {
            Value::Array(table.rows.iter().map(|row| Value::Object(record(row))).collect())
        }
        JsonOrientation::Index => Value::Object(
            table
                .rows
                .iter()
                .enumerate()
                .map(|(index, row)| (index.to_string(), Value::Object(record(row))))
                .collect(),
        ),
        JsonOrientation::Columns => Value::Object(
            table
                .columns
                .iter()
                .enumerate()
                .map(|(column_index, column)| {
                    let cells = table
                        .rows
                        .iter()
                        .enumerate()
                        .map(|(row_index, row)| (row_index.to_string(), cell_value(&row[column_index])))
                        .collect::<Map<_, _>>();
                    (column.clone(), Value::Object(cells))
                })
                .collect(),
        ),
        JsonOrientation::Split => json!({
            "columns": table.columns,
            "index": (0..table.row_count()).collect::<Vec<_>>(),
            "data": values(table),
        }),
        JsonOrientation::Values => values(table),
    }
}

fn values(table: &ExtractedTable) -> Value {
    Value::Array(
        table
            .rows
            .iter()
            .map(|row| Value::Array(row.iter().map(|cell| cell_value(cell)).collect()))
            .collect(),
    )
}

pub(super) fn write(
    tables: &[ExtractedTable],
    options: &JsonOptions,
    naming: SheetNaming,
) -> Result<Vec<u8>, ExtractError> {
    let document = match tables {
        [single] => table_value(single, options.orientation),
        many => Value::Object(
            sheet_names(many, naming)
                .into_iter()
                .zip(many)
                .map(|(name, table)| (name, table_value(table, options.orientation)))
                .collect(),
        ),
    };

    if options.indent == 0 {
        return Ok(serde_json::to_vec(&document)?);
    }

    let indent = vec![b' '; options.indent];
    let mut bytes = Vec::new();
    let mut serializer =
        serde_json::Serializer::with_formatter(&mut bytes, PrettyFormatter::with_indent(&indent));
    document.serialize(&mut serializer)?;
    Ok(bytes)
}
