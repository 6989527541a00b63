use std::fmt::{Display, Formatter};
use std::str::FromStr;

use chrono::{SecondsFormat, Utc};
use rust_xlsxwriter::{ColNum, Format, RowNum, Workbook, Worksheet};
use serde::{Deserialize, Serialize};

use super::{ExportSource, METADATA_SHEET, numeric_cell, sheet_names};
use crate::error::ExtractError;
use crate::model::ExtractedTable;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SheetNaming {
    /// `table_{page}.{n}`
    #[default]
    Page,
    /// `table_{i}`
    Sequential,
}

impl Display for SheetNaming {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Page => "page",
            Self::Sequential => "sequential",
        })
    }
}

impl FromStr for SheetNaming {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "page" => Ok(Self::Page),
            "sequential" => Ok(Self::Sequential),
            other => Err(format!(
                "unknown sheet naming '{other}', expected page or sequential"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExcelOptions {
    pub naming: SheetNaming,
    pub include_metadata: bool,
}

fn row_num(index: usize) -> Result<RowNum, ExtractError> {
    RowNum::try_from(index)
        .map_err(|_| ExtractError::Export("table has too many rows for Excel".to_string()))
}

fn col_num(index: usize) -> Result<ColNum, ExtractError> {
    ColNum::try_from(index)
        .map_err(|_| ExtractError::Export("table has too many columns for Excel".to_string()))
}

fn write_table(
    sheet: &mut Worksheet,
    table: &ExtractedTable,
    bold: &Format,
) -> Result<(), ExtractError> {
    for (column, label) in table.columns.iter().enumerate() {
        sheet.write_string_with_format(0, col_num(column)?, label, bold)?;
    }

    for (row_index, row) in table.rows.iter().enumerate() {
        let row_index = row_num(row_index + 1)?;
        for (column, value) in row.iter().enumerate() {
            let column = col_num(column)?;
            if let Some(number) = numeric_cell(value) {
                sheet.write_number(row_index, column, number)?;
            } else if !value.is_empty() {
                sheet.write_string(row_index, column, value)?;
            }
        }
    }

    if !table.columns.is_empty() {
        sheet.set_freeze_panes(1, 0)?;
    }
    Ok(())
}

fn write_metadata(
    sheet: &mut Worksheet,
    tables: &[ExtractedTable],
    names: &[String],
    source: &ExportSource,
    bold: &Format,
) -> Result<(), ExtractError> {
    sheet.set_name(METADATA_SHEET)?;

    let mut pairs = vec![
        ("Source file", source.file_name.clone()),
        ("Pages in document", source.page_count.to_string()),
        ("Title", source.title.clone().unwrap_or_default()),
        ("Author", source.author.clone().unwrap_or_default()),
    ];
    if let Some(settings) = &source.settings {
        pairs.push(("Pages extracted", settings.pages.clone()));
        pairs.push(("Detection mode", settings.mode.to_string()));
        pairs.push(("Quality", settings.quality.as_str().to_string()));
        pairs.push(("Minimum rows", settings.min_rows.to_string()));
    }
    pairs.push((
        "Exported at",
        Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
    ));

    for (row, (key, value)) in pairs.iter().enumerate() {
        let row = row_num(row)?;
        sheet.write_string_with_format(row, 0, *key, bold)?;
        sheet.write_string(row, 1, value)?;
    }

    let listing_start = pairs.len() + 1;
    for (column, label) in ["Sheet", "Page", "Position", "Rows", "Columns", "Confidence"]
        .into_iter()
        .enumerate()
    {
        sheet.write_string_with_format(row_num(listing_start)?, col_num(column)?, label, bold)?;
    }
    for (offset, (table, name)) in tables.iter().zip(names).enumerate() {
        let row = row_num(listing_start + 1 + offset)?;
        sheet.write_string(row, 0, name)?;
        sheet.write_number(row, 1, table.page)?;
        sheet.write_number(row, 2, u32::try_from(table.position).unwrap_or(u32::MAX))?;
        sheet.write_number(row, 3, u32::try_from(table.row_count()).unwrap_or(u32::MAX))?;
        sheet.write_number(row, 4, u32::try_from(table.column_count()).unwrap_or(u32::MAX))?;
        if let Some(confidence) = table.confidence {
            sheet.write_number(row, 5, confidence)?;
        }
    }

    sheet.set_column_width(0, 20)?;
    sheet.set_column_width(1, 40)?;
    Ok(())
}

/// One sheet per table, plus an optional metadata sheet at the end.
pub(super) fn write(
    tables: &[ExtractedTable],
    source: &ExportSource,
    options: &ExcelOptions,
) -> Result<Vec<u8>, ExtractError> {
    let names = sheet_names(tables, options.naming);
    let bold = Format::new().set_bold();
    let mut workbook = Workbook::new();

    for (table, name) in tables.iter().zip(&names) {
        let sheet = workbook.add_worksheet();
        sheet.set_name(name)?;
        write_table(sheet, table, &bold)?;
    }

    if options.include_metadata {
        let sheet = workbook.add_worksheet();
        write_metadata(sheet, tables, &names, source, &bold)?;
    }

    Ok(workbook.save_to_buffer()?)
}
