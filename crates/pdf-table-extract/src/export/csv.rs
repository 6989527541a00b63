use csv::WriterBuilder;
use encoding_rs::{Encoding, UTF_8};
use serde::{Deserialize, Serialize};

use crate::error::ExtractError;
use crate::model::ExtractedTable;
use crate::table_parse::normalize_rows;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// The grid written to one CSV file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct MergedOutput {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub table_count: usize,
    pub row_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CsvOptions {
    pub delimiter: char,
    /// `utf-8`, `utf-8-sig` or any WHATWG encoding label.
    pub encoding: String,
    pub include_header: bool,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            delimiter: ',',
            encoding: "utf-8".to_string(),
            include_header: true,
        }
    }
}

impl CsvOptions {
    pub fn delimiter_byte(&self) -> Result<u8, ExtractError> {
        match u8::try_from(self.delimiter) {
            Ok(byte) if self.delimiter.is_ascii() && !matches!(self.delimiter, '"' | '\r' | '\n') => {
                Ok(byte)
            }
            _ => Err(ExtractError::InvalidOption(format!(
                "delimiter must be a single ASCII character other than a quote or newline, got {:?}",
                self.delimiter
            ))),
        }
    }

    /// Resolves the label to an encoder and whether a UTF-8 BOM is written.
    pub fn resolve_encoding(&self) -> Result<(&'static Encoding, bool), ExtractError> {
        let label = self.encoding.trim().to_ascii_lowercase();
        if matches!(label.as_str(), "utf-8-sig" | "utf8-sig") {
            return Ok((UTF_8, true));
        }
        let encoding = Encoding::for_label(label.as_bytes()).ok_or_else(|| {
            ExtractError::InvalidOption(format!("unknown text encoding '{}'", self.encoding))
        })?;
        if encoding.output_encoding() != encoding {
            return Err(ExtractError::InvalidOption(format!(
                "CSV cannot be written as {}; UTF-16 is not supported, use utf-8",
                encoding.name()
            )));
        }
        Ok((encoding, false))
    }
}

/// Stacks tables into one grid with leading `page` and `table_id` columns.
///
/// Column labels are kept where every table agrees on them, otherwise the
/// position-based `col_{n}` label is used.
pub(crate) fn merge_tables(tables: &[ExtractedTable]) -> MergedOutput {
    let width = tables
        .iter()
        .map(ExtractedTable::column_count)
        .max()
        .unwrap_or(0);

    let mut headers = vec!["page".to_string(), "table_id".to_string()];
    headers.extend((0..width).map(|index| {
        let mut labels = tables.iter().filter_map(|table| table.columns.get(index));
        match labels.next() {
            Some(first) if labels.all(|label| label == first) => first.clone(),
            _ => format!("col_{}", index + 1),
        }
    }));

    let mut rows = Vec::new();
    for (index, table) in tables.iter().enumerate() {
        for data_row in normalize_rows(&table.rows, width) {
            let mut row = Vec::with_capacity(width + 2);
            row.push(table.page.to_string());
            row.push((index + 1).to_string());
            row.extend(data_row);
            rows.push(row);
        }
    }

    MergedOutput {
        headers,
        row_count: rows.len(),
        table_count: tables.len(),
        rows,
    }
}

fn grid_for(tables: &[ExtractedTable]) -> MergedOutput {
    match tables {
        [single] => MergedOutput {
            headers: single.columns.clone(),
            rows: single.rows.clone(),
            table_count: 1,
            row_count: single.row_count(),
        },
        many => merge_tables(many),
    }
}

fn write_csv_to_string(
    merged: &MergedOutput,
    delimiter: u8,
    include_header: bool,
) -> Result<String, ExtractError> {
    let mut writer = WriterBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_writer(Vec::<u8>::new());
    if include_header {
        writer.write_record(&merged.headers)?;
    }
    for row in &merged.rows {
        writer.write_record(row)?;
    }
    writer.flush()?;

    let bytes = writer
        .into_inner()
        .map_err(|error| ExtractError::Csv(error.into_error().into()))?;
    String::from_utf8(bytes)
        .map_err(|error| ExtractError::Export(format!("invalid utf-8 csv output: {error}")))
}

/// Returns the encoded bytes and the content type naming their charset.
pub(super) fn write(
    tables: &[ExtractedTable],
    options: &CsvOptions,
) -> Result<(Vec<u8>, String), ExtractError> {
    let delimiter = options.delimiter_byte()?;
    let (encoding, bom) = options.resolve_encoding()?;
    let text = write_csv_to_string(&grid_for(tables), delimiter, options.include_header)?;

    let (encoded, _, had_errors) = encoding.encode(&text);
    if had_errors {
        return Err(ExtractError::Export(format!(
            "some characters cannot be represented in {}; choose utf-8 instead",
            encoding.name()
        )));
    }

    let mut bytes = Vec::with_capacity(encoded.len() + UTF8_BOM.len());
    if bom {
        bytes.extend_from_slice(UTF8_BOM);
    }
    bytes.extend_from_slice(&encoded);

    let content_type = format!("text/csv; charset={}", encoding.name().to_ascii_lowercase());
    Ok((bytes, content_type))
}
