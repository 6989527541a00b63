//! Serializes extracted tables into downloadable artifacts.

mod csv;
mod excel;
mod html;
mod json;

use std::collections::HashSet;
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::document::Document;
use crate::error::ExtractError;
use crate::model::ExtractedTable;
use crate::options::ExtractionSettings;

pub use self::csv::CsvOptions;
pub use self::excel::{ExcelOptions, SheetNaming};
pub use self::html::{HtmlOptions, HtmlStyle};
pub use self::json::{JsonOptions, JsonOrientation};

/// Excel refuses longer sheet names.
pub const MAX_SHEET_NAME_LEN: usize = 31;
pub(crate) const METADATA_SHEET: &str = "metadata";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Csv,
    Excel,
    Json,
    Html,
}

impl ExportFormat {
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Excel => "xlsx",
            Self::Json => "json",
            Self::Html => "html",
        }
    }

    /// Guesses the format from an output path such as `tables.xlsx`.
    #[must_use]
    pub fn from_extension(path: &str) -> Option<Self> {
        let (_, extension) = path.rsplit_once('.')?;
        match extension.to_ascii_lowercase().as_str() {
            "csv" | "txt" => Some(Self::Csv),
            "xlsx" => Some(Self::Excel),
            "json" => Some(Self::Json),
            "html" | "htm" => Some(Self::Html),
            _ => None,
        }
    }
}

impl Display for ExportFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Csv => "csv",
            Self::Excel => "excel",
            Self::Json => "json",
            Self::Html => "html",
        })
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "excel" | "xlsx" => Ok(Self::Excel),
            "json" => Ok(Self::Json),
            "html" => Ok(Self::Html),
            other => Err(format!(
                "unknown export format '{other}', expected csv, excel, json or html"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportScope {
    #[default]
    Selected,
    All,
}

impl FromStr for ExportScope {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "selected" | "current" => Ok(Self::Selected),
            "all" => Ok(Self::All),
            other => Err(format!(
                "unknown export scope '{other}', expected selected or all"
            )),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportOptions {
    pub format: ExportFormat,
    pub scope: ExportScope,
    pub csv: CsvOptions,
    pub excel: ExcelOptions,
    pub json: JsonOptions,
    pub html: HtmlOptions,
}

/// Where the tables came from; feeds file names and the Excel metadata sheet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExportSource {
    pub file_name: String,
    pub page_count: u32,
    pub title: Option<String>,
    pub author: Option<String>,
    pub settings: Option<ExtractionSettings>,
}

impl ExportSource {
    #[must_use]
    pub fn from_document(document: &Document, settings: Option<&ExtractionSettings>) -> Self {
        Self {
            file_name: document.name().to_string(),
            page_count: document.page_count(),
            title: document.metadata().title.clone(),
            author: document.metadata().author.clone(),
            settings: settings.cloned(),
        }
    }

    #[must_use]
    pub fn stem(&self) -> String {
        let stem = self
            .file_name
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or_default();
        let stem = stem
            .rsplit_once('.')
            .map_or(stem, |(stem, _)| stem);
        sanitize_file_stem(stem)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportArtifact {
    pub bytes: Vec<u8>,
    pub file_name: String,
    pub content_type: String,
}

/// Serializes the selected table, or every table, in the requested format.
///
/// `selected` is a zero-based index into `tables` and only matters for
/// [`ExportScope::Selected`].
pub fn export_tables(
    tables: &[ExtractedTable],
    selected: usize,
    source: &ExportSource,
    options: &ExportOptions,
) -> Result<ExportArtifact, ExtractError> {
    if tables.is_empty() {
        return Err(ExtractError::Export(
            "there are no tables to export; run an extraction first".to_string(),
        ));
    }

    let chosen: &[ExtractedTable] = match options.scope {
        ExportScope::All => tables,
        ExportScope::Selected => {
            let Some(table) = tables.get(selected) else {
                return Err(ExtractError::Export(format!(
                    "no table at index {selected}; {} table(s) available",
                    tables.len()
                )));
            };
            std::slice::from_ref(table)
        }
    };

    let (bytes, content_type) = match options.format {
        ExportFormat::Csv => self::csv::write(chosen, &options.csv)?,
        ExportFormat::Excel => (
            self::excel::write(chosen, source, &options.excel)?,
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet".to_string(),
        ),
        ExportFormat::Json => (
            self::json::write(chosen, &options.json, options.excel.naming)?,
            "application/json".to_string(),
        ),
        ExportFormat::Html => (
            self::html::write(chosen, source, &options.html).into_bytes(),
            "text/html; charset=utf-8".to_string(),
        ),
    };

    let file_name = suggested_file_name(&source.stem(), options.format, options.scope, selected);
    info!(
        format = %options.format,
        tables = chosen.len(),
        bytes = bytes.len(),
        file_name,
        "exported tables"
    );

    Ok(ExportArtifact {
        bytes,
        file_name,
        content_type,
    })
}

fn stem_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"[^A-Za-z0-9._-]+").expect("hardcoded file stem regex is valid")
    })
}

/// Replaces anything outside `[A-Za-z0-9._-]` so the name is safe in a header.
#[must_use]
pub fn sanitize_file_stem(stem: &str) -> String {
    let cleaned = stem_pattern().replace_all(stem.trim(), "_");
    let cleaned = cleaned.trim_matches(['_', '.']);
    if cleaned.is_empty() {
        "document".to_string()
    } else {
        cleaned.to_string()
    }
}

#[must_use]
pub fn suggested_file_name(
    stem: &str,
    format: ExportFormat,
    scope: ExportScope,
    selected: usize,
) -> String {
    match (format, scope) {
        (ExportFormat::Csv, ExportScope::Selected) => format!("{stem}_table_{}.csv", selected + 1),
        (ExportFormat::Csv, ExportScope::All) => format!("{stem}_tables.csv"),
        (format, _) => format!("{stem}.{}", format.extension()),
    }
}

fn unique_sheet_name(base: &str, used: &mut HashSet<String>) -> String {
    let truncated = base.chars().take(MAX_SHEET_NAME_LEN).collect::<String>();
    if used.insert(truncated.to_lowercase()) {
        return truncated;
    }

    let mut counter = 2_usize;
    loop {
        let suffix = format!("~{counter}");
        let keep = MAX_SHEET_NAME_LEN.saturating_sub(suffix.len());
        let candidate = format!(
            "{}{suffix}",
            base.chars().take(keep).collect::<String>()
        );
        if used.insert(candidate.to_lowercase()) {
            return candidate;
        }
        counter += 1;
    }
}

/// Sheet-style names for `tables`, unique case-insensitively and at most 31 chars.
///
/// Names never collide with the metadata sheet.
#[must_use]
pub fn sheet_names(tables: &[ExtractedTable], naming: SheetNaming) -> Vec<String> {
    let mut used = HashSet::from([METADATA_SHEET.to_string()]);
    let mut per_page: Vec<(u32, usize)> = Vec::new();

    tables
        .iter()
        .enumerate()
        .map(|(index, table)| {
            let base = match naming {
                SheetNaming::Sequential => format!("table_{}", index + 1),
                SheetNaming::Page => {
                    let counter = match per_page.iter_mut().find(|(page, _)| *page == table.page) {
                        Some((_, count)) => {
                            *count += 1;
                            *count
                        }
                        None => {
                            per_page.push((table.page, 1));
                            1
                        }
                    };
                    format!("table_{}.{counter}", table.page)
                }
            };
            unique_sheet_name(&base, &mut used)
        })
        .collect()
}

/// A cell that should be written with a numeric type.
pub(crate) fn numeric_cell(value: &str) -> Option<f64> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed.starts_with('+') {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|number| number.is_finite())
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::{
        ExportFormat, ExportOptions, ExportScope, ExportSource, SheetNaming, export_tables,
        numeric_cell, sanitize_file_stem, sheet_names, suggested_file_name, unique_sheet_name,
    };
    use crate::{DetectionMode, ExtractError, ExtractedTable};

    fn table(page: u32, position: usize) -> ExtractedTable {
        ExtractedTable::new(
            page,
            position,
            DetectionMode::Stream,
            None,
            vec!["item".to_string(), "qty".to_string()],
            vec![vec!["pen".to_string(), "3".to_string()]],
        )
    }

    #[test]
    fn page_naming_counts_tables_per_page() {
        let tables = vec![table(1, 1), table(2, 1), table(2, 2)];
        assert_eq!(
            sheet_names(&tables, SheetNaming::Page),
            vec!["table_1.1", "table_2.1", "table_2.2"]
        );
        assert_eq!(
            sheet_names(&tables, SheetNaming::Sequential),
            vec!["table_1", "table_2", "table_3"]
        );
    }

    #[test]
    fn truncated_names_stay_unique() {
        let mut used = HashSet::new();
        let long = "a".repeat(40);
        let first = unique_sheet_name(&long, &mut used);
        let second = unique_sheet_name(&long, &mut used);
        assert_eq!(first.chars().count(), 31);
        assert_eq!(second.chars().count(), 31);
        assert!(second.ends_with("~2"));
        assert_ne!(first, second);
    }

    #[test]
    fn sanitizes_stems_and_suggests_names() {
        assert_eq!(sanitize_file_stem("Q3 report (final)"), "Q3_report_final");
        assert_eq!(sanitize_file_stem("///"), "document");

        let source = ExportSource {
            file_name: "uploads/Annual Report.pdf".to_string(),
            ..ExportSource::default()
        };
        assert_eq!(source.stem(), "Annual_Report");
        assert_eq!(
            suggested_file_name("r", ExportFormat::Csv, ExportScope::Selected, 1),
            "r_table_2.csv"
        );
        assert_eq!(
            suggested_file_name("r", ExportFormat::Csv, ExportScope::All, 0),
            "r_tables.csv"
        );
        assert_eq!(
            suggested_file_name("r", ExportFormat::Excel, ExportScope::All, 0),
            "r.xlsx"
        );
    }

    #[test]
    fn empty_table_list_is_an_export_error() {
        let err = export_tables(&[], 0, &ExportSource::default(), &ExportOptions::default())
            .expect_err("nothing to export");
        assert!(matches!(err, ExtractError::Export(_)));
    }

    #[test]
    fn selected_scope_exports_one_table() {
        let tables = vec![table(1, 1), table(1, 2)];
        let source = ExportSource {
            file_name: "stock.pdf".to_string(),
            ..ExportSource::default()
        };
        let artifact =
            export_tables(&tables, 1, &source, &ExportOptions::default()).expect("artifact");
        assert_eq!(artifact.file_name, "stock_table_2.csv");
        assert_eq!(String::from_utf8_lossy(&artifact.bytes), "item,qty\npen,3\n");
    }

    #[test]
    fn numeric_cells_are_plain_numbers_only() {
        assert_eq!(numeric_cell(" 12.5 "), Some(12.5));
        assert_eq!(numeric_cell("-3"), Some(-3.0));
        assert_eq!(numeric_cell("1,200"), None);
        assert_eq!(numeric_cell("NaN"), None);
        assert_eq!(numeric_cell(""), None);
    }
}
