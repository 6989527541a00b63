use std::fmt::Write;
use std::str::FromStr;

use html_escape::encode_text;
use serde::{Deserialize, Serialize};

use super::ExportSource;
use crate::model::ExtractedTable;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HtmlStyle {
    #[default]
    Plain,
    Striped,
    Bordered,
}

impl HtmlStyle {
    const fn class(self) -> &'static str {
        match self {
            Self::Plain => "dataframe",
            Self::Striped => "dataframe striped",
            Self::Bordered => "dataframe bordered",
        }
    }
}

impl FromStr for HtmlStyle {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "plain" => Ok(Self::Plain),
            "striped" => Ok(Self::Striped),
            "bordered" => Ok(Self::Bordered),
            other => Err(format!(
                "unknown HTML style '{other}', expected plain, striped or bordered"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HtmlOptions {
    pub style: HtmlStyle,
    pub include_index: bool,
    pub full_document: bool,
}

const STYLESHEET: &str = "table.dataframe { border-collapse: collapse; margin-bottom: 1.5em; }
table.dataframe th, table.dataframe td { padding: 4px 8px; text-align: left; }
table.dataframe caption { font-weight: bold; text-align: left; padding: 4px 0; }
table.striped tbody tr:nth-child(even) { background: #f2f2f2; }
table.bordered th, table.bordered td { border: 1px solid #999; }
";

// `write!` into a String cannot fail.
fn render_table(out: &mut String, table: &ExtractedTable, options: &HtmlOptions) {
    let _ = writeln!(out, "<table class=\"{}\">", options.style.class());
    let _ = writeln!(
        out,
        "<caption>Page {}, table {}</caption>",
        table.page, table.position
    );

    out.push_str("<thead><tr>");
    if options.include_index {
        out.push_str("<th></th>");
    }
    for column in &table.columns {
        let _ = write!(out, "<th>{}</th>", encode_text(column));
    }
    out.push_str("</tr></thead>\n<tbody>\n");

    for (index, row) in table.rows.iter().enumerate() {
        out.push_str("<tr>");
        if options.include_index {
            let _ = write!(out, "<th>{index}</th>");
        }
        for cell in row {
            let _ = write!(out, "<td>{}</td>", encode_text(cell));
        }
        out.push_str("</tr>\n");
    }
    out.push_str("</tbody>\n</table>\n");
}

pub(super) fn write(tables: &[ExtractedTable], source: &ExportSource, options: &HtmlOptions) -> String {
    let mut out = String::new();

    if options.full_document {
        let title = source
            .title
            .clone()
            .unwrap_or_else(|| source.file_name.clone());
        let _ = write!(
            out,
            "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{}</title>\n<style>\n{STYLESHEET}</style>\n</head>\n<body>\n",
            encode_text(&title)
        );
    }

    for table in tables {
        render_table(&mut out, table, options);
    }

    if options.full_document {
        out.push_str("</body>\n</html>\n");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::{HtmlOptions, HtmlStyle, write};
    use crate::export::ExportSource;
    use crate::{DetectionMode, ExtractedTable};

    fn table() -> ExtractedTable {
        ExtractedTable::new(
            2,
            1,
            DetectionMode::Lattice,
            None,
            vec!["name".to_string(), "note".to_string()],
            vec![vec!["<b>Ann</b>".to_string(), "R&D".to_string()]],
        )
    }

    #[test]
    fn escapes_cell_text() {
        let html = write(&[table()], &ExportSource::default(), &HtmlOptions::default());
        assert!(html.contains("<td>&lt;b&gt;Ann&lt;/b&gt;</td><td>R&amp;D</td>"));
        assert!(html.contains("<caption>Page 2, table 1</caption>"));
        assert!(!html.contains("<html>"));
    }

    #[test]
    fn index_column_and_document_wrapper_are_optional() {
        let options = HtmlOptions {
            style: HtmlStyle::Striped,
            include_index: true,
            full_document: true,
        };
        let source = ExportSource {
            file_name: "a&b.pdf".to_string(),
            ..ExportSource::default()
        };
        let html = write(&[table()], &source, &options);
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("<title>a&amp;b.pdf</title>"));
        assert!(html.contains("<table class=\"dataframe striped\">"));
        assert!(html.contains("<thead><tr><th></th><th>name</th>"));
        assert!(html.contains("<tr><th>0</th><td>"));
    }
}
