use std::collections::BTreeMap;

use encoding_rs::{BIG5, UTF_16BE};
use lopdf::Object;
use lopdf::content::Content;

use crate::document::Document;
use crate::model::PageText;
use crate::table_parse::{soft_split_line_into_cells, split_line_into_cells};

fn looks_decoding_broken(text: &str) -> bool {
    if text.is_empty() {
        return false;
    }

    if text.contains("?Identity-H Unimplemented?") {
        return true;
    }

    let total = text.chars().count();
    if total == 0 {
        return false;
    }

    let replacement = text.matches('\u{FFFD}').count();
    let control = text
        .chars()
        .filter(|ch| ch.is_control() && !matches!(ch, '\n' | '\r' | '\t'))
        .count();
    let cjk_count = text
        .chars()
        .filter(|ch| {
            ('\u{4E00}'..='\u{9FFF}').contains(ch) || ('\u{3400}'..='\u{4DBF}').contains(ch)
        })
        .count();
    let ext_a_count = text
        .chars()
        .filter(|ch| ('\u{3400}'..='\u{4DBF}').contains(ch))
        .count();

    replacement * 8 > total
        || control * 5 > total
        || (cjk_count > 20 && ext_a_count * 4 > cjk_count)
}

pub(crate) fn decode_pdf_bytes(encoding: Option<&str>, bytes: &[u8]) -> String {
    let decoded = lopdf::Document::decode_text(encoding, bytes);
    if !looks_decoding_broken(&decoded) {
        return decoded;
    }

    if bytes.starts_with(&[0xFE, 0xFF]) {
        let (utf16, had_errors) = UTF_16BE.decode_without_bom_handling(&bytes[2..]);
        if !had_errors && !utf16.is_empty() {
            return utf16.into_owned();
        }
    }

    if let Some(name) = encoding {
        let lower = name.to_ascii_lowercase();

        if lower.contains("utf16")
            || lower.contains("ucs2")
            || lower.contains("identity-h")
            || lower.contains("unicode")
        {
            let (utf16, had_errors) = UTF_16BE.decode_without_bom_handling(bytes);
            if !had_errors && !utf16.is_empty() {
                return utf16.into_owned();
            }
        }

        if lower.contains("big5") || lower.contains("b5") || lower.contains("eten") {
            let (big5, _, had_errors) = BIG5.decode(bytes);
            if !had_errors && !big5.is_empty() {
                return big5.into_owned();
            }
        }
    }

    String::from_utf8_lossy(bytes).to_string()
}

/// Scores candidate page texts; multi-cell lines weigh the most.
fn extraction_quality_score(text: &str) -> i64 {
    if text.trim().is_empty() {
        return i64::MIN / 4;
    }

    let mut non_empty_lines = 0_i64;
    let mut multi_cell_lines = 0_i64;

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        non_empty_lines += 1;
        if line.contains('|')
            || split_line_into_cells(line).len() >= 2
            || soft_split_line_into_cells(line).len() >= 3
        {
            multi_cell_lines += 1;
        }
    }

    let broken_penalty = if looks_decoding_broken(text) { 800 } else { 0 };
    multi_cell_lines * 50 + non_empty_lines - broken_penalty
}

fn choose_best_text(candidates: Vec<String>) -> String {
    candidates
        .into_iter()
        .max_by_key(|text| extraction_quality_score(text))
        .unwrap_or_default()
}

fn extract_text_from_page_content(
    document: &lopdf::Document,
    page_id: lopdf::ObjectId,
) -> Option<String> {
    fn collect_text(text: &mut String, encoding: Option<&str>, operands: &[Object]) {
        for operand in operands {
            match operand {
                Object::String(bytes, _) => {
                    text.push_str(&decode_pdf_bytes(encoding, bytes));
                }
                Object::Array(items) => {
                    collect_text(text, encoding, items);
                    text.push(' ');
                }
                Object::Integer(value) => {
                    if *value < -100 {
                        text.push(' ');
                    }
                }
                _ => {}
            }
        }
    }

    let raw_content = document.get_page_content(page_id).ok()?;
    let content = Content::decode(&raw_content).ok()?;
    let encodings = document
        .get_page_fonts(page_id)
        .into_iter()
        .map(|(name, font)| (name, font.get_font_encoding()))
        .collect::<BTreeMap<Vec<u8>, &str>>();

    let mut lines = Vec::new();
    let mut current = String::new();
    let mut current_encoding = None;
    for operation in content.operations {
        match operation.operator.as_str() {
            "Tf" => {
                if let Some(font_name) = operation
                    .operands
                    .first()
                    .and_then(|operand| operand.as_name().ok())
                {
                    current_encoding = encodings.get(font_name).copied();
                }
            }
            "Tj" | "TJ" | "'" | "\"" => {
                collect_text(&mut current, current_encoding, &operation.operands);
            }
            "T*" | "Td" | "TD" | "ET" => {
                if !current.trim().is_empty() {
                    lines.push(std::mem::take(&mut current));
                }
            }
            _ => {}
        }
    }

    if !current.trim().is_empty() {
        lines.push(current);
    }

    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}

/// Reads the best available text for one 1-based page.
///
/// Candidates come from `pdf-extract`'s page split, a direct content-stream
/// walk, and `lopdf`'s own extractor; the most table-like one wins. An empty
/// page is not an error, a page that is missing from the page tree is.
pub(crate) fn read_page_text(document: &Document, page_number: u32) -> Result<PageText, String> {
    let pdf = document.pdf();
    let pages_map = pdf.get_pages();
    let Some(page_id) = pages_map.get(&page_number).copied() else {
        return Err(format!("page {page_number} is not present in the page tree"));
    };

    let mut candidates = Vec::new();
    if let Some(text) = document
        .extracted_page_text(page_number)
        .filter(|text| !text.trim().is_empty())
    {
        candidates.push(text.to_string());
    }
    if let Some(text) = extract_text_from_page_content(pdf, page_id) {
        candidates.push(text);
    }
    if let Some(text) = pdf
        .extract_text(&[page_number])
        .ok()
        .filter(|text| !text.trim().is_empty())
    {
        candidates.push(text);
    }

    if candidates.is_empty() && pdf.get_page_content(page_id).is_err() {
        return Err(format!("content stream of page {page_number} could not be read"));
    }

    Ok(PageText {
        page_number,
        text: choose_best_text(candidates),
    })
}

#[cfg(test)]
mod tests {
    use super::{choose_best_text, decode_pdf_bytes};

    #[test]
    fn decodes_big5_when_encoding_hint_is_present() {
        let (bytes, _, had_errors) = encoding_rs::BIG5.encode("測試");
        assert!(!had_errors);
        let decoded = decode_pdf_bytes(Some("ETen-B5-H"), &bytes);
        assert_eq!(decoded, "測試");
    }

    #[test]
    fn prefers_the_most_tabular_candidate() {
        let best = choose_best_text(vec![
            "Name Age Score Alice 30 98".to_string(),
            "Name  Age  Score\nAlice  30  98".to_string(),
        ]);
        assert!(best.contains('\n'));
    }
}
