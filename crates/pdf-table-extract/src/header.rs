use crate::model::RawTable;
use crate::options::HeaderMode;
use crate::table_parse::parse_number;
use crate::warning::{ExtractWarning, WarningCode};

const HEADER_CONFIDENCE_THRESHOLD: f32 = 0.55;

#[allow(clippy::cast_precision_loss)]
fn non_numeric_ratio(cells: &[String]) -> f32 {
    let filled = cells
        .iter()
        .filter(|cell| !cell.trim().is_empty())
        .collect::<Vec<_>>();
    if filled.is_empty() {
        return 0.0;
    }

    let non_numeric = filled
        .iter()
        .filter(|cell| parse_number(cell).is_none())
        .count();
    non_numeric as f32 / filled.len() as f32
}

pub(crate) fn infer_has_header(rows: &[Vec<String>]) -> (bool, f32) {
    if rows.is_empty() {
        return (false, 0.0);
    }

    let first = non_numeric_ratio(&rows[0]);
    let second = rows.get(1).map_or(0.0, |row| non_numeric_ratio(row));

    let confidence = (first * 0.6 + (1.0 - second) * 0.4).clamp(0.0, 1.0);
    let has_header = first >= 0.6 && second <= 0.7;
    (has_header, confidence)
}

/// Splits a detected table into column labels and data rows.
///
/// Empty labels mean "use the column index"; `ExtractedTable::new` fills them.
pub(crate) fn split_header(
    table: &RawTable,
    mode: HeaderMode,
    warnings: &mut Vec<ExtractWarning>,
    table_id: usize,
) -> (Vec<String>, Vec<Vec<String>>) {
    if table.rows.is_empty() {
        return (Vec::new(), Vec::new());
    }

    let promote = || {
        let header = table.rows[0]
            .iter()
            .enumerate()
            .map(|(index, label)| {
                if label.trim().is_empty() {
                    index.to_string()
                } else {
                    label.trim().to_string()
                }
            })
            .collect::<Vec<_>>();
        (header, table.rows[1..].to_vec())
    };

    match mode {
        HeaderMode::HasHeader => promote(),
        HeaderMode::NoHeader => (Vec::new(), table.rows.clone()),
        HeaderMode::AutoDetect => {
            let (has_header, confidence) = infer_has_header(&table.rows);
            if has_header && confidence >= HEADER_CONFIDENCE_THRESHOLD {
                return promote();
            }

            if confidence < HEADER_CONFIDENCE_THRESHOLD {
                warnings.push(
                    ExtractWarning::new(
                        WarningCode::HeaderInferenceLowConfidence,
                        "header inference confidence is low; keeping the first row as data",
                    )
                    .with_page(table.page)
                    .with_table_id(table_id)
                    .with_confidence(confidence),
                );
            }

            (Vec::new(), table.rows.clone())
        }
    }
}
