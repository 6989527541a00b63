use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::detect::{TableDetector, panic_message};
use crate::document::Document;
use crate::error::ExtractError;
use crate::header::split_header;
use crate::model::{ExtractedTable, RawTable};
use crate::options::{ExtractionSettings, PageSelection, QualityMode};
use crate::table_detect::LOW_CONFIDENCE_THRESHOLD;
use crate::warning::{ExtractWarning, WarningCode};

pub const DEFAULT_BATCH_SIZE: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExtractionProgress {
    pub page: u32,
    pub completed: usize,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractionOutcome {
    pub pages: Vec<u32>,
    pub tables: Vec<ExtractedTable>,
    pub warnings: Vec<ExtractWarning>,
    pub failed_pages: Vec<u32>,
}

/// Runs a detector over a page selection and post-processes its tables.
pub struct Extractor<'a> {
    detector: &'a dyn TableDetector,
    batch_size: usize,
}

impl<'a> Extractor<'a> {
    #[must_use]
    pub fn new(detector: &'a dyn TableDetector) -> Self {
        Self {
            detector,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn run(
        &self,
        document: &Document,
        settings: &ExtractionSettings,
        progress: &mut dyn FnMut(ExtractionProgress),
    ) -> Result<ExtractionOutcome, ExtractError> {
        settings.validate()?;
        let pages = PageSelection::parse(&settings.pages, document.page_count())?.pages();
        info!(
            detector = self.detector.name(),
            mode = %settings.mode,
            pages = pages.len(),
            "starting table extraction"
        );

        let mut warnings = Vec::new();
        let mut failed_pages = Vec::new();
        let mut detected: BTreeMap<u32, Vec<RawTable>> = BTreeMap::new();
        let mut completed = 0;

        for batch in pages.chunks(self.batch_size) {
            let detection = panic::catch_unwind(AssertUnwindSafe(|| {
                self.detector
                    .detect(document, batch, settings.mode, settings.min_cols)
            }))
            .unwrap_or_else(|payload| {
                Err(ExtractError::Extraction(format!(
                    "detector panicked: {}",
                    panic_message(&*payload)
                )))
            });
            let mut by_page = match detection {
                Ok(detections) => detections
                    .into_iter()
                    .map(|detection| (detection.page, detection.outcome))
                    .collect::<BTreeMap<_, _>>(),
                Err(error @ ExtractError::MissingSystemDependency { .. }) => return Err(error),
                Err(error) => {
                    warn!(?batch, %error, "detector failed for page batch");
                    let message = error.to_string();
                    batch
                        .iter()
                        .map(|&page| (page, Err(message.clone())))
                        .collect()
                }
            };

            for &page in batch {
                match by_page.remove(&page) {
                    Some(Ok(tables)) => {
                        debug!(page, tables = tables.len(), "page detected");
                        detected.insert(page, tables);
                    }
                    Some(Err(message)) => {
                        warnings.push(
                            ExtractWarning::new(WarningCode::PageFailed, message).with_page(page),
                        );
                        failed_pages.push(page);
                    }
                    None => {
                        warnings.push(
                            ExtractWarning::new(
                                WarningCode::PageFailed,
                                "detector returned no result for this page",
                            )
                            .with_page(page),
                        );
                        failed_pages.push(page);
                    }
                }
                completed += 1;
                progress(ExtractionProgress {
                    page,
                    completed,
                    total: pages.len(),
                });
            }
        }

        if !pages.is_empty() && failed_pages.len() == pages.len() {
            let reason = warnings
                .first()
                .map_or_else(|| "no page could be read".to_string(), |w| w.message.clone());
            return Err(ExtractError::Extraction(format!(
                "every selected page failed ({reason})"
            )));
        }

        let tables = finish_tables(detected, settings, &mut warnings)?;
        if tables.is_empty() {
            warnings.push(ExtractWarning::new(
                WarningCode::NoTablesDetected,
                "no tables were detected in the selected pages; try a different page range or detection mode",
            ));
        }

        info!(
            tables = tables.len(),
            failed_pages = failed_pages.len(),
            warnings = warnings.len(),
            "table extraction finished"
        );

        Ok(ExtractionOutcome {
            pages,
            tables,
            warnings,
            failed_pages,
        })
    }
}

/// Runs extraction with the default batch size and no progress reporting.
pub fn extract_tables(
    document: &Document,
    settings: &ExtractionSettings,
    detector: &dyn TableDetector,
) -> Result<ExtractionOutcome, ExtractError> {
    Extractor::new(detector).run(document, settings, &mut |_| {})
}

fn passes_quality_gate(
    table: &RawTable,
    quality: QualityMode,
    warnings: &mut Vec<ExtractWarning>,
) -> Result<bool, ExtractError> {
    let Some(confidence) = table.confidence else {
        return Ok(true);
    };
    if confidence >= LOW_CONFIDENCE_THRESHOLD {
        return Ok(true);
    }

    match quality {
        QualityMode::BestEffort => {
            warnings.push(
                ExtractWarning::new(
                    WarningCode::LowConfidence,
                    "table confidence is low; kept in best-effort mode",
                )
                .with_page(table.page)
                .with_confidence(confidence),
            );
            Ok(true)
        }
        QualityMode::Strict => Err(ExtractError::AmbiguousTable {
            page: table.page,
            confidence,
        }),
        QualityMode::SkipAmbiguous => {
            warnings.push(
                ExtractWarning::new(WarningCode::LowConfidence, "skipping low-confidence table")
                    .with_page(table.page)
                    .with_confidence(confidence),
            );
            Ok(false)
        }
    }
}

pub(crate) fn finish_tables(
    detected: BTreeMap<u32, Vec<RawTable>>,
    settings: &ExtractionSettings,
    warnings: &mut Vec<ExtractWarning>,
) -> Result<Vec<ExtractedTable>, ExtractError> {
    let mut tables = Vec::new();
    let mut table_id = 0;

    for (page, raw_tables) in detected {
        for (index, raw) in raw_tables.into_iter().enumerate() {
            table_id += 1;
            if !passes_quality_gate(&raw, settings.quality, warnings)? {
                continue;
            }

            let (columns, rows) = split_header(&raw, settings.header_mode, warnings, table_id);
            let table = ExtractedTable::new(
                page,
                index + 1,
                settings.mode,
                raw.confidence,
                columns,
                rows,
            );

            if table.row_count() < settings.min_rows {
                warnings.push(
                    ExtractWarning::new(
                        WarningCode::BelowMinimumRows,
                        format!(
                            "dropped table with {} row(s); minimum is {}",
                            table.row_count(),
                            settings.min_rows
                        ),
                    )
                    .with_page(page)
                    .with_table_id(table_id),
                );
                continue;
            }
            tables.push(table);
        }
    }

    tables.sort_by_key(|table| (table.page, table.position));
    Ok(tables)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::finish_tables;
    use crate::model::RawTable;
    use crate::warning::WarningCode;
    use crate::{ExtractError, ExtractionSettings, HeaderMode, QualityMode};

    fn raw(page: u32, rows: usize, confidence: Option<f32>) -> RawTable {
        RawTable {
            page,
            rows: (0..rows)
                .map(|row| vec![format!("r{row}"), row.to_string()])
                .collect(),
            confidence,
        }
    }

    #[test]
    fn minimum_row_filter_drops_short_tables() {
        let detected = BTreeMap::from([(1, vec![raw(1, 1, None), raw(1, 3, None)])]);
        let settings = ExtractionSettings {
            min_rows: 2,
            ..ExtractionSettings::default()
        };
        let mut warnings = Vec::new();
        let tables = finish_tables(detected, &settings, &mut warnings).expect("tables");
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].position, 2);
        assert_eq!(warnings[0].code, WarningCode::BelowMinimumRows);
    }

    #[test]
    fn minimum_of_one_keeps_single_row_tables() {
        let detected = BTreeMap::from([(1, vec![raw(1, 1, None)])]);
        let settings = ExtractionSettings::default();
        let mut warnings = Vec::new();
        let tables = finish_tables(detected, &settings, &mut warnings).expect("tables");
        assert_eq!(tables.len(), 1);
    }

    #[test]
    fn orders_by_page_then_detection_order() {
        let detected = BTreeMap::from([
            (4, vec![raw(4, 2, None)]),
            (2, vec![raw(2, 2, None), raw(2, 3, None)]),
        ]);
        let mut warnings = Vec::new();
        let tables =
            finish_tables(detected, &ExtractionSettings::default(), &mut warnings).expect("tables");
        let order = tables
            .iter()
            .map(|table| (table.page, table.position))
            .collect::<Vec<_>>();
        assert_eq!(order, vec![(2, 1), (2, 2), (4, 1)]);
    }

    #[test]
    fn quality_modes_handle_low_confidence_tables() {
        let low = || BTreeMap::from([(1, vec![raw(1, 2, Some(0.2))])]);
        let mut warnings = Vec::new();

        let skip = ExtractionSettings {
            quality: QualityMode::SkipAmbiguous,
            ..ExtractionSettings::default()
        };
        assert!(finish_tables(low(), &skip, &mut warnings).expect("skip").is_empty());

        let strict = ExtractionSettings {
            quality: QualityMode::Strict,
            ..ExtractionSettings::default()
        };
        let err = finish_tables(low(), &strict, &mut warnings).expect_err("strict fails");
        assert!(matches!(err, ExtractError::AmbiguousTable { page: 1, .. }));

        let best = ExtractionSettings::default();
        assert_eq!(finish_tables(low(), &best, &mut warnings).expect("best").len(), 1);
    }

    #[test]
    fn header_promotion_happens_before_row_filter() {
        let detected = BTreeMap::from([(1, vec![raw(1, 2, None)])]);
        let settings = ExtractionSettings {
            header_mode: HeaderMode::HasHeader,
            min_rows: 2,
            ..ExtractionSettings::default()
        };
        let mut warnings = Vec::new();
        let tables = finish_tables(detected, &settings, &mut warnings).expect("tables");
        assert!(tables.is_empty());
    }
}
