use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use crate::document::Document;
use crate::error::ExtractError;
use crate::model::RawTable;
use crate::options::DetectionMode;
use crate::pdf_reader::read_page_text;
use crate::table_detect::detect_tables_in_page;

/// Detection result for one requested page.
#[derive(Debug, Clone, PartialEq)]
pub struct PageDetection {
    pub page: u32,
    pub outcome: Result<Vec<RawTable>, String>,
}

/// A table-detection backend.
///
/// `detect` receives a batch of pages and reports each page separately, so a
/// bad page never hides the tables found on its neighbours. Returning `Err`
/// fails the whole batch.
pub trait TableDetector {
    fn name(&self) -> &'static str;

    /// Verifies that whatever the backend depends on is installed.
    fn health_check(&self) -> Result<(), ExtractError> {
        Ok(())
    }

    fn detect(
        &self,
        document: &Document,
        pages: &[u32],
        mode: DetectionMode,
        min_cols: usize,
    ) -> Result<Vec<PageDetection>, ExtractError>;
}

/// Detects tables from the text layer with whitespace and separator heuristics.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextLayoutDetector;

impl TableDetector for TextLayoutDetector {
    fn name(&self) -> &'static str {
        "text-layout"
    }

    fn detect(
        &self,
        document: &Document,
        pages: &[u32],
        mode: DetectionMode,
        min_cols: usize,
    ) -> Result<Vec<PageDetection>, ExtractError> {
        Ok(pages
            .iter()
            .map(|&page| PageDetection {
                page,
                outcome: isolate_page(page, || {
                    read_page_text(document, page)
                        .map(|text| detect_tables_in_page(&text, mode, min_cols.max(2)))
                }),
            })
            .collect())
    }
}

/// Runs the work for one page, turning a panic in the PDF stack into that
/// page's error.
pub(crate) fn isolate_page<T>(
    page: u32,
    work: impl FnOnce() -> Result<T, String>,
) -> Result<T, String> {
    panic::catch_unwind(AssertUnwindSafe(work)).unwrap_or_else(|payload| {
        Err(format!(
            "page {page} could not be read: {}",
            panic_message(&*payload)
        ))
    })
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("PDF parser panicked")
}
