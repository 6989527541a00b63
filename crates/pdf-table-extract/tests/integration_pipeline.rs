mod common;

use std::cell::Cell;
use std::io::Cursor;
use std::path::Path;
use std::process::Command;

use image::{ImageFormat, RgbImage};
use pdf_table_extract::{
    DEFAULT_MAX_UPLOAD_BYTES, DetectionMode, Document, ExtractError, ExtractionSettings, Extractor,
    HeaderMode, PageDetection, PageRasterizer, PdftoppmRasterizer, PreviewRequest, RawTable,
    TableDetector, TextLayoutDetector, WarningCode, extract_tables, render_preview,
};
use tempfile::tempdir;

fn load(pages: &[Vec<&str>]) -> Document {
    let bytes = common::build_test_pdf(pages, None).expect("PDF fixture should be created");
    Document::load("fixture.pdf", bytes, DEFAULT_MAX_UPLOAD_BYTES).expect("fixture should load")
}

fn all_pages(mode: DetectionMode) -> ExtractionSettings {
    ExtractionSettings {
        pages: "all".to_string(),
        mode,
        ..ExtractionSettings::default()
    }
}

/// Reports a fixed two-row table per page, failing the pages it is told to.
struct ScriptedDetector {
    failing: Vec<u32>,
    panicking: Vec<u32>,
    calls: Cell<usize>,
}

impl ScriptedDetector {
    fn failing(pages: &[u32]) -> Self {
        Self {
            failing: pages.to_vec(),
            panicking: Vec::new(),
            calls: Cell::new(0),
        }
    }

    fn panicking(pages: &[u32]) -> Self {
        Self {
            panicking: pages.to_vec(),
            ..Self::failing(&[])
        }
    }
}

impl TableDetector for ScriptedDetector {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn detect(
        &self,
        _document: &Document,
        pages: &[u32],
        _mode: DetectionMode,
        _min_cols: usize,
    ) -> Result<Vec<PageDetection>, ExtractError> {
        self.calls.set(self.calls.get() + 1);
        if let Some(page) = pages.iter().find(|&&page| self.panicking.contains(&page)) {
            panic!("malformed font program on page {page}");
        }
        Ok(pages
            .iter()
            .map(|&page| PageDetection {
                page,
                outcome: if self.failing.contains(&page) {
                    Err(format!("page {page} is a scanned image"))
                } else {
                    Ok(vec![RawTable {
                        page,
                        rows: vec![
                            vec!["a".to_string(), "1".to_string()],
                            vec!["b".to_string(), "2".to_string()],
                        ],
                        confidence: Some(1.0),
                    }])
                },
            })
            .collect())
    }
}

#[test]
fn extracts_single_table_with_inferred_header() {
    let document = load(&[vec!["Name  Age  Score", "Alice  30  98", "Bob  22  87"]]);
    let settings = ExtractionSettings {
        header_mode: HeaderMode::AutoDetect,
        ..all_pages(DetectionMode::Stream)
    };

    let outcome =
        extract_tables(&document, &settings, &TextLayoutDetector).expect("extraction should succeed");

    assert_eq!(outcome.tables.len(), 1, "outcome: {outcome:?}");
    let table = &outcome.tables[0];
    assert_eq!(table.columns, vec!["Name", "Age", "Score"]);
    assert_eq!(table.rows[0], vec!["Alice", "30", "98"]);
    assert_eq!(table.row_count(), 2);
    assert_eq!((table.page, table.position), (1, 1));
}

#[test]
fn lattice_mode_reads_ruled_tables() {
    let document = load(&[vec![
        "+------+-----+",
        "| Item | Qty |",
        "+------+-----+",
        "| Pen  | 3   |",
        "| Ink  | 12  |",
        "+------+-----+",
    ]]);
    let settings = ExtractionSettings {
        header_mode: HeaderMode::HasHeader,
        ..all_pages(DetectionMode::Lattice)
    };

    let outcome =
        extract_tables(&document, &settings, &TextLayoutDetector).expect("extraction should succeed");

    assert_eq!(outcome.tables.len(), 1, "outcome: {outcome:?}");
    assert_eq!(outcome.tables[0].columns, vec!["Item", "Qty"]);
    assert_eq!(outcome.tables[0].rows, vec![vec!["Pen", "3"], vec!["Ink", "12"]]);
}

#[test]
fn orders_tables_by_page() {
    let document = load(&[
        vec!["City  Pop  Rank", "A  10  1", "B  20  2"],
        vec!["Product  Qty  Price", "Pen  3  1.5", "Book  1  9.9"],
    ]);

    let outcome = extract_tables(&document, &all_pages(DetectionMode::Stream), &TextLayoutDetector)
        .expect("extraction should succeed");

    let pages = outcome.tables.iter().map(|table| table.page).collect::<Vec<_>>();
    assert_eq!(pages, vec![1, 2]);
    assert_eq!(outcome.pages, vec![1, 2]);
}

#[test]
fn minimum_rows_drop_short_tables_with_warning() {
    let document = load(&[vec!["Name  Age", "Alice  30", "Bob  22"]]);
    let settings = ExtractionSettings {
        min_rows: 4,
        ..all_pages(DetectionMode::Stream)
    };

    let outcome =
        extract_tables(&document, &settings, &TextLayoutDetector).expect("extraction should succeed");

    assert!(outcome.tables.is_empty());
    let codes = outcome.warnings.iter().map(|warning| warning.code).collect::<Vec<_>>();
    assert!(codes.contains(&WarningCode::BelowMinimumRows), "codes: {codes:?}");
    assert!(codes.contains(&WarningCode::NoTablesDetected), "codes: {codes:?}");
}

#[test]
fn plain_text_yields_no_tables() {
    let document = load(&[vec!["This is plain narrative text without columns."]]);

    let outcome = extract_tables(&document, &all_pages(DetectionMode::Stream), &TextLayoutDetector)
        .expect("extraction should succeed");

    assert!(outcome.tables.is_empty());
    assert_eq!(
        outcome.warnings.last().map(|warning| warning.code),
        Some(WarningCode::NoTablesDetected)
    );
}

#[test]
fn invalid_page_range_fails_before_detection() {
    let document = load(&[vec!["a  b"], vec!["c  d"]]);
    let detector = ScriptedDetector::failing(&[]);

    for pages in ["3-1", "x", "9"] {
        let settings = ExtractionSettings {
            pages: pages.to_string(),
            ..ExtractionSettings::default()
        };
        let err = extract_tables(&document, &settings, &detector).expect_err("should reject");
        assert!(matches!(err, ExtractError::InvalidPageRange(_)), "{pages}: {err:?}");
    }
    assert_eq!(detector.calls.get(), 0);
}

#[test]
fn failed_pages_are_reported_and_the_rest_continue() {
    let document = load(&[vec!["p1"], vec!["p2"], vec!["p3"]]);
    let detector = ScriptedDetector::failing(&[2]);
    let mut seen = Vec::new();

    let outcome = Extractor::new(&detector)
        .with_batch_size(2)
        .run(&document, &all_pages(DetectionMode::Lattice), &mut |progress| {
            seen.push((progress.page, progress.completed, progress.total));
        })
        .expect("partial failure is not fatal");

    assert_eq!(outcome.failed_pages, vec![2]);
    assert_eq!(outcome.tables.len(), 2);
    assert_eq!(detector.calls.get(), 2);
    assert_eq!(seen, vec![(1, 1, 3), (2, 2, 3), (3, 3, 3)]);
    assert!(
        outcome
            .warnings
            .iter()
            .any(|warning| warning.code == WarningCode::PageFailed && warning.page == Some(2))
    );
}

#[test]
fn detector_panic_fails_only_its_batch() {
    let document = load(&[vec!["p1"], vec!["p2"], vec!["p3"]]);
    let detector = ScriptedDetector::panicking(&[2]);

    let outcome = Extractor::new(&detector)
        .with_batch_size(1)
        .run(&document, &all_pages(DetectionMode::Lattice), &mut |_| {})
        .expect("a panicking page is not fatal");

    assert_eq!(outcome.failed_pages, vec![2]);
    assert_eq!(
        outcome.tables.iter().map(|table| table.page).collect::<Vec<_>>(),
        vec![1, 3]
    );
    let failure = outcome
        .warnings
        .iter()
        .find(|warning| warning.code == WarningCode::PageFailed)
        .expect("page 2 is reported");
    assert!(failure.message.contains("malformed font program on page 2"), "{}", failure.message);
}

#[test]
fn every_page_failing_is_an_extraction_error() {
    let document = load(&[vec!["p1"], vec!["p2"]]);
    let detector = ScriptedDetector::failing(&[1, 2]);

    let err = extract_tables(&document, &all_pages(DetectionMode::Lattice), &detector)
        .expect_err("nothing could be read");

    assert!(matches!(err, ExtractError::Extraction(_)));
    assert!(err.to_string().contains("try a different page range or detection mode"));
}

/// Renders a 4x3 image for every page except the ones it is told to fail.
struct FlakyRasterizer {
    failing: Vec<u32>,
}

impl PageRasterizer for FlakyRasterizer {
    fn name(&self) -> &'static str {
        "flaky"
    }

    fn health_check(&self) -> Result<(), ExtractError> {
        Ok(())
    }

    fn rasterize(&self, path: &Path, page: u32, _dpi: u32) -> Result<Vec<u8>, ExtractError> {
        assert!(path.exists(), "rasterizer should see the temp file");
        if self.failing.contains(&page) {
            return Err(ExtractError::Render {
                page,
                message: "broken content stream".to_string(),
            });
        }
        let mut png = Cursor::new(Vec::new());
        RgbImage::new(4, 3)
            .write_to(&mut png, ImageFormat::Png)
            .map_err(|error| ExtractError::Export(error.to_string()))?;
        Ok(png.into_inner())
    }
}

#[test]
fn preview_keeps_rendering_after_a_failed_page() {
    let document = load(&[vec!["p1"], vec!["p2"], vec!["p3"]]);
    let rasterizer = FlakyRasterizer { failing: vec![2] };
    let request = PreviewRequest::new(PreviewRequest::page_window(3, 0, 3)).with_zoom(2.0);

    let previews = render_preview(&document, &rasterizer, &request).expect("batch survives");

    assert_eq!(previews.iter().map(|p| p.page).collect::<Vec<_>>(), vec![1, 2, 3]);
    let first = previews[0].result.as_ref().expect("page 1 renders");
    assert_eq!((first.width, first.height, first.dpi), (4, 3, 200));
    assert!(matches!(
        previews[1].result,
        Err(ExtractError::Render { page: 2, .. })
    ));
    assert!(previews[2].result.is_ok());
}

#[test]
fn preview_outside_the_document_is_a_page_error() {
    let document = load(&[vec!["p1"]]);
    let rasterizer = FlakyRasterizer { failing: Vec::new() };

    let previews = render_preview(&document, &rasterizer, &PreviewRequest::new(vec![1, 4]))
        .expect("batch survives");

    assert!(previews[0].result.is_ok());
    assert!(matches!(
        previews[1].result,
        Err(ExtractError::Render { page: 4, .. })
    ));
}

#[test]
fn rasterizer_health_follows_the_configured_program() {
    let rasterizer = PdftoppmRasterizer::with_program("pdf-table-genius-no-such-pdftoppm");
    let err = rasterizer.health_check().expect_err("program does not exist");
    assert!(matches!(err, ExtractError::MissingSystemDependency { .. }));

    let document = load(&[vec!["p1"]]);
    let err = render_preview(&document, &rasterizer, &PreviewRequest::new(vec![1]))
        .expect_err("a missing rasterizer aborts the batch");
    assert!(matches!(err, ExtractError::MissingSystemDependency { .. }));
}

#[test]
fn intake_reads_metadata_and_removes_temp_file_on_drop() {
    let bytes = common::build_test_pdf(&[vec!["x  y"], vec!["z  w"]], Some("Quarterly Sales"))
        .expect("PDF fixture should be created");
    let document =
        Document::load("reports/q1 sales.pdf", bytes, DEFAULT_MAX_UPLOAD_BYTES).expect("load");

    assert_eq!(document.page_count(), 2);
    assert_eq!(document.name(), "reports/q1 sales.pdf");
    let metadata = document.metadata();
    assert_eq!(metadata.title.as_deref(), Some("Quarterly Sales"));
    assert_eq!(metadata.author.as_deref(), Some("Finance Team"));
    assert_eq!(metadata.creation_date.as_deref(), Some("2024-03-05T10:15:00"));
    assert_eq!(metadata.page_sizes.len(), 2);
    assert!((metadata.page_sizes[0].width - 595.0).abs() < f32::EPSILON);

    let path = document.path().to_path_buf();
    assert!(path.exists());
    drop(document);
    assert!(!path.exists());
}

#[test]
fn cli_exits_with_code_2_when_no_tables() {
    let dir = tempdir().expect("tempdir should be created");
    let input = dir.path().join("cli-empty.pdf");
    let output = dir.path().join("cli-empty.csv");

    common::create_test_pdf(&input, &[vec!["No table here"]])
        .expect("PDF fixture should be created");

    let status = Command::new(env!("CARGO_BIN_EXE_pdf2tables"))
        .args([
            "extract",
            "-i",
            &input.to_string_lossy(),
            "-o",
            &output.to_string_lossy(),
        ])
        .status()
        .expect("CLI should run");

    assert_eq!(status.code(), Some(2));
    assert!(!output.exists());
}

#[test]
fn cli_writes_format_from_output_extension() {
    let dir = tempdir().expect("tempdir should be created");
    let input = dir.path().join("stock.pdf");
    let output = dir.path().join("stock.json");

    common::create_test_pdf(&input, &[vec!["Item  Qty", "Pen  3", "Ink  12"]])
        .expect("PDF fixture should be created");

    let status = Command::new(env!("CARGO_BIN_EXE_pdf2tables"))
        .args([
            "extract",
            "-i",
            &input.to_string_lossy(),
            "-o",
            &output.to_string_lossy(),
            "--mode",
            "stream",
            "--header",
            "first_row",
            "--indent",
            "0",
        ])
        .status()
        .expect("CLI should run");

    assert_eq!(status.code(), Some(0));
    let json = std::fs::read_to_string(&output).expect("JSON should be written");
    assert_eq!(json, r#"[{"Item":"Pen","Qty":3},{"Item":"Ink","Qty":12}]"#);
}
