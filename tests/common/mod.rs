#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::Path;

use lopdf::{Document as PdfDocument, Object, Stream, dictionary};
use pdf_table_extract::{
    DetectionMode, Document, ExtractError, PageDetection, PageRasterizer, RawTable, TableDetector,
};
use pdf_table_genius::commands::Workbench;
use pdf_table_genius::config::AppConfig;

/// A 3x2 white RGB image.
pub const TINY_PNG: &[u8] = &[
    0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a, 0x00, 0x00, 0x00, 0x0d, 0x49, 0x48, 0x44, 0x52,
    0x00, 0x00, 0x00, 0x03, 0x00, 0x00, 0x00, 0x02, 0x08, 0x02, 0x00, 0x00, 0x00, 0x12, 0x16, 0xf1,
    0x4d, 0x00, 0x00, 0x00, 0x0e, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9c, 0x63, 0xf8, 0x0f, 0x03, 0x0c,
    0x70, 0x16, 0x00, 0xb3, 0x60, 0x11, 0xef, 0x36, 0xb7, 0x19, 0x52, 0x00, 0x00, 0x00, 0x00, 0x49,
    0x45, 0x4e, 0x44, 0xae, 0x42, 0x60, 0x82,
];

/// Builds a PDF with `page_count` empty A4 pages.
pub fn blank_pdf(page_count: usize) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    let mut doc = PdfDocument::with_version("1.5");
    let pages_id = doc.new_object_id();

    let mut page_ids = Vec::new();
    for _ in 0..page_count {
        let content_id = doc.add_object(Stream::new(dictionary! {}, Vec::new()));
        page_ids.push(doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        }));
    }

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => page_ids.iter().map(|id| (*id).into()).collect::<Vec<_>>(),
            "Count" => i64::try_from(page_ids.len())?,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes)?;
    Ok(bytes)
}

/// Returns canned rows per page; pages without an entry have no tables.
#[derive(Debug, Default)]
pub struct CannedDetector {
    pub tables: BTreeMap<u32, Vec<Vec<Vec<String>>>>,
    pub failing: Vec<u32>,
}

impl CannedDetector {
    pub fn with_table(mut self, page: u32, rows: &[&[&str]]) -> Self {
        self.tables.entry(page).or_default().push(
            rows.iter()
                .map(|row| row.iter().map(ToString::to_string).collect())
                .collect(),
        );
        self
    }

    pub fn failing_on(mut self, page: u32) -> Self {
        self.failing.push(page);
        self
    }
}

impl TableDetector for CannedDetector {
    fn name(&self) -> &'static str {
        "canned"
    }

    fn detect(
        &self,
        _document: &Document,
        pages: &[u32],
        _mode: DetectionMode,
        _min_cols: usize,
    ) -> Result<Vec<PageDetection>, ExtractError> {
        Ok(pages
            .iter()
            .map(|&page| PageDetection {
                page,
                outcome: if self.failing.contains(&page) {
                    Err("no text layer".to_string())
                } else {
                    Ok(self
                        .tables
                        .get(&page)
                        .into_iter()
                        .flatten()
                        .map(|rows| RawTable {
                            page,
                            rows: rows.clone(),
                            confidence: Some(0.9),
                        })
                        .collect())
                },
            })
            .collect())
    }
}

/// Serves a fixed image, or reports the rasterizer as not installed.
#[derive(Debug, Clone, Default)]
pub struct StubRasterizer {
    pub installed: bool,
    pub failing: Vec<u32>,
}

impl StubRasterizer {
    fn missing() -> ExtractError {
        ExtractError::MissingSystemDependency {
            tool: "pdftoppm".to_string(),
            guidance: "install it with `sudo apt-get install -y poppler-utils`".to_string(),
        }
    }
}

impl PageRasterizer for StubRasterizer {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn health_check(&self) -> Result<(), ExtractError> {
        if self.installed {
            Ok(())
        } else {
            Err(Self::missing())
        }
    }

    fn rasterize(&self, _path: &Path, page: u32, _dpi: u32) -> Result<Vec<u8>, ExtractError> {
        if !self.installed {
            return Err(Self::missing());
        }
        if self.failing.contains(&page) {
            return Err(ExtractError::Render {
                page,
                message: "corrupt content stream".to_string(),
            });
        }
        Ok(TINY_PNG.to_vec())
    }
}

/// The sales fixture: one table on page 1, two on page 2, nothing on page 3.
pub fn sales_detector() -> CannedDetector {
    CannedDetector::default()
        .with_table(1, &[&["Region", "Revenue"], &["North", "1,200"], &["South", "800"]])
        .with_table(2, &[&["Item", "Qty"], &["Pen", "3"]])
        .with_table(2, &[&["Code", "Price"], &["A1", "9.50"], &["B2", "n/a"]])
}

pub fn workbench(detector: CannedDetector, installed: bool) -> Workbench {
    workbench_with(detector, installed, AppConfig::default())
}

pub fn workbench_with(detector: CannedDetector, installed: bool, config: AppConfig) -> Workbench {
    let rasterizer = StubRasterizer {
        installed,
        ..StubRasterizer::default()
    };
    Workbench::new(Box::new(detector), Box::new(rasterizer), config)
}

/// A workbench whose rasterizer fails on `failing` pages.
pub fn workbench_failing_previews(detector: CannedDetector, failing: &[u32]) -> Workbench {
    let rasterizer = StubRasterizer {
        installed: true,
        failing: failing.to_vec(),
    };
    Workbench::new(Box::new(detector), Box::new(rasterizer), AppConfig::default())
}
