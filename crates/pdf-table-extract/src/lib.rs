mod detect;
mod document;
mod error;
pub mod export;
mod extract;
mod header;
mod model;
mod options;
mod pdf_reader;
pub mod render;
mod table_detect;
mod table_parse;
pub mod toolchain;
mod warning;

pub use detect::{PageDetection, TableDetector, TextLayoutDetector};
pub use document::{DEFAULT_MAX_UPLOAD_BYTES, Document, DocumentMetadata, PageSize};
pub use error::ExtractError;
pub use export::{
    ExportArtifact, ExportFormat, ExportOptions, ExportScope, ExportSource, export_tables,
};
pub use extract::{
    DEFAULT_BATCH_SIZE, ExtractionOutcome, ExtractionProgress, Extractor, extract_tables,
};
pub use model::{ExtractedTable, RawTable};
pub use options::{DetectionMode, ExtractionSettings, HeaderMode, PageSelection, QualityMode};
pub use render::{
    PagePreview, PageRasterizer, PdftoppmRasterizer, PreviewRequest, RenderedPage, render_preview,
};
pub use table_parse::parse_number;
pub use warning::{ExtractWarning, WarningCode};
