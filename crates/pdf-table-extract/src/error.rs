use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("CSV write error: {0}")]
    Csv(#[from] csv::Error),

    #[error("failed to load PDF: {0}")]
    PdfLoad(#[from] lopdf::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Excel serialization error: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),

    #[error("required system dependency '{tool}' is not available; {guidance}")]
    MissingSystemDependency { tool: String, guidance: String },

    #[error("invalid PDF document: {0}")]
    InvalidDocument(String),

    #[error("PDF is {size} bytes, larger than the {limit} byte upload limit")]
    DocumentTooLarge { size: usize, limit: usize },

    #[error("invalid page range: {0}")]
    InvalidPageRange(String),

    #[error("failed to render page {page}: {message}")]
    Render { page: u32, message: String },

    #[error("table extraction failed: {0}; try a different page range or detection mode")]
    Extraction(String),

    #[error("table on page {page} is too ambiguous (confidence={confidence:.2})")]
    AmbiguousTable { page: u32, confidence: f32 },

    #[error("export failed: {0}")]
    Export(String),

    #[error("invalid option: {0}")]
    InvalidOption(String),
}

impl ExtractError {
    /// Stable machine-readable kind, shared by the CLI and the HTTP layer.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingSystemDependency { .. } => "missing_system_dependency",
            Self::InvalidDocument(_) | Self::PdfLoad(_) => "invalid_document",
            Self::DocumentTooLarge { .. } => "document_too_large",
            Self::InvalidPageRange(_) => "invalid_page_range",
            Self::Render { .. } => "render_error",
            Self::Extraction(_) | Self::AmbiguousTable { .. } => "extraction_error",
            Self::Export(_) | Self::Csv(_) | Self::Json(_) | Self::Xlsx(_) => "export_error",
            Self::InvalidOption(_) => "invalid_option",
            Self::Io(_) => "io_error",
        }
    }
}
