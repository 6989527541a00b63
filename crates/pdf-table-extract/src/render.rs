use std::io::Cursor;
use std::path::Path;
use std::process::{Command, Stdio};

use image::{ImageFormat, ImageReader};
use tracing::{debug, warn};

use crate::document::Document;
use crate::error::ExtractError;
use crate::toolchain::{self, PDFTOPPM, ToolVersion};

pub const DEFAULT_PREVIEW_DPI: u32 = 100;
pub const MIN_ZOOM: f32 = 0.25;
pub const MAX_ZOOM: f32 = 4.0;

/// A page rasterization backend.
pub trait PageRasterizer {
    fn name(&self) -> &'static str;

    fn health_check(&self) -> Result<(), ExtractError>;

    /// Renders one 1-based page of the PDF at `path` to PNG bytes.
    fn rasterize(&self, path: &Path, page: u32, dpi: u32) -> Result<Vec<u8>, ExtractError>;
}

/// Renders pages with poppler's `pdftoppm`.
#[derive(Debug, Clone)]
pub struct PdftoppmRasterizer {
    program: String,
}

impl Default for PdftoppmRasterizer {
    fn default() -> Self {
        Self {
            program: PDFTOPPM.programs[0].to_string(),
        }
    }
}

impl PdftoppmRasterizer {
    #[must_use]
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Probes the configured program, not whichever `pdftoppm` is on `PATH`.
    pub fn version(&self) -> Result<ToolVersion, ExtractError> {
        toolchain::probe_program(&PDFTOPPM, &self.program)
            .ok_or_else(|| toolchain::missing(&PDFTOPPM))
    }
}

impl PageRasterizer for PdftoppmRasterizer {
    fn name(&self) -> &'static str {
        "pdftoppm"
    }

    fn health_check(&self) -> Result<(), ExtractError> {
        self.version().map(|_| ())
    }

    fn rasterize(&self, path: &Path, page: u32, dpi: u32) -> Result<Vec<u8>, ExtractError> {
        let scratch = tempfile::tempdir()?;
        let prefix = scratch.path().join("page");
        let page_arg = page.to_string();

        let output = Command::new(&self.program)
            .args(["-png", "-singlefile", "-r"])
            .arg(dpi.to_string())
            .args(["-f", &page_arg, "-l", &page_arg])
            .arg(path)
            .arg(&prefix)
            .stdin(Stdio::null())
            .output()
            .map_err(|error| {
                debug!(program = %self.program, %error, "rasterizer could not start");
                toolchain::missing(&PDFTOPPM)
            })?;

        if !output.status.success() {
            return Err(ExtractError::Render {
                page,
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(std::fs::read(prefix.with_extension("png"))?)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PreviewRequest {
    pub pages: Vec<u32>,
    pub zoom: f32,
    pub base_dpi: u32,
}

impl PreviewRequest {
    #[must_use]
    pub fn new(pages: Vec<u32>) -> Self {
        Self {
            pages,
            zoom: 1.0,
            base_dpi: DEFAULT_PREVIEW_DPI,
        }
    }

    #[must_use]
    pub fn with_zoom(mut self, zoom: f32) -> Self {
        self.zoom = zoom;
        self
    }

    #[must_use]
    pub fn with_base_dpi(mut self, base_dpi: u32) -> Self {
        self.base_dpi = base_dpi;
        self
    }

    /// Base DPI scaled by the zoom factor, clamped to a sane range.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn effective_dpi(&self) -> u32 {
        let zoom = if self.zoom.is_finite() {
            self.zoom.clamp(MIN_ZOOM, MAX_ZOOM)
        } else {
            1.0
        };
        ((self.base_dpi.max(1) as f32) * zoom).round().max(1.0) as u32
    }

    /// Pages of the zero-based `window` when showing `per_page` pages at a time.
    #[must_use]
    pub fn page_window(page_count: u32, window: u32, per_page: u32) -> Vec<u32> {
        let per_page = per_page.max(1);
        let start = window.saturating_mul(per_page).saturating_add(1);
        if start > page_count {
            return Vec::new();
        }
        let end = start.saturating_add(per_page - 1).min(page_count);
        (start..=end).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPage {
    pub page: u32,
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub dpi: u32,
}

#[derive(Debug)]
pub struct PagePreview {
    pub page: u32,
    pub result: Result<RenderedPage, ExtractError>,
}

fn render_page(
    document: &Document,
    rasterizer: &dyn PageRasterizer,
    page: u32,
    dpi: u32,
) -> Result<RenderedPage, ExtractError> {
    if page == 0 || page > document.page_count() {
        return Err(ExtractError::Render {
            page,
            message: format!(
                "page is outside the document (1-{})",
                document.page_count()
            ),
        });
    }

    let png = rasterizer.rasterize(document.path(), page, dpi)?;
    let (width, height) = ImageReader::with_format(Cursor::new(png.as_slice()), ImageFormat::Png)
        .into_dimensions()
        .map_err(|error| ExtractError::Render {
            page,
            message: format!("rasterizer produced an unreadable image: {error}"),
        })?;

    Ok(RenderedPage {
        page,
        png,
        width,
        height,
        dpi,
    })
}

/// Renders each requested page independently.
///
/// A page that fails carries its own error; only a missing rasterizer aborts
/// the whole batch.
pub fn render_preview(
    document: &Document,
    rasterizer: &dyn PageRasterizer,
    request: &PreviewRequest,
) -> Result<Vec<PagePreview>, ExtractError> {
    let dpi = request.effective_dpi();
    let mut previews = Vec::with_capacity(request.pages.len());

    for &page in &request.pages {
        let result = match render_page(document, rasterizer, page, dpi) {
            Err(error @ ExtractError::MissingSystemDependency { .. }) => return Err(error),
            Err(ExtractError::Render { page, message }) => {
                warn!(page, %message, "page preview failed");
                Err(ExtractError::Render { page, message })
            }
            Err(other) => {
                warn!(page, error = %other, "page preview failed");
                Err(ExtractError::Render {
                    page,
                    message: other.to_string(),
                })
            }
            Ok(rendered) => Ok(rendered),
        };
        previews.push(PagePreview { page, result });
    }

    Ok(previews)
}
