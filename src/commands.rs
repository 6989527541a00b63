//! Every user action is a [`Command`] applied to a [`Session`] by the
//! [`Workbench`], which owns the native backends and the configuration.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use pdf_table_extract::{
    Document, DocumentMetadata, ExportArtifact, ExportOptions, ExportSource, ExtractError,
    ExtractWarning, ExtractionSettings, Extractor, PagePreview, PageRasterizer, PreviewRequest,
    RenderedPage, TableDetector, export_tables, render_preview,
};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::session::{HistoryEntry, Session, SessionError, Stage};
use crate::viewer::{ChartData, ChartKind, TableSummary, TableView, chart_series};

/// Pages shown per preview window when the client does not say.
pub const DEFAULT_PREVIEW_WINDOW: u32 = 3;

const EXTRACT_OR_RESULTS: &[Stage] = &[Stage::Extract, Stage::Results];
const RESULTS: &[Stage] = &[Stage::Results];

#[derive(Debug)]
pub enum Command {
    LoadDocument { name: String, bytes: Vec<u8> },
    Preview { page: u32, zoom: f32 },
    /// Renders the zero-based `window` of `per_page` pages.
    PreviewWindow { window: u32, per_page: u32, zoom: f32 },
    Extract(ExtractionSettings),
    Next,
    Back,
    Goto(Stage),
    Reset,
    Select(usize),
    /// Reads a table by index, or the selected one.
    ReadTable(Option<usize>),
    EditCell {
        table: Option<usize>,
        row: usize,
        column: usize,
        value: String,
    },
    RenameColumn {
        table: Option<usize>,
        column: usize,
        label: String,
    },
    Chart {
        label_column: usize,
        value_column: usize,
        kind: ChartKind,
    },
    Export(ExportOptions),
    History,
    ClearHistory,
    Snapshot,
}

impl Command {
    /// The action name and the stages that accept it; `None` means any stage.
    fn stage_gate(&self) -> Option<(&'static str, &'static [Stage])> {
        match self {
            Self::Preview { .. } | Self::PreviewWindow { .. } => {
                Some(("preview", EXTRACT_OR_RESULTS))
            }
            Self::Extract(_) => Some(("extraction", EXTRACT_OR_RESULTS)),
            Self::Select(_) => Some(("table selection", RESULTS)),
            Self::ReadTable(_) => Some(("reading a table", RESULTS)),
            Self::EditCell { .. } | Self::RenameColumn { .. } => Some(("editing", RESULTS)),
            Self::Chart { .. } => Some(("charting", RESULTS)),
            Self::Export(_) => Some(("export", RESULTS)),
            Self::LoadDocument { .. }
            | Self::Next
            | Self::Back
            | Self::Goto(_)
            | Self::Reset
            | Self::History
            | Self::ClearHistory
            | Self::Snapshot => None,
        }
    }
}

#[derive(Debug)]
pub enum View {
    Session(SessionSnapshot),
    Preview(RenderedPage),
    PreviewWindow(PreviewWindowView),
    Table(TableView),
    Edited { previous: String, table: TableView },
    Chart(ChartData),
    Export(ExportArtifact),
    History(Vec<HistoryEntry>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentSummary {
    pub name: String,
    pub size: usize,
    pub page_count: u32,
    pub metadata: DocumentMetadata,
}

impl DocumentSummary {
    fn of(document: &Document) -> Self {
        Self {
            name: document.name().to_string(),
            size: document.bytes().len(),
            page_count: document.page_count(),
            metadata: document.metadata().clone(),
        }
    }
}

/// One page of a preview window. A page that failed carries its error
/// instead of an image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreviewPageView {
    pub page: u32,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dpi: Option<u32>,
    /// The PNG as a `data:` URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PreviewPageView {
    fn of(preview: PagePreview) -> Self {
        match preview.result {
            Ok(rendered) => Self {
                page: preview.page,
                ok: true,
                width: Some(rendered.width),
                height: Some(rendered.height),
                dpi: Some(rendered.dpi),
                image: Some(format!(
                    "data:image/png;base64,{}",
                    STANDARD.encode(&rendered.png)
                )),
                error: None,
            },
            Err(error) => Self {
                page: preview.page,
                ok: false,
                width: None,
                height: None,
                dpi: None,
                image: None,
                error: Some(error.to_string()),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreviewWindowView {
    pub window: u32,
    pub per_page: u32,
    pub window_count: u32,
    pub page_count: u32,
    pub pages: Vec<PreviewPageView>,
}

/// What the client needs to draw the current stage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub id: Uuid,
    pub stage: Stage,
    pub document: Option<DocumentSummary>,
    pub tables: Vec<TableSummary>,
    pub selected: usize,
    pub warnings: Vec<ExtractWarning>,
    pub settings: Option<ExtractionSettings>,
    pub failed_pages: Vec<u32>,
    pub history_len: usize,
}

impl SessionSnapshot {
    #[must_use]
    pub fn of(session: &Session) -> Self {
        Self {
            id: session.id(),
            stage: session.stage(),
            document: session.document().map(DocumentSummary::of),
            tables: session
                .tables()
                .iter()
                .enumerate()
                .map(|(index, table)| TableSummary::of(index, table))
                .collect(),
            selected: session.selected_index(),
            warnings: session.warnings().to_vec(),
            settings: session.last_settings().cloned(),
            failed_pages: session
                .history()
                .last()
                .filter(|_| session.last_settings().is_some())
                .map(|entry| entry.failed_pages.clone())
                .unwrap_or_default(),
            history_len: session.history().len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComponentHealth {
    pub name: String,
    pub ok: bool,
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub ok: bool,
    pub detector: ComponentHealth,
    pub rasterizer: ComponentHealth,
}

fn component(name: &str, check: Result<(), ExtractError>) -> ComponentHealth {
    ComponentHealth {
        name: name.to_string(),
        ok: check.is_ok(),
        message: check.err().map(|error| error.to_string()),
    }
}

pub struct Workbench {
    detector: Box<dyn TableDetector>,
    rasterizer: Box<dyn PageRasterizer>,
    config: AppConfig,
}

impl Workbench {
    #[must_use]
    pub fn new(
        detector: Box<dyn TableDetector>,
        rasterizer: Box<dyn PageRasterizer>,
        config: AppConfig,
    ) -> Self {
        Self {
            detector,
            rasterizer,
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Extraction settings with the configured default page selection.
    #[must_use]
    pub fn default_settings(&self) -> ExtractionSettings {
        ExtractionSettings {
            pages: self.config.default_pages.clone(),
            ..ExtractionSettings::default()
        }
    }

    #[must_use]
    pub fn health(&self) -> HealthReport {
        let detector = component(self.detector.name(), self.detector.health_check());
        let rasterizer = component(self.rasterizer.name(), self.rasterizer.health_check());
        HealthReport {
            ok: detector.ok && rasterizer.ok,
            detector,
            rasterizer,
        }
    }

    pub fn dispatch(&self, session: &mut Session, command: Command) -> Result<View, SessionError> {
        if let Some((action, stages)) = command.stage_gate() {
            session.require_stage(action, stages)?;
        }

        match command {
            Command::LoadDocument { name, bytes } => {
                let document = Document::load(&name, bytes, self.config.max_upload_bytes)?;
                session.load_document(document);
                Ok(snapshot(session))
            }
            Command::Preview { page, zoom } => self.preview(session, page, zoom),
            Command::PreviewWindow {
                window,
                per_page,
                zoom,
            } => self.preview_window(session, window, per_page, zoom),
            Command::Extract(settings) => {
                self.extract(session, settings)?;
                Ok(snapshot(session))
            }
            Command::Next => {
                session.advance();
                Ok(snapshot(session))
            }
            Command::Back => {
                session.go_back();
                Ok(snapshot(session))
            }
            Command::Goto(stage) => {
                session.goto(stage);
                Ok(snapshot(session))
            }
            Command::Reset => {
                session.reset();
                Ok(snapshot(session))
            }
            Command::Select(index) => {
                session.select_table(index);
                Ok(snapshot(session))
            }
            Command::ReadTable(index) => {
                let index = index.unwrap_or_else(|| session.selected_index());
                Ok(View::Table(TableView::of(index, session.table(index)?)))
            }
            Command::EditCell {
                table,
                row,
                column,
                value,
            } => {
                let previous = session.edit_cell(table, row, column, value)?;
                edited(session, table, previous)
            }
            Command::RenameColumn {
                table,
                column,
                label,
            } => {
                let previous = session.rename_column(table, column, label)?;
                edited(session, table, previous)
            }
            Command::Chart {
                label_column,
                value_column,
                kind,
            } => Ok(View::Chart(chart_series(
                session.selected_table()?,
                label_column,
                value_column,
                kind,
            )?)),
            Command::Export(options) => self.export(session, &options),
            Command::History => Ok(View::History(session.history().to_vec())),
            Command::ClearHistory => {
                session.clear_history();
                Ok(View::History(Vec::new()))
            }
            Command::Snapshot => Ok(snapshot(session)),
        }
    }

    fn preview(&self, session: &Session, page: u32, zoom: f32) -> Result<View, SessionError> {
        let document = session.require_document()?;
        let request = PreviewRequest::new(vec![page])
            .with_zoom(zoom)
            .with_base_dpi(self.config.preview_dpi);
        let preview = render_preview(document, self.rasterizer.as_ref(), &request)?
            .into_iter()
            .next()
            .ok_or(ExtractError::Render {
                page,
                message: "rasterizer returned no pages".to_string(),
            })?;
        Ok(View::Preview(preview.result?))
    }

    fn preview_window(
        &self,
        session: &Session,
        window: u32,
        per_page: u32,
        zoom: f32,
    ) -> Result<View, SessionError> {
        let document = session.require_document()?;
        let page_count = document.page_count();
        let per_page = per_page.max(1);
        let request = PreviewRequest::new(PreviewRequest::page_window(page_count, window, per_page))
            .with_zoom(zoom)
            .with_base_dpi(self.config.preview_dpi);
        let pages = render_preview(document, self.rasterizer.as_ref(), &request)?
            .into_iter()
            .map(PreviewPageView::of)
            .collect();
        Ok(View::PreviewWindow(PreviewWindowView {
            window,
            per_page,
            window_count: page_count.div_ceil(per_page),
            page_count,
            pages,
        }))
    }

    fn extract(
        &self,
        session: &mut Session,
        settings: ExtractionSettings,
    ) -> Result<(), SessionError> {
        let document = session.require_document()?;
        let session_id = session.id();
        let outcome = Extractor::new(self.detector.as_ref())
            .with_batch_size(self.config.batch_size)
            .run(document, &settings, &mut |progress| {
                info!(
                    session = %session_id,
                    page = progress.page,
                    completed = progress.completed,
                    total = progress.total,
                    "extraction progress"
                );
            })?;
        if outcome.tables.is_empty() {
            warn!(session = %session_id, pages = %settings.pages, "extraction found no tables");
        }
        session.apply_extraction(settings, outcome)
    }

    fn export(&self, session: &Session, options: &ExportOptions) -> Result<View, SessionError> {
        let document = session.require_document()?;
        let source = ExportSource::from_document(document, session.last_settings());
        let artifact = export_tables(
            session.tables(),
            session.selected_index(),
            &source,
            options,
        )?;
        Ok(View::Export(artifact))
    }
}

fn snapshot(session: &Session) -> View {
    View::Session(SessionSnapshot::of(session))
}

fn edited(session: &Session, table: Option<usize>, previous: String) -> Result<View, SessionError> {
    let index = table.unwrap_or_else(|| session.selected_index());
    Ok(View::Edited {
        previous,
        table: TableView::of(index, session.table(index)?),
    })
}
