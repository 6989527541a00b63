//! Per-user workflow state.
//!
//! A session moves through three stages. `extract` needs a loaded document,
//! `results` needs at least one table; forward moves whose precondition does
//! not hold leave the stage unchanged. Actions other than navigation are only
//! accepted in the stages that own them, see [`Session::require_stage`].

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use pdf_table_extract::{
    Document, ExtractError, ExtractWarning, ExtractedTable, ExtractionOutcome, ExtractionSettings,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error("no document is loaded; upload a PDF first")]
    NoDocument,

    #[error("there are no extracted tables; run an extraction first")]
    NoTables,

    #[error("table {index} does not exist; {count} table(s) available")]
    TableNotFound { index: usize, count: usize },

    #[error("cell ({row}, {column}) is outside the {rows}x{columns} table")]
    CellOutOfRange {
        row: usize,
        column: usize,
        rows: usize,
        columns: usize,
    },

    #[error("column {column} is outside the table's {columns} column(s)")]
    ColumnOutOfRange { column: usize, columns: usize },

    #[error("{action} is not available in the {stage} stage")]
    WrongStage { action: &'static str, stage: Stage },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    #[default]
    Upload,
    Extract,
    Results,
}

impl Stage {
    #[must_use]
    pub const fn next(self) -> Self {
        match self {
            Self::Upload => Self::Extract,
            Self::Extract | Self::Results => Self::Results,
        }
    }

    #[must_use]
    pub const fn previous(self) -> Self {
        match self {
            Self::Upload | Self::Extract => Self::Upload,
            Self::Results => Self::Extract,
        }
    }
}

impl Display for Stage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Upload => "upload",
            Self::Extract => "extract",
            Self::Results => "results",
        })
    }
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "upload" => Ok(Self::Upload),
            "extract" => Ok(Self::Extract),
            "results" => Ok(Self::Results),
            other => Err(format!(
                "unknown stage '{other}', expected upload, extract or results"
            )),
        }
    }
}

/// One successful extraction call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub document: String,
    pub settings: ExtractionSettings,
    pub table_count: usize,
    pub failed_pages: Vec<u32>,
}

#[derive(Debug)]
pub struct Session {
    id: Uuid,
    stage: Stage,
    document: Option<Document>,
    tables: Vec<ExtractedTable>,
    selected: usize,
    history: Vec<HistoryEntry>,
    warnings: Vec<ExtractWarning>,
    last_settings: Option<ExtractionSettings>,
    reset_clears_history: bool,
    last_used: DateTime<Utc>,
}

impl Session {
    #[must_use]
    pub fn new(id: Uuid, reset_clears_history: bool) -> Self {
        Self {
            id,
            stage: Stage::Upload,
            document: None,
            tables: Vec::new(),
            selected: 0,
            history: Vec::new(),
            warnings: Vec::new(),
            last_settings: None,
            reset_clears_history,
            last_used: Utc::now(),
        }
    }

    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub fn stage(&self) -> Stage {
        self.stage
    }

    #[must_use]
    pub fn document(&self) -> Option<&Document> {
        self.document.as_ref()
    }

    /// Fails unless the session currently sits in one of `allowed`.
    pub fn require_stage(
        &self,
        action: &'static str,
        allowed: &[Stage],
    ) -> Result<(), SessionError> {
        if allowed.contains(&self.stage) {
            Ok(())
        } else {
            debug!(session = %self.id, action, stage = %self.stage, "action rejected by stage");
            Err(SessionError::WrongStage {
                action,
                stage: self.stage,
            })
        }
    }

    pub fn require_document(&self) -> Result<&Document, SessionError> {
        self.document.as_ref().ok_or(SessionError::NoDocument)
    }

    #[must_use]
    pub fn tables(&self) -> &[ExtractedTable] {
        &self.tables
    }

    #[must_use]
    pub fn selected_index(&self) -> usize {
        self.selected
    }

    #[must_use]
    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    #[must_use]
    pub fn warnings(&self) -> &[ExtractWarning] {
        &self.warnings
    }

    #[must_use]
    pub fn last_settings(&self) -> Option<&ExtractionSettings> {
        self.last_settings.as_ref()
    }

    #[must_use]
    pub fn last_used(&self) -> DateTime<Utc> {
        self.last_used
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_used = now;
    }

    /// Whether `stage` can be entered from the current data.
    #[must_use]
    pub fn can_enter(&self, stage: Stage) -> bool {
        match stage {
            Stage::Upload => true,
            Stage::Extract => self.document.is_some(),
            Stage::Results => self.document.is_some() && !self.tables.is_empty(),
        }
    }

    /// Replaces any previous document; its temporary file is removed on drop.
    pub fn load_document(&mut self, document: Document) {
        info!(
            session = %self.id,
            file = document.name(),
            pages = document.page_count(),
            "document loaded"
        );
        self.document = Some(document);
        self.replace_tables(Vec::new());
        self.warnings.clear();
        self.last_settings = None;
        self.stage = Stage::Extract;
    }

    /// Stores a finished extraction and records it in the history.
    pub fn apply_extraction(
        &mut self,
        settings: ExtractionSettings,
        outcome: ExtractionOutcome,
    ) -> Result<(), SessionError> {
        let document = self.require_document()?.name().to_string();

        self.history.push(HistoryEntry {
            timestamp: Utc::now(),
            document,
            settings: settings.clone(),
            table_count: outcome.tables.len(),
            failed_pages: outcome.failed_pages,
        });
        self.last_settings = Some(settings);
        self.warnings = outcome.warnings;
        self.replace_tables(outcome.tables);
        self.stage = if self.tables.is_empty() {
            Stage::Extract
        } else {
            Stage::Results
        };
        info!(
            session = %self.id,
            tables = self.tables.len(),
            stage = %self.stage,
            "extraction applied"
        );
        Ok(())
    }

    fn replace_tables(&mut self, tables: Vec<ExtractedTable>) {
        self.tables = tables;
        self.selected = 0;
    }

    /// Moves one stage forward when allowed and returns the resulting stage.
    pub fn advance(&mut self) -> Stage {
        self.goto(self.stage.next())
    }

    /// Moves one stage back; always allowed.
    pub fn go_back(&mut self) -> Stage {
        self.stage = self.stage.previous();
        self.stage
    }

    pub fn goto(&mut self, target: Stage) -> Stage {
        if self.can_enter(target) {
            self.stage = target;
        } else {
            debug!(session = %self.id, from = %self.stage, to = %target, "navigation ignored");
        }
        self.stage
    }

    /// Selects a table, clamping out-of-range requests to the last table.
    pub fn select_table(&mut self, index: usize) -> usize {
        self.selected = index.min(self.tables.len().saturating_sub(1));
        self.selected
    }

    pub fn selected_table(&self) -> Result<&ExtractedTable, SessionError> {
        self.tables.get(self.selected).ok_or(SessionError::NoTables)
    }

    pub fn table(&self, index: usize) -> Result<&ExtractedTable, SessionError> {
        if self.tables.is_empty() {
            return Err(SessionError::NoTables);
        }
        self.tables.get(index).ok_or(SessionError::TableNotFound {
            index,
            count: self.tables.len(),
        })
    }

    fn table_mut(&mut self, index: Option<usize>) -> Result<&mut ExtractedTable, SessionError> {
        let index = index.unwrap_or(self.selected);
        self.table(index)?;
        self.tables.get_mut(index).ok_or(SessionError::NoTables)
    }

    /// Overwrites one cell and returns its previous value.
    pub fn edit_cell(
        &mut self,
        table: Option<usize>,
        row: usize,
        column: usize,
        value: String,
    ) -> Result<String, SessionError> {
        let target = self.table_mut(table)?;
        let (rows, columns) = (target.row_count(), target.column_count());
        target
            .set_cell(row, column, value)
            .ok_or(SessionError::CellOutOfRange {
                row,
                column,
                rows,
                columns,
            })
    }

    pub fn rename_column(
        &mut self,
        table: Option<usize>,
        column: usize,
        label: String,
    ) -> Result<String, SessionError> {
        let target = self.table_mut(table)?;
        let columns = target.column_count();
        target
            .rename_column(column, label)
            .ok_or(SessionError::ColumnOutOfRange { column, columns })
    }

    /// Drops the document and results; history follows the reset policy.
    pub fn reset(&mut self) {
        self.document = None;
        self.replace_tables(Vec::new());
        self.warnings.clear();
        self.last_settings = None;
        if self.reset_clears_history {
            self.history.clear();
        }
        self.stage = Stage::Upload;
        info!(session = %self.id, "session reset");
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    /// Checks the stage and selection invariants.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        let selection_ok = if self.tables.is_empty() {
            self.selected == 0
        } else {
            self.selected < self.tables.len()
        };
        selection_ok && self.can_enter(self.stage)
    }
}
