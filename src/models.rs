use serde::{Deserialize, Serialize};

use crate::commands::HealthReport;
use crate::session::HistoryEntry;
use crate::viewer::TableView;

pub const API_PREFIX: &str = "/api/v1";
pub const MAX_JSON_BODY_BYTES: usize = 1024 * 1024;
pub const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    #[serde(flatten)]
    pub report: HealthReport,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CellEditRequest {
    #[serde(default)]
    pub table: Option<usize>,
    pub row: usize,
    pub column: usize,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ColumnRenameRequest {
    #[serde(default)]
    pub table: Option<usize>,
    pub column: usize,
    pub label: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EditResponse {
    pub previous: String,
    pub table: TableView,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct HistoryResponse {
    pub items: Vec<HistoryEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}
