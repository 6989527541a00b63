use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::str::FromStr;
use std::time::Instant;

use chrono::Utc;
use pdf_table_extract::export::{HtmlStyle, JsonOrientation, SheetNaming};
use pdf_table_extract::{ExportFormat, ExportOptions, ExportScope, ExtractionSettings};
use serde::Serialize;
use tiny_http::{Header, Method, Request, Response, Server};
use tracing::{info, warn};
use url::Url;
use uuid::Uuid;

use crate::commands::{Command, DEFAULT_PREVIEW_WINDOW, View, Workbench};
use crate::error::ApiError;
use crate::models::{
    API_PREFIX, CellEditRequest, ColumnRenameRequest, EditResponse, HealthResponse,
    HistoryResponse, JSON_CONTENT_TYPE, MAX_JSON_BODY_BYTES,
};
use crate::session::Stage;
use crate::store::SessionStore;
use crate::viewer::ChartKind;

#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl ApiRequest {
    /// Splits a request target such as `/api/v1/sessions?x=1` into path and query.
    pub fn new(method: Method, target: &str, body: Vec<u8>) -> Result<Self, ApiError> {
        let url = Url::parse("http://localhost")?.join(target)?;
        let query = url
            .query_pairs()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect::<HashMap<_, _>>();
        Ok(Self {
            method,
            path: url.path().to_string(),
            query,
            body,
        })
    }

    fn query_value<T>(&self, key: &str) -> Result<Option<T>, ApiError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.query
            .get(key)
            .map(|raw| {
                raw.trim().parse::<T>().map_err(|error| {
                    ApiError::BadRequest(format!("invalid query parameter '{key}': {error}"))
                })
            })
            .transpose()
    }

    fn required<T>(&self, key: &str) -> Result<T, ApiError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.query_value(key)?.ok_or_else(|| {
            ApiError::BadRequest(format!("missing query parameter '{key}'"))
        })
    }

    fn flag(&self, key: &str) -> Option<bool> {
        self.query.get(key).map(|value| {
            let lowered = value.trim().to_ascii_lowercase();
            lowered == "true" || lowered == "1" || lowered == "yes"
        })
    }

    fn json_body<T>(&self) -> Result<T, ApiError>
    where
        T: serde::de::DeserializeOwned,
    {
        if self.body.len() > MAX_JSON_BODY_BYTES {
            return Err(ApiError::PayloadTooLarge(format!(
                "JSON body exceeds {MAX_JSON_BODY_BYTES} bytes"
            )));
        }
        Ok(serde_json::from_slice(&self.body)?)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl ApiResponse {
    #[must_use]
    pub fn new(status: u16, content_type: &str, body: Vec<u8>) -> Self {
        Self {
            status,
            headers: vec![
                ("Content-Type".to_string(), content_type.to_string()),
                ("Cache-Control".to_string(), "no-store".to_string()),
            ],
            body,
        }
    }

    pub fn json<T>(payload: &T) -> Result<Self, ApiError>
    where
        T: Serialize,
    {
        Ok(Self::new(200, JSON_CONTENT_TYPE, serde_json::to_vec(payload)?))
    }

    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    fn into_http(self) -> Response<Cursor<Vec<u8>>> {
        let mut response = Response::from_data(self.body).with_status_code(self.status);
        for (name, value) in &self.headers {
            match Header::from_bytes(name.as_bytes(), value.as_bytes()) {
                Ok(header) => response = response.with_header(header),
                Err(()) => warn!(header = %name, "dropping invalid response header"),
            }
        }
        response
    }
}

/// The HTTP surface over one [`Workbench`] and its sessions.
pub struct App {
    workbench: Workbench,
    store: SessionStore,
}

impl App {
    #[must_use]
    pub fn new(workbench: Workbench) -> Self {
        let config = workbench.config();
        let store = SessionStore::new(
            config.max_sessions,
            config.session_ttl_seconds,
            config.reset_clears_history,
        );
        Self { workbench, store }
    }

    /// Largest request body the server will read.
    #[must_use]
    pub fn max_body_bytes(&self) -> usize {
        self.workbench.config().max_upload_bytes.max(MAX_JSON_BODY_BYTES)
    }

    pub fn handle(&mut self, request: &ApiRequest) -> ApiResponse {
        match self.route(request) {
            Ok(response) => response,
            Err(error) => {
                if error.status_code() >= 500 {
                    warn!(path = %request.path, %error, "request failed");
                } else {
                    info!(path = %request.path, %error, "request rejected");
                }
                error.into_response()
            }
        }
    }

    fn route(&mut self, request: &ApiRequest) -> Result<ApiResponse, ApiError> {
        let not_found = || ApiError::NotFound(format!("no route for {}", request.path));
        let rest = request.path.strip_prefix(API_PREFIX).ok_or_else(not_found)?;
        let segments = rest
            .split('/')
            .filter(|segment| !segment.is_empty())
            .collect::<Vec<_>>();

        match (&request.method, segments.as_slice()) {
            (Method::Get, ["health"]) => {
                let report = self.workbench.health();
                ApiResponse::json(&HealthResponse {
                    status: if report.ok { "ok" } else { "degraded" },
                    version: env!("CARGO_PKG_VERSION"),
                    report,
                })
            }
            (Method::Post, ["sessions"]) => {
                let session = self.store.create(Utc::now());
                let id = session.id();
                let view = self.workbench.dispatch(session, Command::Snapshot)?;
                let mut response = view_response(view)?
                    .with_header("Location", format!("{API_PREFIX}/sessions/{id}"));
                response.status = 201;
                Ok(response)
            }
            (Method::Get, ["sessions", id]) => self.run(id, Command::Snapshot),
            (Method::Delete, ["sessions", id]) => {
                if self.store.remove(parse_session_id(id)?) {
                    Ok(ApiResponse::new(204, JSON_CONTENT_TYPE, Vec::new()))
                } else {
                    Err(unknown_session(id))
                }
            }
            (Method::Post, ["sessions", id, "document"]) => {
                let name = request
                    .query
                    .get("name")
                    .map_or("document.pdf", String::as_str)
                    .to_string();
                let command = Command::LoadDocument {
                    name,
                    bytes: request.body.clone(),
                };
                self.run(id, command)
            }
            (Method::Get, ["sessions", id, "preview"]) => {
                let command = Command::PreviewWindow {
                    window: request.query_value("window")?.unwrap_or(0),
                    per_page: request
                        .query_value("per_page")?
                        .unwrap_or(DEFAULT_PREVIEW_WINDOW),
                    zoom: request.query_value::<f32>("zoom")?.unwrap_or(1.0),
                };
                self.run(id, command)
            }
            (Method::Get, ["sessions", id, "preview", page]) => {
                let page = page.parse::<u32>()?;
                let zoom = request.query_value::<f32>("zoom")?.unwrap_or(1.0);
                self.run(id, Command::Preview { page, zoom })
            }
            (Method::Post, ["sessions", id, "extract"]) => {
                let settings = self.extraction_settings(&request.body)?;
                self.run(id, Command::Extract(settings))
            }
            (Method::Post, ["sessions", id, "next"]) => self.run(id, Command::Next),
            (Method::Post, ["sessions", id, "back"]) => self.run(id, Command::Back),
            (Method::Post, ["sessions", id, "reset"]) => self.run(id, Command::Reset),
            (Method::Post, ["sessions", id, "goto"]) => {
                let stage = request.required::<Stage>("stage")?;
                self.run(id, Command::Goto(stage))
            }
            (Method::Post, ["sessions", id, "select"]) => {
                let index = request.required::<usize>("index")?;
                self.run(id, Command::Select(index))
            }
            (Method::Get, ["sessions", id, "tables"]) => self.run(id, Command::ReadTable(None)),
            (Method::Get, ["sessions", id, "tables", index]) => {
                let index = index.parse::<usize>()?;
                self.run(id, Command::ReadTable(Some(index)))
            }
            (Method::Post, ["sessions", id, "cells"]) => {
                let edit: CellEditRequest = request.json_body()?;
                self.run(
                    id,
                    Command::EditCell {
                        table: edit.table,
                        row: edit.row,
                        column: edit.column,
                        value: edit.value,
                    },
                )
            }
            (Method::Post, ["sessions", id, "columns"]) => {
                let rename: ColumnRenameRequest = request.json_body()?;
                self.run(
                    id,
                    Command::RenameColumn {
                        table: rename.table,
                        column: rename.column,
                        label: rename.label,
                    },
                )
            }
            (Method::Get, ["sessions", id, "chart"]) => {
                let command = Command::Chart {
                    label_column: request.required("label")?,
                    value_column: request.required("value")?,
                    kind: request.query_value::<ChartKind>("kind")?.unwrap_or_default(),
                };
                self.run(id, command)
            }
            (Method::Get, ["sessions", id, "export"]) => {
                let options = export_options(request)?;
                self.run(id, Command::Export(options))
            }
            (Method::Get, ["sessions", id, "history"]) => self.run(id, Command::History),
            (Method::Delete, ["sessions", id, "history"]) => self.run(id, Command::ClearHistory),
            _ => Err(not_found()),
        }
    }

    fn run(&mut self, id: &str, command: Command) -> Result<ApiResponse, ApiError> {
        let session = self
            .store
            .get_mut(parse_session_id(id)?, Utc::now())
            .ok_or_else(|| unknown_session(id))?;
        view_response(self.workbench.dispatch(session, command)?)
    }

    /// Request settings layered over the configured defaults.
    fn extraction_settings(&self, body: &[u8]) -> Result<ExtractionSettings, ApiError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(self.workbench.default_settings());
        }
        if body.len() > MAX_JSON_BODY_BYTES {
            return Err(ApiError::PayloadTooLarge(format!(
                "JSON body exceeds {MAX_JSON_BODY_BYTES} bytes"
            )));
        }
        let mut value: serde_json::Value = serde_json::from_slice(body)?;
        let Some(fields) = value.as_object_mut() else {
            return Err(ApiError::BadRequest(
                "extraction settings must be a JSON object".to_string(),
            ));
        };
        fields
            .entry("pages")
            .or_insert_with(|| self.workbench.config().default_pages.clone().into());
        Ok(serde_json::from_value(value)?)
    }
}

fn parse_session_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| unknown_session(raw))
}

fn unknown_session(id: &str) -> ApiError {
    ApiError::NotFound(format!(
        "session {id} does not exist or has expired; create a new session"
    ))
}

fn export_options(request: &ApiRequest) -> Result<ExportOptions, ApiError> {
    let mut options = ExportOptions {
        format: request.query_value::<ExportFormat>("format")?.unwrap_or_default(),
        scope: request.query_value::<ExportScope>("scope")?.unwrap_or_default(),
        ..ExportOptions::default()
    };

    if let Some(delimiter) = request.query.get("delimiter") {
        let mut chars = delimiter.chars();
        options.csv.delimiter = match (chars.next(), chars.next()) {
            (Some(delimiter), None) => delimiter,
            _ => {
                return Err(ApiError::Validation(
                    "delimiter must be a single character".to_string(),
                ));
            }
        };
    }
    if let Some(encoding) = request.query.get("encoding") {
        options.csv.encoding.clone_from(encoding);
    }
    if let Some(header) = request.flag("header") {
        options.csv.include_header = header;
    }
    if let Some(naming) = request.query_value::<SheetNaming>("sheet_naming")? {
        options.excel.naming = naming;
    }
    if let Some(metadata) = request.flag("metadata") {
        options.excel.include_metadata = metadata;
    }
    if let Some(orientation) = request.query_value::<JsonOrientation>("orient")? {
        options.json.orientation = orientation;
    }
    if let Some(indent) = request.query_value::<usize>("indent")? {
        options.json.indent = indent;
    }
    if let Some(style) = request.query_value::<HtmlStyle>("html_style")? {
        options.html.style = style;
    }
    if let Some(index) = request.flag("index") {
        options.html.include_index = index;
    }
    if let Some(full) = request.flag("full_html") {
        options.html.full_document = full;
    }
    Ok(options)
}

fn view_response(view: View) -> Result<ApiResponse, ApiError> {
    match view {
        View::Session(snapshot) => ApiResponse::json(&snapshot),
        View::Table(table) => ApiResponse::json(&table),
        View::Edited { previous, table } => ApiResponse::json(&EditResponse { previous, table }),
        View::Chart(chart) => ApiResponse::json(&chart),
        View::PreviewWindow(window) => ApiResponse::json(&window),
        View::History(items) => ApiResponse::json(&HistoryResponse { items }),
        View::Preview(page) => Ok(ApiResponse::new(200, "image/png", page.png)
            .with_header("X-Page-Number", page.page.to_string())
            .with_header("X-Page-Width", page.width.to_string())
            .with_header("X-Page-Height", page.height.to_string())
            .with_header("X-Render-Dpi", page.dpi.to_string())),
        View::Export(artifact) => {
            let disposition = format!(
                "attachment; filename=\"{}\"; filename*=UTF-8''{}",
                artifact.file_name,
                urlencoding::encode(&artifact.file_name)
            );
            Ok(ApiResponse::new(200, &artifact.content_type, artifact.bytes)
                .with_header("Content-Disposition", disposition))
        }
    }
}

fn read_request(request: &mut Request, limit: usize) -> Result<ApiRequest, ApiError> {
    let too_large = || ApiError::PayloadTooLarge(format!("request body exceeds {limit} bytes"));
    if request.body_length().is_some_and(|length| length > limit) {
        return Err(too_large());
    }

    let mut body = Vec::new();
    request
        .as_reader()
        .take(u64::try_from(limit).unwrap_or(u64::MAX).saturating_add(1))
        .read_to_end(&mut body)?;
    if body.len() > limit {
        return Err(too_large());
    }
    ApiRequest::new(request.method().clone(), request.url(), body)
}

/// Serves requests one at a time until the server is unblocked.
pub fn serve(server: &Server, app: &mut App) {
    for mut request in server.incoming_requests() {
        let started = Instant::now();
        let method = request.method().clone();
        let target = request.url().to_string();

        let response = match read_request(&mut request, app.max_body_bytes()) {
            Ok(api_request) => app.handle(&api_request),
            Err(error) => error.into_response(),
        };
        info!(
            method = %method,
            path = %target,
            status = response.status,
            elapsed_ms = started.elapsed().as_millis(),
            "handled request"
        );

        if let Err(error) = request.respond(response.into_http()) {
            warn!(path = %target, %error, "failed to send response");
        }
    }
}
