use std::fmt::{Display, Formatter};

use pdf_table_extract::ExtractError;

use crate::models::{ErrorResponse, JSON_CONTENT_TYPE};
use crate::routes::ApiResponse;
use crate::session::SessionError;

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    WrongStage(String),
    PayloadTooLarge(String),
    Validation(String),
    InvalidDocument(String),
    InvalidPageRange(String),
    Extraction(String),
    Dependency(String),
    Export(String),
    Internal(String),
}

impl ApiError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "bad_request",
            Self::NotFound(_) => "not_found",
            Self::WrongStage(_) => "wrong_stage",
            Self::PayloadTooLarge(_) => "payload_too_large",
            Self::Validation(_) => "validation_error",
            Self::InvalidDocument(_) => "invalid_document",
            Self::InvalidPageRange(_) => "invalid_page_range",
            Self::Extraction(_) => "extraction_error",
            Self::Dependency(_) => "missing_system_dependency",
            Self::Export(_) => "export_error",
            Self::Internal(_) => "internal_error",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::BadRequest(message)
            | Self::NotFound(message)
            | Self::WrongStage(message)
            | Self::PayloadTooLarge(message)
            | Self::Validation(message)
            | Self::InvalidDocument(message)
            | Self::InvalidPageRange(message)
            | Self::Extraction(message)
            | Self::Dependency(message)
            | Self::Export(message)
            | Self::Internal(message) => message,
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            Self::BadRequest(_) => 400,
            Self::NotFound(_) => 404,
            Self::WrongStage(_) => 409,
            Self::PayloadTooLarge(_) => 413,
            Self::Validation(_)
            | Self::InvalidDocument(_)
            | Self::InvalidPageRange(_)
            | Self::Extraction(_) => 422,
            Self::Dependency(_) => 503,
            Self::Export(_) | Self::Internal(_) => 500,
        }
    }

    pub fn into_response(self) -> ApiResponse {
        let body = serde_json::to_vec(&ErrorResponse {
            code: self.code().to_string(),
            message: self.message().to_string(),
        })
        .unwrap_or_else(|_| self.message().as_bytes().to_vec());
        ApiResponse::new(self.status_code(), JSON_CONTENT_TYPE, body)
    }
}

impl Display for ApiError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code(), self.message())
    }
}

impl std::error::Error for ApiError {}

impl From<ExtractError> for ApiError {
    fn from(error: ExtractError) -> Self {
        let message = error.to_string();
        match error {
            ExtractError::MissingSystemDependency { .. } => Self::Dependency(message),
            ExtractError::DocumentTooLarge { .. } => Self::PayloadTooLarge(message),
            ExtractError::InvalidDocument(_) | ExtractError::PdfLoad(_) => {
                Self::InvalidDocument(message)
            }
            ExtractError::InvalidPageRange(_) => Self::InvalidPageRange(message),
            ExtractError::Extraction(_)
            | ExtractError::AmbiguousTable { .. }
            | ExtractError::Render { .. } => Self::Extraction(message),
            ExtractError::InvalidOption(_) => Self::Validation(message),
            ExtractError::Export(_)
            | ExtractError::Csv(_)
            | ExtractError::Json(_)
            | ExtractError::Xlsx(_) => Self::Export(message),
            ExtractError::Io(_) => Self::Internal(message),
        }
    }
}

impl From<SessionError> for ApiError {
    fn from(error: SessionError) -> Self {
        match error {
            SessionError::Extract(inner) => inner.into(),
            SessionError::TableNotFound { .. } => Self::NotFound(error.to_string()),
            SessionError::WrongStage { .. } => Self::WrongStage(error.to_string()),
            SessionError::NoDocument
            | SessionError::NoTables
            | SessionError::CellOutOfRange { .. }
            | SessionError::ColumnOutOfRange { .. } => Self::Validation(error.to_string()),
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(error: serde_json::Error) -> Self {
        Self::BadRequest(format!("invalid JSON body: {error}"))
    }
}

impl From<url::ParseError> for ApiError {
    fn from(error: url::ParseError) -> Self {
        Self::BadRequest(error.to_string())
    }
}

impl From<std::num::ParseIntError> for ApiError {
    fn from(error: std::num::ParseIntError) -> Self {
        Self::BadRequest(error.to_string())
    }
}

impl From<std::io::Error> for ApiError {
    fn from(error: std::io::Error) -> Self {
        Self::Internal(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use pdf_table_extract::ExtractError;

    use super::ApiError;
    use crate::session::{SessionError, Stage};

    #[test]
    fn library_errors_map_to_status_codes() {
        let cases = [
            (
                ExtractError::MissingSystemDependency {
                    tool: "pdftoppm".to_string(),
                    guidance: "install it".to_string(),
                },
                503,
            ),
            (ExtractError::DocumentTooLarge { size: 10, limit: 5 }, 413),
            (ExtractError::InvalidPageRange("x".to_string()), 422),
            (ExtractError::InvalidDocument("bad".to_string()), 422),
            (ExtractError::Export("nope".to_string()), 500),
            (ExtractError::InvalidOption("delimiter".to_string()), 422),
        ];
        for (error, status) in cases {
            let kind = error.kind();
            assert_eq!(ApiError::from(error).status_code(), status, "{kind}");
        }
    }

    #[test]
    fn session_errors_keep_the_library_code() {
        let error: ApiError =
            SessionError::Extract(ExtractError::InvalidPageRange("9".to_string())).into();
        assert_eq!(error.code(), "invalid_page_range");

        let error: ApiError = SessionError::TableNotFound { index: 3, count: 1 }.into();
        assert_eq!(error.status_code(), 404);

        let error: ApiError = SessionError::WrongStage {
            action: "export",
            stage: Stage::Extract,
        }
        .into();
        assert_eq!((error.status_code(), error.code()), (409, "wrong_stage"));
    }

    #[test]
    fn response_body_is_json() {
        let response = ApiError::NotFound("unknown session".to_string()).into_response();
        assert_eq!(response.status, 404);
        let body: serde_json::Value = serde_json::from_slice(&response.body).expect("json body");
        assert_eq!(body["code"], "not_found");
        assert_eq!(body["message"], "unknown session");
    }
}
