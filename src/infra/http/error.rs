use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::application::error::ErrorReport;
use crate::application::pieces::PieceError;
use crate::application::repos::RepoError;
use crate::application::views::ViewError;
use crate::domain::error::DomainError;

pub mod codes {
    pub const UNAUTHORIZED: &str = "unauthorized";
    pub const FORBIDDEN: &str = "forbidden";
    pub const NOT_FOUND: &str = "not_found";
    pub const DUPLICATE: &str = "duplicate";
    pub const INVALID_INPUT: &str = "invalid_input";
    pub const INTEGRITY: &str = "integrity_error";
    pub const DB_TIMEOUT: &str = "db_timeout";
    pub const REPO: &str = "repo_error";
    pub const COMPILE: &str = "compile_error";
    pub const VIEW_CACHE: &str = "view_cache_error";
}

/// JSON envelope: `{"error": {"code", "message", "hint"?}}`.
#[derive(Serialize)]
struct Envelope<'a> {
    error: Detail<'a>,
}

#[derive(Serialize)]
struct Detail<'a> {
    code: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    hint: Option<&'a str>,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: &'static str,
    hint: Option<String>,
}

impl ApiError {
    pub fn new(
        status: StatusCode,
        code: &'static str,
        message: &'static str,
        hint: Option<String>,
    ) -> Self {
        Self {
            status,
            code,
            message,
            hint,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn unauthorized() -> Self {
        Self::new(
            StatusCode::UNAUTHORIZED,
            codes::UNAUTHORIZED,
            "Unknown bearer token",
            None,
        )
    }

    pub fn forbidden() -> Self {
        Self::new(
            StatusCode::FORBIDDEN,
            codes::FORBIDDEN,
            "Editing requires the edit permission",
            None,
        )
    }

    pub fn not_found(message: &'static str, hint: Option<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, codes::NOT_FOUND, message, hint)
    }

    pub fn invalid_input(hint: impl Into<String>) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            codes::INVALID_INPUT,
            "Invalid input",
            Some(hint.into()),
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let envelope = Envelope {
            error: Detail {
                code: self.code,
                message: self.message,
                hint: self.hint.as_deref(),
            },
        };
        let mut response = (self.status, Json(envelope)).into_response();
        let detail = match &self.hint {
            Some(hint) => format!("{}: {hint}", self.code),
            None => format!("{}: {}", self.code, self.message),
        };
        ErrorReport::from_message("infra::http::cms", self.status, detail).attach(&mut response);
        response
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        Self::invalid_input(err.to_string())
    }
}

impl From<RepoError> for ApiError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::Duplicate { constraint } => Self::new(
                StatusCode::CONFLICT,
                codes::DUPLICATE,
                "Duplicate record",
                Some(constraint),
            ),
            RepoError::NotFound => Self::not_found("Resource not found", None),
            RepoError::InvalidInput { message } => Self::invalid_input(message),
            RepoError::Integrity { message } => Self::new(
                StatusCode::CONFLICT,
                codes::INTEGRITY,
                "Integrity constraint violated",
                Some(message),
            ),
            RepoError::Timeout => Self::new(
                StatusCode::SERVICE_UNAVAILABLE,
                codes::DB_TIMEOUT,
                "Database timeout",
                None,
            ),
            RepoError::Persistence(message) => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                codes::REPO,
                "Persistence error",
                Some(message),
            ),
        }
    }
}

impl From<ViewError> for ApiError {
    fn from(err: ViewError) -> Self {
        match err {
            ViewError::NotFound { address } => Self::not_found("View not found", Some(address)),
            ViewError::Compile { address, message } => Self::new(
                StatusCode::UNPROCESSABLE_ENTITY,
                codes::COMPILE,
                "View failed to compile",
                Some(format!("{address}: {message}")),
            ),
            ViewError::Content { source, .. } => source.into(),
            other @ (ViewError::Cache { .. } | ViewError::Io(_)) => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                codes::VIEW_CACHE,
                "View cache failure",
                Some(other.to_string()),
            ),
        }
    }
}

impl From<PieceError> for ApiError {
    fn from(err: PieceError) -> Self {
        match err {
            PieceError::Forbidden => Self::forbidden(),
            PieceError::NotFound { entity, key } => {
                Self::not_found("Content not found", Some(format!("{entity} `{key}`")))
            }
            PieceError::Domain(err) => err.into(),
            PieceError::Repo(err) => err.into(),
            PieceError::View(err) => err.into(),
        }
    }
}
