use axum::{
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde_json::json;

pub type Result<T> = std::result::Result<T, Error>;

/// Why a session refused a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClosedReason {
    TimeExpired,
    Submitted,
}

impl std::fmt::Display for ClosedReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClosedReason::TimeExpired => f.write_str("time expired"),
            ClosedReason::Submitted => f.write_str("assessment has already been submitted"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("{0}")]
    SessionClosed(ClosedReason),

    #[error("Major mismatch: vacancy requires '{required_major}', candidate major is '{candidate_major}'")]
    MajorMismatch {
        candidate_major: String,
        required_major: String,
    },

    #[error("Incomplete profile: no education major recorded")]
    IncompleteProfile,

    #[error("Candidate has already applied in this vacancy period")]
    DuplicateApplication,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Database error: {0}")]
    Database(sqlx::Error),

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn code(&self) -> &'static str {
        match self {
            Error::InvalidTransition(_) => "invalid_transition",
            Error::InvalidState(_) => "invalid_state",
            Error::SessionClosed(ClosedReason::TimeExpired) => "time_expired",
            Error::SessionClosed(ClosedReason::Submitted) => "session_closed",
            Error::MajorMismatch { .. } => "major_mismatch",
            Error::IncompleteProfile => "incomplete_profile",
            Error::DuplicateApplication => "duplicate_application",
            Error::NotFound(_) => "not_found",
            Error::BadRequest(_) | Error::Validation(_) | Error::Json(_) => "bad_request",
            Error::Unauthorized(_) => "unauthorized",
            Error::Forbidden(_) => "forbidden",
            _ => "internal_error",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::InvalidTransition(_)
            | Error::InvalidState(_)
            | Error::DuplicateApplication
            | Error::SessionClosed(ClosedReason::Submitted) => StatusCode::CONFLICT,
            Error::SessionClosed(ClosedReason::TimeExpired) => StatusCode::GONE,
            Error::MajorMismatch { .. } | Error::IncompleteProfile => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            Error::BadRequest(_) | Error::Validation(_) | Error::Json(_) => StatusCode::BAD_REQUEST,
            Error::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Error::Forbidden(_) => StatusCode::FORBIDDEN,
            Error::Http(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        let message = match &self {
            Error::Database(err) => {
                tracing::error!(error = ?err, "database error");
                "An unexpected error occurred".to_string()
            }
            Error::Internal(_) | Error::Config(_) | Error::Anyhow(_) => {
                tracing::error!(error = %self, "internal error");
                "An unexpected error occurred".to_string()
            }
            Error::SessionClosed(reason) => reason.to_string(),
            Error::NotFound(msg)
            | Error::InvalidTransition(msg)
            | Error::InvalidState(msg)
            | Error::BadRequest(msg)
            | Error::Unauthorized(msg)
            | Error::Forbidden(msg) => msg.clone(),
            other => other.to_string(),
        };

        let body = Json(json!({ "error": self.code(), "message": message }));
        (status, body).into_response()
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Error::NotFound("Resource not found".to_string()),
            other => Error::Database(other),
        }
    }
}
