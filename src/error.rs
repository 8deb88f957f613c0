// =============================================================================
// Application error type
// =============================================================================

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("invalid request: {0}")]
    Invalid(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("interlink rule error: {0}")]
    Interlink(String),

    #[error("risk calculation error: {0}")]
    Calculation(String),
}

impl IntoResponse for AppError {
    /// Maps the error taxonomy in spec.md §7 to an HTTP status and body.
    /// Transient storage/IO/config failures log their detail server-side
    /// (the caller's correlation id is already attached to the enclosing
    /// span) and return only a generic category message — the detail is
    /// never handed back to the client.
    fn into_response(self) -> Response {
        match self {
            AppError::Invalid(msg) => (StatusCode::BAD_REQUEST, format!("{msg}\n")).into_response(),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, format!("{msg}\n")).into_response(),
            AppError::Unauthorized => {
                (StatusCode::UNAUTHORIZED, "unauthorized\n").into_response()
            }
            AppError::Database(ref e) => {
                tracing::error!(error = %e, "transient storage failure");
                (StatusCode::INTERNAL_SERVER_ERROR, "error processing request\n").into_response()
            }
            AppError::Io(ref e) => {
                tracing::error!(error = %e, "io failure");
                (StatusCode::INTERNAL_SERVER_ERROR, "error processing request\n").into_response()
            }
            AppError::Config(ref msg) => {
                tracing::error!(error = %msg, "configuration error");
                (StatusCode::INTERNAL_SERVER_ERROR, "error processing request\n").into_response()
            }
            AppError::Interlink(ref msg) => {
                tracing::error!(error = %msg, "interlink error");
                (StatusCode::INTERNAL_SERVER_ERROR, "error processing request\n").into_response()
            }
            AppError::Calculation(ref msg) => {
                tracing::error!(error = %msg, "risk calculation error");
                (StatusCode::INTERNAL_SERVER_ERROR, "error processing request\n").into_response()
            }
        }
    }
}
