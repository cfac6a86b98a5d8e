//! Gateway error type

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Not found: {0}")]
    NotFound(String),

    /// Rejected API input
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Outbound HTTP (cameras, HTTP relay)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Bad process or gateway configuration
    #[error("Config error: {0}")]
    Config(String),

    #[error("Snapshot error: {0}")]
    Snapshot(String),

    /// SOAP session with a camera failed
    #[error("ONVIF error: {0}")]
    Onvif(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

impl Error {
    /// HTTP status and stable code reported to API clients
    fn status(&self) -> (StatusCode, &'static str) {
        match self {
            Error::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Error::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            Error::Http(_) => (StatusCode::BAD_GATEWAY, "HTTP_ERROR"),
            Error::Snapshot(_) => (StatusCode::BAD_GATEWAY, "SNAPSHOT_ERROR"),
            Error::Onvif(_) => (StatusCode::BAD_GATEWAY, "ONVIF_ERROR"),
            Error::Sqlx(_) => (StatusCode::INTERNAL_SERVER_ERROR, "DATABASE_ERROR"),
            Error::Serialization(_) => (StatusCode::INTERNAL_SERVER_ERROR, "SERIALIZATION_ERROR"),
            Error::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "IO_ERROR"),
            Error::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "CONFIG_ERROR"),
            Error::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, error_code) = self.status();
        let message = self.to_string();

        if status.is_server_error() {
            tracing::error!(status = %status, error_code = error_code, message = %message, "Request error");
        } else {
            tracing::debug!(status = %status, error_code = error_code, message = %message, "Request rejected");
        }

        let body = Json(json!({
            "ok": false,
            "error_code": error_code,
            "error": message,
        }));
        (status, body).into_response()
    }
}
