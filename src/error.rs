//! Error handling for the PTZ camserver

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Unknown camera id or missing session
    #[error("Not found: {0}")]
    NotFound(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Conflict (duplicate)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Operation not supported by the device or protocol
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Device unreachable or rejected the session at start
    #[error("Connect failed for camera {camera_id}: {message}")]
    Connect { camera_id: String, message: String },

    /// A move/stop/preset call failed
    #[error("Command failed: {0}")]
    Command(String),

    /// Error while stopping a provider
    #[error("Teardown failed: {0}")]
    Teardown(String),

    /// Provider call exceeded its time budget
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Network error
    #[error("Network error: {0}")]
    Network(String),

    /// Config error
    #[error("Config error: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, error_code) = match &self {
            Error::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Error::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            Error::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            Error::Unsupported(_) => (StatusCode::BAD_REQUEST, "UNSUPPORTED"),
            Error::Connect { .. } => (StatusCode::BAD_GATEWAY, "CONNECT_FAILED"),
            Error::Command(_) => (StatusCode::INTERNAL_SERVER_ERROR, "COMMAND_FAILED"),
            Error::Teardown(_) => (StatusCode::INTERNAL_SERVER_ERROR, "TEARDOWN_FAILED"),
            Error::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, "TIMEOUT"),
            Error::Network(_) => (StatusCode::BAD_GATEWAY, "NETWORK_ERROR"),
            Error::Http(_) => (StatusCode::BAD_GATEWAY, "HTTP_ERROR"),
            Error::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "CONFIG_ERROR"),
            Error::Serialization(_) => (StatusCode::INTERNAL_SERVER_ERROR, "SERIALIZATION_ERROR"),
            Error::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "IO_ERROR"),
            Error::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };

        let message = match &self {
            Error::NotFound(msg)
            | Error::Validation(msg)
            | Error::Conflict(msg)
            | Error::Unsupported(msg)
            | Error::Command(msg)
            | Error::Teardown(msg)
            | Error::Timeout(msg)
            | Error::Network(msg)
            | Error::Config(msg)
            | Error::Internal(msg) => msg.clone(),
            other => other.to_string(),
        };

        if status.is_server_error() {
            tracing::error!(
                status = %status,
                error_code = %error_code,
                message = %message,
                "Request error"
            );
        } else {
            tracing::debug!(
                status = %status,
                error_code = %error_code,
                message = %message,
                "Request rejected"
            );
        }

        let body = Json(json!({
            "error_code": error_code,
            "message": message
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let resp = Error::NotFound("cam1".into()).into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let resp = Error::Command("move failed".into()).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let resp = Error::Conflict("dup".into()).into_response();
        assert_eq!(resp.status(), StatusCode::CONFLICT);
    }
}
