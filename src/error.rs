//! Error handling for the vehicle watch engine

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
    /// Not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Validation error (missing or malformed registration fields)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Conflict (worker still shutting down)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Over capacity (MAX_CAMERAS reached)
    #[error("Over capacity: {0}")]
    OverCapacity(String),

    /// Frame source could not be opened or read
    #[error("Source error for camera {camera_id}: {message}")]
    Source { camera_id: String, message: String },

    /// Persistence sink error
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Config error
    #[error("Config error: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn source_error(camera_id: &str, message: impl Into<String>) -> Self {
        Error::Source {
            camera_id: camera_id.to_string(),
            message: message.into(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match &self {
            Error::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            Error::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            Error::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
            Error::OverCapacity(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "OVER_CAPACITY",
                msg.clone(),
            ),
            Error::Source { camera_id, message } => (
                StatusCode::BAD_GATEWAY,
                "SOURCE_ERROR",
                format!("Camera {}: {}", camera_id, message),
            ),
            Error::Persistence(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "PERSISTENCE_ERROR",
                msg.clone(),
            ),
            Error::Config(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "CONFIG_ERROR",
                msg.clone(),
            ),
            Error::Serialization(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "SERIALIZATION_ERROR",
                e.to_string(),
            ),
            Error::Io(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "IO_ERROR",
                e.to_string(),
            ),
            Error::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                msg.clone(),
            ),
        };

        tracing::error!(
            status = %status,
            error_code = %error_code,
            message = %message,
            "Request error"
        );

        let body = Json(json!({
            "error_code": error_code,
            "message": message
        }));

        (status, body).into_response()
    }
}
