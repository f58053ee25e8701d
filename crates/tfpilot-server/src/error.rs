//! Error types for the tfpilot server.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;
use tfpilot_core::PilotError;
use thiserror::Error;

/// Result type alias for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;

/// Errors that can occur in the tfpilot server.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Core pipeline error
    #[error(transparent)]
    Pilot(#[from] PilotError),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid request format
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Missing required field
    #[error("Missing required field: {0}")]
    MissingField(String),

    /// Server configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal server error
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ServerError {
    /// Create a new invalid request error.
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    /// Create a new missing field error.
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField(field.into())
    }

    /// Create a new configuration error.
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ServerError::Pilot(PilotError::MalformedLocator(_)) => StatusCode::BAD_REQUEST,
            ServerError::Pilot(PilotError::NotFound(_)) => StatusCode::NOT_FOUND,
            ServerError::Pilot(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServerError::InvalidRequest(_)
            | ServerError::MissingField(_)
            | ServerError::Json(_) => StatusCode::BAD_REQUEST,
            ServerError::Io(_) | ServerError::Config(_) | ServerError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn error_type(&self) -> &'static str {
        match self {
            ServerError::Pilot(PilotError::MalformedLocator(_)) => "malformed_locator",
            ServerError::Pilot(PilotError::NotFound(_)) => "not_found",
            ServerError::Pilot(_) => "pilot_error",
            ServerError::Json(_) => "json_error",
            ServerError::Io(_) => "io_error",
            ServerError::InvalidRequest(_) => "invalid_request",
            ServerError::MissingField(_) => "missing_field",
            ServerError::Config(_) => "config_error",
            ServerError::Internal(_) => "internal_error",
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({
            "error": self.error_type(),
            "details": self.to_string(),
            "timestamp": chrono::Utc::now()
        }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let malformed = ServerError::from(PilotError::MalformedLocator("x".into()));
        assert_eq!(malformed.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(malformed.error_type(), "malformed_locator");

        let missing = ServerError::from(PilotError::NotFound("x".into()));
        assert_eq!(missing.status_code(), StatusCode::NOT_FOUND);

        let fetch = ServerError::from(PilotError::Fetch("x".into()));
        assert_eq!(fetch.status_code(), StatusCode::INTERNAL_SERVER_ERROR);

        let field = ServerError::missing_field("deployment_id");
        assert_eq!(field.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(field.error_type(), "missing_field");
    }
}
