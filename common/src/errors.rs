//! Application error type.
//!
//! Every gateway operation either returns a well-typed result or fails with
//! exactly one of these kinds.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::response::ApiResponse;

/// Result alias used throughout the gateway.
pub type AppResult<T> = Result<T, AppError>;

/// Gateway error kinds.
#[derive(Debug, Error)]
pub enum AppError {
    /// Malformed or missing request data.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Missing or rejected credentials.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Unknown query or resource id.
    #[error("not found: {0}")]
    NotFound(String),

    /// Misconfiguration or local failure (including the query store).
    #[error("application error: {0}")]
    Application(String),

    /// The upstream resource answered with an unexpected status or shape.
    #[error("resource interface error: {0}")]
    ResourceInterface(String),
}

impl AppError {
    /// Error code rendered in the response envelope.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Protocol(_) => "PROTOCOL_ERROR",
            AppError::Unauthorized(_) => "UNAUTHORIZED",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Application(_) => "APPLICATION_ERROR",
            AppError::ResourceInterface(_) => "RESOURCE_INTERFACE_ERROR",
        }
    }

    /// HTTP status the error maps to.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Protocol(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Application(_) | AppError::ResourceInterface(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Human-readable message without the kind prefix.
    pub fn message(&self) -> &str {
        match self {
            AppError::Protocol(msg)
            | AppError::Unauthorized(msg)
            | AppError::NotFound(msg)
            | AppError::Application(msg)
            | AppError::ResourceInterface(msg) => msg,
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Application(format!("query store failure: {}", err))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Protocol(format!("invalid JSON: {}", err))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();

        if status.is_server_error() {
            tracing::error!(error = code, message = %self.message(), "request failed");
        } else {
            tracing::debug!(error = code, message = %self.message(), "request rejected");
        }

        let body = ApiResponse::err(code, self.message());
        (status, Json(body)).into_response()
    }
}
