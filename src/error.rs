//! Error types and error handling for the application
//!
//! This module defines custom error types that can be converted to HTTP responses.
//! All errors implement `IntoResponse` to provide consistent error formatting.
//!
//! Note that the chat endpoint deliberately does NOT use this conversion for
//! provider failures: those are returned as HTTP 200 envelopes so the client
//! always has one body shape to branch on (see `api::chat`).

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Application-level error types
#[derive(Error, Debug)]
pub enum AppError {
    /// Request input failed validation (empty message, malformed id, ...)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Error raised while talking to an LLM provider
    #[error("Provider error: {0}")]
    Provider(#[from] crate::providers::ProviderError),

    /// Error raised by the message store (GraphQL or database path)
    #[error("Store error: {0}")]
    Store(#[from] crate::store::StoreError),

    /// Internal server error (catch-all for unexpected errors)
    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            AppError::Provider(_) => (StatusCode::BAD_GATEWAY, self.to_string()),
            AppError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
        };

        let body = Json(json!({
            "error": error_message,
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}
