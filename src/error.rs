// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types with consistent API responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Application error type shared by the jobs and the trigger routes.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Network, throttling or server-side failure from the Bungie API.
    #[error("Bungie API error: {0}")]
    Remote(String),

    /// The Bungie API answered, but with a payload we cannot use.
    #[error("Unexpected Bungie API data: {0}")]
    RemoteData(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Run cancelled")]
    Cancelled,

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Message carried by `Remote` when the API throttled us.
    pub const REMOTE_RATE_LIMIT: &'static str = "Rate limit exceeded";

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, AppError::Remote(msg) if msg == Self::REMOTE_RATE_LIMIT)
    }
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, details) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", Some(msg.clone())),
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "bad_request", Some(msg.clone()))
            }
            AppError::Remote(msg) => (StatusCode::BAD_GATEWAY, "bungie_error", Some(msg.clone())),
            AppError::RemoteData(msg) => {
                (StatusCode::BAD_GATEWAY, "bungie_data_error", Some(msg.clone()))
            }
            AppError::Cancelled => (StatusCode::SERVICE_UNAVAILABLE, "cancelled", None),
            AppError::Database(msg) => {
                tracing::error!(error = %msg, "Database error");
                (StatusCode::INTERNAL_SERVER_ERROR, "database_error", None)
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for jobs and handlers
pub type Result<T> = std::result::Result<T, AppError>;
