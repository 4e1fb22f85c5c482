// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types with consistent API responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Application error type that converts to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Authentication required")]
    Unauthorized,

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Forbidden")]
    Forbidden,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Provider credentials are missing, expired, or were rejected again
    /// after the single refresh attempt.
    #[error("Provider authorization failed: {0}")]
    Auth(String),

    /// Non-2xx, non-401 response from an upstream provider.
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// Stream lengths or resolution tiers did not line up.
    #[error("Unexpected track data shape: {0}")]
    DataShape(String),

    #[error("Geocoding failed: {0}")]
    Geocode(String),

    #[error("Malformed track point {index}: bad field '{field}'")]
    MalformedPoint { index: usize, field: String },

    #[error("Operation canceled: {0}")]
    Canceled(String),

    #[error("Polyline encoding failed: {0}")]
    Polyline(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Message used when a provider rejects the current access token.
    pub const PROVIDER_TOKEN_REJECTED: &'static str = "access token rejected";

    /// Whether this error should trigger the provider token refresh.
    pub fn is_auth_error(&self) -> bool {
        matches!(self, AppError::Auth(_))
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
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized", None),
            AppError::InvalidToken => (StatusCode::UNAUTHORIZED, "invalid_token", None),
            AppError::Forbidden => (StatusCode::FORBIDDEN, "forbidden", None),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", Some(msg.clone())),
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "bad_request", Some(msg.clone()))
            }
            AppError::Auth(msg) => (
                StatusCode::UNAUTHORIZED,
                "provider_auth_error",
                Some(msg.clone()),
            ),
            AppError::Upstream(msg) => {
                (StatusCode::BAD_GATEWAY, "upstream_error", Some(msg.clone()))
            }
            AppError::DataShape(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "data_shape_error",
                Some(msg.clone()),
            ),
            AppError::Geocode(msg) => {
                (StatusCode::BAD_GATEWAY, "geocode_error", Some(msg.clone()))
            }
            AppError::MalformedPoint { .. } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "malformed_point",
                Some(self.to_string()),
            ),
            AppError::Canceled(msg) => (
                StatusCode::GATEWAY_TIMEOUT,
                "canceled",
                Some(msg.clone()),
            ),
            AppError::Polyline(msg) => {
                tracing::error!(error = %msg, "Polyline encoding error");
                (StatusCode::INTERNAL_SERVER_ERROR, "polyline_error", None)
            }
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

/// Result type alias for handlers
pub type Result<T> = std::result::Result<T, AppError>;
