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

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// No usable credential is stored for the provider.
    #[error("Provider not connected: {0}")]
    NotConnected(String),

    /// The provider rejected our access token (HTTP 401).
    #[error("Provider rejected access token")]
    ProviderUnauthorized,

    /// The provider asked us to slow down (HTTP 429).
    #[error("Provider rate limit hit")]
    RateLimited,

    #[error("Provider API error: {0}")]
    ProviderApi(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Whether this error is the provider refusing the access token, which
    /// warrants one forced refresh.
    pub fn is_token_error(&self) -> bool {
        matches!(self, AppError::ProviderUnauthorized)
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(err: rusqlite::Error) -> Self {
        AppError::Database(err.to_string())
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
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", Some(msg.clone())),
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "bad_request", Some(msg.clone()))
            }
            AppError::NotConnected(provider) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "not_connected",
                Some(provider.clone()),
            ),
            AppError::ProviderUnauthorized => {
                (StatusCode::BAD_GATEWAY, "provider_unauthorized", None)
            }
            AppError::RateLimited => (StatusCode::BAD_GATEWAY, "provider_rate_limited", None),
            AppError::ProviderApi(msg) => {
                tracing::warn!(error = %msg, "Provider API error");
                (StatusCode::BAD_GATEWAY, "provider_error", Some(msg.clone()))
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
