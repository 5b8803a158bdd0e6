// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Administrative routes: webhook subscriptions, token status and refresh,
//! and history import.

use crate::error::AppError;
use crate::models::TokenStatus;
use crate::services::import::{ArchiveEntry, ImportError, ImportReport};
use crate::services::strava::PushSubscription;
use crate::services::subscriptions::SubscriptionError;
use crate::services::tokens::ForceRefreshError;
use crate::services::Provider;
use crate::time_utils::format_utc_rfc3339;
use crate::AppState;
use axum::{
    extract::{DefaultBodyLimit, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Streaming-history exports run to tens of megabytes.
const IMPORT_BODY_LIMIT: usize = 64 * 1024 * 1024;

/// Admin routes. Bearer authentication is layered on by the router.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/admin/strava/subscriptions",
            get(list_subscriptions).post(create_subscription),
        )
        .route("/admin/strava/subscriptions/{id}", delete(delete_subscription))
        .route("/admin/tokens/{provider}", get(token_status))
        .route("/admin/tokens/{provider}/refresh", post(force_refresh))
        .route(
            "/admin/spotify/import",
            post(import_history).layer(DefaultBodyLimit::max(IMPORT_BODY_LIMIT)),
        )
}

fn parse_provider(raw: &str) -> Result<Provider, AppError> {
    raw.parse()
        .map_err(|_| AppError::NotFound(format!("provider {}", raw)))
}

// ─── Subscriptions ───────────────────────────────────────────────────────────

impl IntoResponse for SubscriptionError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "success": false,
            "error": self.code(),
            "details": self.to_string(),
        });
        (self.status(), Json(body)).into_response()
    }
}

#[derive(Serialize)]
struct SubscriptionList {
    subscriptions: Vec<PushSubscription>,
}

async fn list_subscriptions(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SubscriptionList>, SubscriptionError> {
    let subscriptions = state.subscriptions.list().await?;
    Ok(Json(SubscriptionList { subscriptions }))
}

async fn create_subscription(
    State(state): State<Arc<AppState>>,
) -> Result<(StatusCode, Json<PushSubscription>), SubscriptionError> {
    let subscription = state.subscriptions.create().await?;
    Ok((StatusCode::CREATED, Json(subscription)))
}

async fn delete_subscription(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> Result<Json<serde_json::Value>, SubscriptionError> {
    state.subscriptions.delete(id).await?;
    Ok(Json(serde_json::json!({ "success": true })))
}

// ─── Tokens ──────────────────────────────────────────────────────────────────

async fn token_status(
    State(state): State<Arc<AppState>>,
    Path(provider): Path<String>,
) -> Result<Json<TokenStatus>, AppError> {
    let provider = parse_provider(&provider)?;
    Ok(Json(state.tokens.status(provider)))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ForceRefreshResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    expires_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'static str>,
}

async fn force_refresh(
    State(state): State<Arc<AppState>>,
    Path(provider): Path<String>,
) -> Result<(StatusCode, Json<ForceRefreshResponse>), AppError> {
    let provider = parse_provider(&provider)?;

    match state.tokens.force_refresh(provider).await {
        Ok(expiry) => Ok((
            StatusCode::OK,
            Json(ForceRefreshResponse {
                success: true,
                expires_at: Some(format_utc_rfc3339(expiry)),
                error: None,
            }),
        )),
        Err(e) => {
            tracing::warn!(provider = %provider, code = e.code(), error = %e, "Force refresh failed");
            let status = match e {
                ForceRefreshError::NotConnected | ForceRefreshError::MissingRefreshToken => {
                    StatusCode::CONFLICT
                }
                ForceRefreshError::Rejected(_) | ForceRefreshError::Provider(_) => {
                    StatusCode::BAD_GATEWAY
                }
                ForceRefreshError::MissingClientCredentials | ForceRefreshError::Database(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            };
            Ok((
                status,
                Json(ForceRefreshResponse {
                    success: false,
                    expires_at: None,
                    error: Some(e.code()),
                }),
            ))
        }
    }
}

// ─── Import ──────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImportParams {
    #[serde(default)]
    dry_run: bool,
}

impl IntoResponse for ImportError {
    fn into_response(self) -> Response {
        let status = match &self {
            ImportError::InvalidEntry { .. } => StatusCode::BAD_REQUEST,
            ImportError::App(AppError::NotConnected(_)) => StatusCode::SERVICE_UNAVAILABLE,
            ImportError::App(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = serde_json::json!({
            "error": self.code(),
            "details": self.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

async fn import_history(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ImportParams>,
    Json(entries): Json<Vec<ArchiveEntry>>,
) -> Result<Json<ImportReport>, ImportError> {
    tracing::info!(entries = entries.len(), dry_run = params.dry_run, "History import requested");
    let report = state.importer.import(&entries, params.dry_run).await?;
    Ok(Json(report))
}
