// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Scheduled job routes (called by the cron scheduler).

use crate::services::sync::SyncOutcome;
use crate::AppState;
use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use std::sync::Arc;

/// Cron routes. Bearer authentication is layered on by the router.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/cron/sync", get(sync).post(sync))
}

async fn sync(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SyncOutcome>, (StatusCode, Json<serde_json::Value>)> {
    state.sync.run().await.map(Json).map_err(|e| {
        tracing::error!(error = %e, "Scheduled sync failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": e.to_string() })),
        )
    })
}
