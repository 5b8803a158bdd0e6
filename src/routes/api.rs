// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Public read API.

use crate::error::{AppError, Result};
use crate::services::history::HistoryPage;
use crate::time_utils::parse_utc_rfc3339;
use crate::AppState;
use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;

/// API routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/plays", get(list_plays))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaysQuery {
    /// RFC 3339 cursor; only plays strictly older are returned
    before: Option<String>,
    page_size: Option<u32>,
}

async fn list_plays(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PlaysQuery>,
) -> Result<Json<HistoryPage>> {
    let before = match query.before.as_deref() {
        Some(raw) => Some(
            parse_utc_rfc3339(raw)
                .ok_or_else(|| AppError::BadRequest(format!("Invalid before cursor: {}", raw)))?,
        ),
        None => None,
    };

    let page = state.history.page(before, query.page_size).await?;
    Ok(Json(page))
}
