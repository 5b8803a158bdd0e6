// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Webhook routes for Strava events.

use crate::services::webhook::{classify, Classified, WebhookError};
use crate::AppState;
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Webhook routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/webhook/strava", get(verify).post(handle_event))
}

/// Strava webhook verification query params.
#[derive(Deserialize)]
struct VerifyParams {
    #[serde(rename = "hub.mode")]
    mode: Option<String>,
    #[serde(rename = "hub.challenge")]
    challenge: Option<String>,
    #[serde(rename = "hub.verify_token")]
    verify_token: Option<String>,
}

/// Verification response.
#[derive(Serialize)]
struct VerifyResponse {
    #[serde(rename = "hub.challenge")]
    challenge: String,
}

/// Answer Strava's subscription challenge (GET).
async fn verify(
    State(state): State<Arc<AppState>>,
    Query(params): Query<VerifyParams>,
) -> Response {
    let (Some(mode), Some(challenge)) = (params.mode, params.challenge) else {
        return StatusCode::NO_CONTENT.into_response();
    };

    let expected = state.subscriptions.verify_token();
    let token_matches = matches!(
        (expected, params.verify_token.as_deref()),
        (Some(expected), Some(presented)) if expected == presented
    );

    if mode == "subscribe" && token_matches {
        tracing::info!("Webhook subscription verified");
        (StatusCode::OK, Json(VerifyResponse { challenge })).into_response()
    } else {
        tracing::warn!(mode = %mode, "Webhook verification failed");
        StatusCode::BAD_REQUEST.into_response()
    }
}

/// Handle incoming webhook events (POST).
async fn handle_event(State(state): State<Arc<AppState>>, body: Bytes) -> StatusCode {
    let event = match classify(&body) {
        Classified::NotAnEvent => {
            tracing::debug!("Ignoring body that is not a webhook event");
            return StatusCode::NO_CONTENT;
        }
        Classified::Invalid(reason) => {
            tracing::warn!(reason = %reason, "Rejecting malformed webhook event");
            return StatusCode::BAD_REQUEST;
        }
        Classified::Event(event) => event,
    };

    match state.webhooks.process(&event).await {
        Ok(outcome) => {
            tracing::info!(outcome = ?outcome, object_id = event.object_id, "Webhook event applied");
            StatusCode::OK
        }
        Err(WebhookError::UnknownSubscription) => StatusCode::FORBIDDEN,
        Err(e @ (WebhookError::SubscriptionCheck(_) | WebhookError::Fetch(_))) => {
            tracing::error!(error = %e, object_id = event.object_id, "Webhook event failed");
            StatusCode::BAD_GATEWAY
        }
        Err(e @ WebhookError::Storage(_)) => {
            tracing::error!(error = %e, object_id = event.object_id, "Webhook event failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}
