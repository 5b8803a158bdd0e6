// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! OAuth routes for connecting Spotify and Strava.

use crate::services::oauth::OAuthCallbackError;
use crate::AppState;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;

/// OAuth routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/init", get(auth_init))
        .route("/auth/callback", get(auth_callback))
}

#[derive(Deserialize)]
struct InitParams {
    #[serde(default)]
    provider: String,
}

/// Start an OAuth flow. Configuration gaps never surface as errors to the
/// browser; they land on the internal fallback page instead.
async fn auth_init(
    State(state): State<Arc<AppState>>,
    Query(params): Query<InitParams>,
) -> Redirect {
    match state.oauth.initiate(&params.provider) {
        Ok(authorize_url) => Redirect::temporary(&authorize_url),
        Err(e) => {
            tracing::error!(code = e.code(), error = %e, "Cannot start OAuth flow");
            Redirect::temporary(&format!("{}?oauth={}", state.config.frontend_url, e.code()))
        }
    }
}

#[derive(Deserialize)]
struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    /// Set by the provider when the user denies access
    error: Option<String>,
}

/// OAuth callback from the provider.
async fn auth_callback(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CallbackParams>,
) -> Result<Redirect, OAuthCallbackError> {
    if let Some(error) = &params.error {
        tracing::warn!(error = %error, "Provider returned OAuth error");
    }

    let provider = state
        .oauth
        .complete(params.code.as_deref(), params.state.as_deref())
        .await?;

    Ok(Redirect::temporary(&format!(
        "{}?connected={}",
        state.config.frontend_url, provider
    )))
}

impl IntoResponse for OAuthCallbackError {
    fn into_response(self) -> Response {
        let status = match self {
            OAuthCallbackError::Failed(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        };
        tracing::warn!(code = self.code(), "OAuth callback rejected");
        (status, Json(serde_json::json!({ "error": self.code() }))).into_response()
    }
}
