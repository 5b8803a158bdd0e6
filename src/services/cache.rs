// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Downstream read-cache invalidation.

use crate::config::Config;

/// Read-cache tag covering listening history.
pub const SPOTIFY_TAG: &str = "spotify";
/// Read-cache tag covering activities.
pub const STRAVA_TAG: &str = "strava";

/// Posts `{"tag": ...}` to the configured revalidation endpoint.
///
/// Invalidation is best effort: failures are logged and never fail the
/// write that triggered them. Without `REVALIDATE_URL` every call is a no-op.
#[derive(Clone)]
pub struct CacheInvalidator {
    http: reqwest::Client,
    url: Option<String>,
    secret: Option<String>,
}

impl CacheInvalidator {
    pub fn new(url: Option<String>, secret: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            url,
            secret,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.revalidate_url.clone(), config.revalidate_secret.clone())
    }

    pub fn disabled() -> Self {
        Self::new(None, None)
    }

    pub async fn invalidate(&self, tag: &str) {
        let Some(url) = &self.url else {
            tracing::debug!(tag, "No revalidation endpoint configured");
            return;
        };

        let mut request = self.http.post(url).json(&serde_json::json!({ "tag": tag }));
        if let Some(secret) = &self.secret {
            request = request.bearer_auth(secret);
        }

        match request.send().await {
            Ok(resp) if resp.status().is_success() => {
                tracing::info!(tag, "Read cache invalidated");
            }
            Ok(resp) => {
                tracing::warn!(tag, status = %resp.status(), "Cache invalidation rejected");
            }
            Err(e) => {
                tracing::warn!(tag, error = %e, "Cache invalidation failed");
            }
        }
    }
}
