// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.
//!
//! Provider credentials are optional: a missing client id or callback URL is
//! reported when a flow that needs it runs, so one unconfigured provider never
//! keeps the rest of the service from starting.

use std::env;
use std::time::Duration;

/// Default delay before the single retry after a 429 from a provider.
const DEFAULT_RATE_LIMIT_RETRY_SECS: u64 = 5;

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server port
    pub port: u16,
    /// SQLite database file
    pub database_path: String,
    /// Internal destination for OAuth redirects (success and fallback)
    pub frontend_url: String,

    // --- Secrets ---
    /// Bearer secret expected from the scheduler on `/cron/*`
    pub cron_secret: Option<String>,
    /// Bearer secret for `/admin/*` (defaults to the cron secret)
    pub admin_secret: Option<String>,

    // --- Spotify ---
    pub spotify_client_id: Option<String>,
    pub spotify_client_secret: Option<String>,
    pub spotify_callback_url: Option<String>,

    // --- Strava ---
    pub strava_client_id: Option<String>,
    pub strava_client_secret: Option<String>,
    pub strava_callback_url: Option<String>,
    /// Token echoed back by Strava during subscription verification
    pub strava_verify_token: Option<String>,
    /// Public URL Strava delivers webhook events to
    pub strava_webhook_callback_url: Option<String>,

    // --- Downstream cache ---
    /// Endpoint that accepts `{"tag": ...}` to revalidate a read cache
    pub revalidate_url: Option<String>,
    pub revalidate_secret: Option<String>,

    /// Fixed wait before retrying a rate-limited provider call
    pub rate_limit_retry_delay: Duration,
}

impl Config {
    /// Load configuration from environment variables (and `.env` if present).
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let port = match optional("PORT") {
            Some(raw) => raw
                .parse()
                .map_err(|_| ConfigError::Invalid("PORT", raw))?,
            None => 8080,
        };

        let rate_limit_retry_delay = match optional("RATE_LIMIT_RETRY_SECS") {
            Some(raw) => Duration::from_secs(
                raw.parse()
                    .map_err(|_| ConfigError::Invalid("RATE_LIMIT_RETRY_SECS", raw))?,
            ),
            None => Duration::from_secs(DEFAULT_RATE_LIMIT_RETRY_SECS),
        };

        let cron_secret = optional("CRON_SECRET");
        let admin_secret = optional("ADMIN_SECRET").or_else(|| cron_secret.clone());

        let config = Self {
            port,
            database_path: optional("DATABASE_PATH")
                .unwrap_or_else(|| "data/feedkeeper.db".to_string()),
            frontend_url: optional("FRONTEND_URL")
                .unwrap_or_else(|| "http://localhost:3000".to_string()),
            cron_secret,
            admin_secret,
            spotify_client_id: optional("SPOTIFY_CLIENT_ID"),
            spotify_client_secret: optional("SPOTIFY_CLIENT_SECRET"),
            spotify_callback_url: optional("SPOTIFY_CALLBACK_URL"),
            strava_client_id: optional("STRAVA_CLIENT_ID"),
            strava_client_secret: optional("STRAVA_CLIENT_SECRET"),
            strava_callback_url: optional("STRAVA_CALLBACK_URL"),
            strava_verify_token: optional("STRAVA_VERIFY_TOKEN"),
            strava_webhook_callback_url: optional("STRAVA_WEBHOOK_CALLBACK_URL"),
            revalidate_url: optional("REVALIDATE_URL"),
            revalidate_secret: optional("REVALIDATE_SECRET"),
            rate_limit_retry_delay,
        };

        config.warn_on_gaps();
        Ok(config)
    }

    /// Config for tests: every provider configured, no retry delay.
    pub fn test_default() -> Self {
        Self {
            port: 8080,
            database_path: ":memory:".to_string(),
            frontend_url: "http://localhost:3000".to_string(),
            cron_secret: Some("test_cron_secret".to_string()),
            admin_secret: Some("test_cron_secret".to_string()),
            spotify_client_id: Some("spotify_client".to_string()),
            spotify_client_secret: Some("spotify_secret".to_string()),
            spotify_callback_url: Some("http://localhost:8080/auth/callback".to_string()),
            strava_client_id: Some("strava_client".to_string()),
            strava_client_secret: Some("strava_secret".to_string()),
            strava_callback_url: Some("http://localhost:8080/auth/callback".to_string()),
            strava_verify_token: Some("test_verify_token".to_string()),
            strava_webhook_callback_url: Some("https://example.com/webhook/strava".to_string()),
            revalidate_url: None,
            revalidate_secret: None,
            rate_limit_retry_delay: Duration::ZERO,
        }
    }

    /// Log every configuration gap at startup. The affected flows still
    /// degrade gracefully when invoked.
    fn warn_on_gaps(&self) {
        let gaps = [
            ("CRON_SECRET", self.cron_secret.is_none()),
            ("SPOTIFY_CLIENT_ID", self.spotify_client_id.is_none()),
            ("SPOTIFY_CALLBACK_URL", self.spotify_callback_url.is_none()),
            ("STRAVA_CLIENT_ID", self.strava_client_id.is_none()),
            ("STRAVA_CLIENT_SECRET", self.strava_client_secret.is_none()),
            ("STRAVA_CALLBACK_URL", self.strava_callback_url.is_none()),
            ("STRAVA_VERIFY_TOKEN", self.strava_verify_token.is_none()),
        ];
        for (name, missing) in gaps {
            if missing {
                tracing::error!(variable = name, "Configuration gap: variable not set");
            }
        }
    }
}

/// Read an environment variable, treating blank values as unset.
fn optional(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable {0}: {1:?}")]
    Invalid(&'static str, String),
}
