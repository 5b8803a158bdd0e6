// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! OAuth token lifecycle: code exchange, refresh-on-demand, force refresh,
//! and connection status for every provider.

use crate::db::SqliteDb;
use crate::error::AppError;
use crate::models::{Credential, TokenStatus};
use crate::services::providers::{
    ClientAuth, Provider, ProviderRegistry, ProviderSettings, RefreshRotation,
};
use crate::time_utils::format_utc_rfc3339;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use std::future::Future;

/// Margin subtracted from the provider's expiry before storing (5 minutes).
pub const TOKEN_REFRESH_MARGIN_SECS: i64 = 5 * 60;

/// Lifetime assumed when a token response carries no expiry at all.
const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 60 * 60;

/// Token endpoint response. Spotify sends `expires_in`, Strava sends both
/// `expires_in` and an absolute `expires_at`.
#[derive(Debug, Clone, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
}

impl TokenResponse {
    /// Expiry with the refresh margin already applied.
    fn adjusted_expiry(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let margin = Duration::seconds(TOKEN_REFRESH_MARGIN_SECS);
        let provider_expiry = match (self.expires_in, self.expires_at) {
            (Some(secs), _) => now + Duration::seconds(secs),
            (None, Some(ts)) => DateTime::from_timestamp(ts, 0).unwrap_or(now),
            (None, None) => now + Duration::seconds(DEFAULT_TOKEN_LIFETIME_SECS),
        };
        provider_expiry - margin
    }
}

/// Why a refresh could not produce a usable token.
#[derive(Debug, thiserror::Error)]
pub enum ForceRefreshError {
    #[error("No credential stored for provider")]
    NotConnected,

    #[error("Stored credential has no refresh token")]
    MissingRefreshToken,

    #[error("Client id or secret not configured")]
    MissingClientCredentials,

    /// The provider answered 400/401: the refresh token is no longer valid.
    #[error("Provider rejected the refresh token: {0}")]
    Rejected(String),

    #[error("Token refresh request failed: {0}")]
    Provider(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl ForceRefreshError {
    /// Stable error code reported to administrators.
    pub fn code(&self) -> &'static str {
        match self {
            ForceRefreshError::NotConnected => "not-connected",
            ForceRefreshError::MissingRefreshToken => "missing-refresh-token",
            ForceRefreshError::MissingClientCredentials => "missing-client-credentials",
            ForceRefreshError::Rejected(_) => "refresh-rejected",
            ForceRefreshError::Provider(_) => "provider-error",
            ForceRefreshError::Database(_) => "database-error",
        }
    }
}

impl From<AppError> for ForceRefreshError {
    fn from(err: AppError) -> Self {
        ForceRefreshError::Database(err.to_string())
    }
}

impl From<ForceRefreshError> for AppError {
    fn from(err: ForceRefreshError) -> Self {
        match err {
            ForceRefreshError::NotConnected | ForceRefreshError::MissingRefreshToken => {
                AppError::NotConnected(err.to_string())
            }
            ForceRefreshError::Rejected(_) => AppError::ProviderUnauthorized,
            ForceRefreshError::MissingClientCredentials | ForceRefreshError::Provider(_) => {
                AppError::ProviderApi(err.to_string())
            }
            ForceRefreshError::Database(msg) => AppError::Database(msg),
        }
    }
}

/// Manages stored OAuth credentials for all providers.
///
/// Refreshes are deliberately not serialized. Two concurrent callers that
/// both see an expired token will both refresh and the last write wins;
/// each caller still ends up holding a valid token. Strava rotates refresh
/// tokens, so the losing write can store a refresh token Strava has already
/// superseded. That state heals on the next force refresh or reconnect.
#[derive(Clone)]
pub struct TokenManager {
    http: reqwest::Client,
    db: SqliteDb,
    providers: ProviderRegistry,
}

impl TokenManager {
    pub fn new(db: SqliteDb, providers: ProviderRegistry) -> Self {
        Self {
            http: reqwest::Client::new(),
            db,
            providers,
        }
    }

    pub fn settings(&self, provider: Provider) -> &ProviderSettings {
        self.providers.get(provider)
    }

    // ─── Refresh ─────────────────────────────────────────────────────────────

    /// Get a usable access token, refreshing only if the stored one expired.
    pub async fn get_valid_access_token(&self, provider: Provider) -> Result<String, AppError> {
        let credential = self
            .db
            .get_credential(provider.as_str())?
            .ok_or_else(|| AppError::NotConnected(provider.to_string()))?;

        if !credential.needs_refresh(Utc::now()) {
            if let Some(token) = credential.access_token {
                return Ok(token);
            }
        }

        tracing::info!(provider = %provider, "Access token expired, refreshing");
        let refreshed = self.refresh_credential(provider, credential).await?;
        refreshed
            .access_token
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("Refresh produced no access token")))
    }

    /// Refresh regardless of the stored expiry. Returns the new (adjusted)
    /// expiry.
    pub async fn force_refresh(&self, provider: Provider) -> Result<DateTime<Utc>, ForceRefreshError> {
        let credential = self
            .db
            .get_credential(provider.as_str())?
            .ok_or(ForceRefreshError::NotConnected)?;

        let refreshed = self.refresh_credential(provider, credential).await?;
        refreshed
            .expiry_at
            .ok_or_else(|| ForceRefreshError::Provider("Refresh produced no expiry".to_string()))
    }

    /// Run an authenticated provider call. If the provider rejects the token,
    /// force one refresh and retry once; a second rejection propagates.
    pub async fn call_with_token<T, F, Fut>(&self, provider: Provider, call: F) -> Result<T, AppError>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<T, AppError>>,
    {
        let token = self.get_valid_access_token(provider).await?;
        match call(token).await {
            Err(e) if e.is_token_error() => {
                tracing::info!(provider = %provider, "Access token rejected, forcing refresh");
                let credential = self
                    .db
                    .get_credential(provider.as_str())?
                    .ok_or_else(|| AppError::NotConnected(provider.to_string()))?;
                let refreshed = self.refresh_credential(provider, credential).await?;
                let token = refreshed.access_token.ok_or_else(|| {
                    AppError::Internal(anyhow::anyhow!("Refresh produced no access token"))
                })?;
                call(token).await
            }
            other => other,
        }
    }

    /// Exchange the refresh token and persist the result.
    async fn refresh_credential(
        &self,
        provider: Provider,
        credential: Credential,
    ) -> Result<Credential, ForceRefreshError> {
        let settings = self.providers.get(provider);
        let refresh_token = credential
            .refresh_token
            .clone()
            .ok_or(ForceRefreshError::MissingRefreshToken)?;
        let client_id = settings
            .client_id
            .as_deref()
            .ok_or(ForceRefreshError::MissingClientCredentials)?;

        let mut form = vec![
            ("grant_type", "refresh_token".to_string()),
            ("refresh_token", refresh_token.clone()),
        ];

        let mut request = self.http.post(&settings.token_url);
        match (settings.refresh_auth, settings.client_secret.as_deref()) {
            (ClientAuth::Basic, Some(secret)) => {
                request = request.basic_auth(client_id, Some(secret));
            }
            // PKCE public clients refresh with the client id alone.
            (ClientAuth::Basic, None) if settings.uses_pkce => {
                form.push(("client_id", client_id.to_string()));
            }
            (ClientAuth::Body, Some(secret)) => {
                form.push(("client_id", client_id.to_string()));
                form.push(("client_secret", secret.to_string()));
            }
            _ => return Err(ForceRefreshError::MissingClientCredentials),
        }

        let response = request
            .form(&form)
            .send()
            .await
            .map_err(|e| ForceRefreshError::Provider(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(provider = %provider, status = %status, "Token refresh failed");
            return Err(match status.as_u16() {
                400 | 401 => ForceRefreshError::Rejected(format!("HTTP {}: {}", status, body)),
                _ => ForceRefreshError::Provider(format!("HTTP {}: {}", status, body)),
            });
        }

        let tokens: TokenResponse = response
            .json()
            .await
            .map_err(|e| ForceRefreshError::Provider(format!("JSON parse error: {}", e)))?;

        let refresh_token = match settings.rotation {
            RefreshRotation::Rotating => tokens.refresh_token.clone().unwrap_or(refresh_token),
            RefreshRotation::Retained => refresh_token,
        };

        let updated = Credential {
            name: provider.as_str().to_string(),
            access_token: Some(tokens.access_token.clone()),
            refresh_token: Some(refresh_token),
            expiry_at: Some(tokens.adjusted_expiry(Utc::now())),
        };
        self.db.upsert_credential(&updated)?;

        tracing::info!(provider = %provider, "Token refreshed and stored");
        Ok(updated)
    }

    // ─── Code Exchange ───────────────────────────────────────────────────────

    /// Exchange an authorization code and store the resulting credential.
    ///
    /// PKCE providers send the verifier; the others authenticate with the
    /// client secret. Codes are single-use, so failures are never retried.
    pub async fn exchange_code(
        &self,
        provider: Provider,
        code: &str,
        code_verifier: Option<&str>,
    ) -> Result<Credential, AppError> {
        let settings = self.providers.get(provider);
        let missing = |what: &str| AppError::Internal(anyhow::anyhow!("{} not configured", what));
        let client_id = settings.client_id.as_deref().ok_or_else(|| missing("client id"))?;
        let callback_url = settings
            .callback_url
            .as_deref()
            .ok_or_else(|| missing("callback URL"))?;

        let mut form = vec![
            ("grant_type", "authorization_code".to_string()),
            ("code", code.to_string()),
            ("redirect_uri", callback_url.to_string()),
            ("client_id", client_id.to_string()),
        ];
        if settings.uses_pkce {
            let verifier = code_verifier
                .ok_or_else(|| AppError::BadRequest("Missing PKCE verifier".to_string()))?;
            form.push(("code_verifier", verifier.to_string()));
        } else {
            let secret = settings
                .client_secret
                .as_deref()
                .ok_or_else(|| missing("client secret"))?;
            form.push(("client_secret", secret.to_string()));
        }

        let response = self
            .http
            .post(&settings.token_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| AppError::ProviderApi(format!("Token exchange failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(provider = %provider, status = %status, body = %body, "Token exchange failed");
            return Err(AppError::ProviderApi(format!(
                "Token exchange failed with status {}",
                status
            )));
        }

        let tokens: TokenResponse = response.json().await.map_err(|e| {
            AppError::ProviderApi(format!("Failed to parse token response: {}", e))
        })?;

        let credential = Credential {
            name: provider.as_str().to_string(),
            access_token: Some(tokens.access_token.clone()),
            refresh_token: tokens.refresh_token.clone(),
            expiry_at: Some(tokens.adjusted_expiry(Utc::now())),
        };
        self.db.upsert_credential(&credential)?;

        tracing::info!(provider = %provider, "Authorization code exchanged, credential stored");
        Ok(credential)
    }

    // ─── Status ──────────────────────────────────────────────────────────────

    pub fn status(&self, provider: Provider) -> TokenStatus {
        match self.db.get_credential(provider.as_str()) {
            Ok(Some(credential)) => TokenStatus {
                is_connected: credential.access_token.is_some()
                    || credential.refresh_token.is_some(),
                expires_at: credential.expiry_at.map(format_utc_rfc3339),
                error: None,
            },
            Ok(None) => TokenStatus {
                is_connected: false,
                expires_at: None,
                error: None,
            },
            Err(e) => TokenStatus {
                is_connected: false,
                expires_at: None,
                error: Some(e.to_string()),
            },
        }
    }
}
