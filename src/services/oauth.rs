// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! OAuth handshake coordination: starting flows and redeeming callbacks.
//!
//! Each flow is tied to a random single-use state row (and, for PKCE
//! providers, the code verifier) with a 10 minute lifetime.

use crate::db::SqliteDb;
use crate::error::AppError;
use crate::models::HandshakeState;
use crate::services::providers::Provider;
use crate::services::tokens::TokenManager;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{Duration, Utc};
use ring::rand::{SecureRandom, SystemRandom};
use sha2::{Digest, Sha256};

/// Lifetime of a handshake state row.
pub const STATE_TTL_MINUTES: i64 = 10;

/// Random bytes behind each state value and PKCE verifier.
const RANDOM_BYTES: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum OAuthInitError {
    #[error("Unknown provider: {0}")]
    InvalidProvider(String),

    #[error("No callback URL configured for {0}")]
    MissingCallbackUrl(Provider),

    #[error("No client id configured for {0}")]
    MissingClientId(Provider),

    #[error("Failed to start handshake: {0}")]
    Internal(String),
}

impl OAuthInitError {
    pub fn code(&self) -> &'static str {
        match self {
            OAuthInitError::InvalidProvider(_) => "invalid-provider",
            OAuthInitError::MissingCallbackUrl(_) => "missing-callback-url",
            OAuthInitError::MissingClientId(_) => "missing-client-id",
            OAuthInitError::Internal(_) => "error",
        }
    }
}

impl From<AppError> for OAuthInitError {
    fn from(err: AppError) -> Self {
        OAuthInitError::Internal(err.to_string())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum OAuthCallbackError {
    #[error("Callback is missing the authorization code")]
    MissingCode,

    #[error("Callback is missing the state parameter")]
    MissingState,

    #[error("State is unknown, expired, or already used")]
    InvalidState,

    #[error("State row names an unknown provider")]
    UnknownProvider,

    /// Exchange and storage failures; the code is not retried.
    #[error("Authorization failed: {0}")]
    Failed(String),
}

impl OAuthCallbackError {
    pub fn code(&self) -> &'static str {
        match self {
            OAuthCallbackError::MissingCode => "missing-code",
            OAuthCallbackError::MissingState => "missing-state",
            OAuthCallbackError::InvalidState => "invalid-state",
            OAuthCallbackError::UnknownProvider => "unknown-provider",
            OAuthCallbackError::Failed(_) => "error",
        }
    }
}

#[derive(Clone)]
pub struct OAuthCoordinator {
    db: SqliteDb,
    tokens: TokenManager,
    rng: SystemRandom,
}

impl OAuthCoordinator {
    pub fn new(db: SqliteDb, tokens: TokenManager) -> Self {
        Self {
            db,
            tokens,
            rng: SystemRandom::new(),
        }
    }

    /// Start a flow and return the provider authorize URL to redirect to.
    pub fn initiate(&self, provider: &str) -> Result<String, OAuthInitError> {
        let provider: Provider = provider
            .parse()
            .map_err(|_| OAuthInitError::InvalidProvider(provider.to_string()))?;
        let settings = self.tokens.settings(provider);
        let callback_url = settings
            .callback_url
            .as_deref()
            .ok_or(OAuthInitError::MissingCallbackUrl(provider))?;
        let client_id = settings
            .client_id
            .as_deref()
            .ok_or(OAuthInitError::MissingClientId(provider))?;

        let now = Utc::now();
        let purged = self.db.purge_expired_states(now)?;
        if purged > 0 {
            tracing::debug!(purged, "Removed expired handshake states");
        }

        let state = hex::encode(self.random_bytes()?);
        let code_verifier = if settings.uses_pkce {
            Some(URL_SAFE_NO_PAD.encode(self.random_bytes()?))
        } else {
            None
        };
        let code_challenge = code_verifier.as_deref().map(pkce_challenge);

        self.db.insert_state(&HandshakeState {
            state: state.clone(),
            provider: provider.as_str().to_string(),
            code_verifier,
            expires_at: now + Duration::minutes(STATE_TTL_MINUTES),
        })?;

        tracing::info!(provider = %provider, "Starting OAuth handshake");
        Ok(settings.build_authorize_url(client_id, callback_url, &state, code_challenge.as_deref()))
    }

    /// Redeem a callback. The state row is consumed before the exchange, so
    /// replaying a callback always fails with `invalid-state`.
    pub async fn complete(
        &self,
        code: Option<&str>,
        state: Option<&str>,
    ) -> Result<Provider, OAuthCallbackError> {
        let code = code
            .filter(|c| !c.is_empty())
            .ok_or(OAuthCallbackError::MissingCode)?;
        let state = state
            .filter(|s| !s.is_empty())
            .ok_or(OAuthCallbackError::MissingState)?;

        let row = self
            .db
            .take_state(state, Utc::now())
            .map_err(|e| OAuthCallbackError::Failed(e.to_string()))?
            .ok_or(OAuthCallbackError::InvalidState)?;

        let provider: Provider = row
            .provider
            .parse()
            .map_err(|_| OAuthCallbackError::UnknownProvider)?;

        self.tokens
            .exchange_code(provider, code, row.code_verifier.as_deref())
            .await
            .map_err(|e| {
                tracing::error!(provider = %provider, error = %e, "Code exchange failed");
                OAuthCallbackError::Failed(e.to_string())
            })?;

        tracing::info!(provider = %provider, "Provider connected");
        Ok(provider)
    }

    fn random_bytes(&self) -> Result<[u8; RANDOM_BYTES], OAuthInitError> {
        let mut bytes = [0u8; RANDOM_BYTES];
        self.rng
            .fill(&mut bytes)
            .map_err(|_| OAuthInitError::Internal("System RNG failure".to_string()))?;
        Ok(bytes)
    }
}

/// S256 challenge for a PKCE verifier.
pub fn pkce_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::services::providers::ProviderRegistry;

    fn coordinator(config: &Config) -> (OAuthCoordinator, SqliteDb) {
        let db = SqliteDb::open_in_memory().unwrap();
        let tokens = TokenManager::new(db.clone(), ProviderRegistry::from_config(config));
        (OAuthCoordinator::new(db.clone(), tokens), db)
    }

    fn query_param(url: &str, name: &str) -> Option<String> {
        url.split_once('?')?
            .1
            .split('&')
            .filter_map(|pair| pair.split_once('='))
            .find(|(k, _)| *k == name)
            .map(|(_, v)| urlencoding::decode(v).unwrap().into_owned())
    }

    #[test]
    fn test_pkce_challenge_matches_rfc7636_vector() {
        assert_eq!(
            pkce_challenge("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk"),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[test]
    fn test_spotify_initiate_persists_verifier_for_challenge() {
        let (oauth, db) = coordinator(&Config::test_default());

        let url = oauth.initiate("spotify").unwrap();
        let state = query_param(&url, "state").unwrap();
        let challenge = query_param(&url, "code_challenge").unwrap();

        assert_eq!(state.len(), RANDOM_BYTES * 2);
        let row = db.take_state(&state, Utc::now()).unwrap().unwrap();
        assert_eq!(row.provider, "spotify");
        assert_eq!(pkce_challenge(row.code_verifier.as_deref().unwrap()), challenge);
        assert!(row.expires_at <= Utc::now() + Duration::minutes(STATE_TTL_MINUTES));
    }

    #[test]
    fn test_strava_initiate_has_no_verifier() {
        let (oauth, db) = coordinator(&Config::test_default());

        let url = oauth.initiate("strava").unwrap();
        let state = query_param(&url, "state").unwrap();

        assert!(query_param(&url, "code_challenge").is_none());
        assert!(db.take_state(&state, Utc::now()).unwrap().unwrap().code_verifier.is_none());
    }

    #[test]
    fn test_initiate_reports_configuration_gaps() {
        let mut config = Config::test_default();
        config.spotify_callback_url = None;
        config.strava_client_id = None;
        let (oauth, _) = coordinator(&config);

        assert_eq!(oauth.initiate("lastfm").unwrap_err().code(), "invalid-provider");
        assert_eq!(oauth.initiate("spotify").unwrap_err().code(), "missing-callback-url");
        assert_eq!(oauth.initiate("strava").unwrap_err().code(), "missing-client-id");
    }

    #[tokio::test]
    async fn test_complete_validates_before_exchanging() {
        let (oauth, db) = coordinator(&Config::test_default());

        assert_eq!(
            oauth.complete(None, Some("s")).await.unwrap_err().code(),
            "missing-code"
        );
        assert_eq!(
            oauth.complete(Some("c"), None).await.unwrap_err().code(),
            "missing-state"
        );
        assert_eq!(
            oauth.complete(Some("c"), Some("nope")).await.unwrap_err().code(),
            "invalid-state"
        );

        db.insert_state(&HandshakeState {
            state: "alien".to_string(),
            provider: "myspace".to_string(),
            code_verifier: None,
            expires_at: Utc::now() + Duration::minutes(5),
        })
        .unwrap();
        assert_eq!(
            oauth.complete(Some("c"), Some("alien")).await.unwrap_err().code(),
            "unknown-provider"
        );
    }
}
