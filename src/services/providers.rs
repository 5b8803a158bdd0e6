// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! OAuth provider configurations.
//!
//! The two providers differ in how they authenticate token requests and in
//! whether a refresh returns a new refresh token. Those differences are
//! captured as data here so a single exchange/refresh routine serves both.

use crate::config::Config;
use std::fmt;
use std::str::FromStr;

/// Supported OAuth providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    Spotify,
    Strava,
}

impl Provider {
    /// Stable key used for credential rows and URLs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Spotify => "spotify",
            Provider::Strava => "strava",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "spotify" => Ok(Provider::Spotify),
            "strava" => Ok(Provider::Strava),
            _ => Err(()),
        }
    }
}

/// How client credentials accompany a token request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientAuth {
    /// `Authorization: Basic base64(client_id:client_secret)`
    Basic,
    /// `client_id` and `client_secret` form fields
    Body,
}

/// Whether a refresh response carries a replacement refresh token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshRotation {
    /// Each refresh issues a new refresh token that supersedes the old one.
    Rotating,
    /// The original refresh token stays valid and must be kept.
    Retained,
}

/// Everything needed to run OAuth against one provider.
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub provider: Provider,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub callback_url: Option<String>,
    pub authorize_url: String,
    pub token_url: String,
    pub scopes: &'static [&'static str],
    /// Scope separator in the authorize URL
    pub scope_separator: &'static str,
    /// Bind the code to the requester with PKCE instead of the client secret
    pub uses_pkce: bool,
    pub refresh_auth: ClientAuth,
    pub rotation: RefreshRotation,
}

impl ProviderSettings {
    pub fn spotify(config: &Config) -> Self {
        Self {
            provider: Provider::Spotify,
            client_id: config.spotify_client_id.clone(),
            client_secret: config.spotify_client_secret.clone(),
            callback_url: config.spotify_callback_url.clone(),
            authorize_url: "https://accounts.spotify.com/authorize".to_string(),
            token_url: "https://accounts.spotify.com/api/token".to_string(),
            scopes: &["user-read-recently-played", "user-read-currently-playing"],
            scope_separator: " ",
            uses_pkce: true,
            refresh_auth: ClientAuth::Basic,
            rotation: RefreshRotation::Retained,
        }
    }

    pub fn strava(config: &Config) -> Self {
        Self {
            provider: Provider::Strava,
            client_id: config.strava_client_id.clone(),
            client_secret: config.strava_client_secret.clone(),
            callback_url: config.strava_callback_url.clone(),
            authorize_url: "https://www.strava.com/oauth/authorize".to_string(),
            token_url: "https://www.strava.com/oauth/token".to_string(),
            scopes: &["read", "activity:read_all"],
            scope_separator: ",",
            uses_pkce: false,
            refresh_auth: ClientAuth::Body,
            rotation: RefreshRotation::Rotating,
        }
    }

    /// Point the token endpoint somewhere else (mock servers in tests).
    pub fn with_token_url(mut self, token_url: impl Into<String>) -> Self {
        self.token_url = token_url.into();
        self
    }

    /// Build the authorize redirect URL.
    pub fn build_authorize_url(
        &self,
        client_id: &str,
        callback_url: &str,
        state: &str,
        code_challenge: Option<&str>,
    ) -> String {
        let scopes = self.scopes.join(self.scope_separator);
        let mut url = format!(
            "{}?client_id={}&response_type=code&redirect_uri={}&scope={}&state={}",
            self.authorize_url,
            urlencoding::encode(client_id),
            urlencoding::encode(callback_url),
            urlencoding::encode(&scopes),
            urlencoding::encode(state)
        );
        if let Some(challenge) = code_challenge {
            url.push_str("&code_challenge_method=S256&code_challenge=");
            url.push_str(&urlencoding::encode(challenge));
        }
        if self.provider == Provider::Strava {
            url.push_str("&approval_prompt=auto");
        }
        url
    }
}

/// Settings for both providers, built once from configuration.
#[derive(Debug, Clone)]
pub struct ProviderRegistry {
    pub spotify: ProviderSettings,
    pub strava: ProviderSettings,
}

impl ProviderRegistry {
    pub fn from_config(config: &Config) -> Self {
        Self {
            spotify: ProviderSettings::spotify(config),
            strava: ProviderSettings::strava(config),
        }
    }

    pub fn get(&self, provider: Provider) -> &ProviderSettings {
        match provider {
            Provider::Spotify => &self.spotify,
            Provider::Strava => &self.strava,
        }
    }
}
