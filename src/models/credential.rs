// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! OAuth credential and handshake state records.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Stored OAuth credential, one row per provider.
///
/// `expiry_at` already has the refresh margin subtracted, so a token is
/// usable exactly while `now < expiry_at`.
#[derive(Debug, Clone, PartialEq)]
pub struct Credential {
    /// Provider key ("spotify", "strava")
    pub name: String,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub expiry_at: Option<DateTime<Utc>>,
}

impl Credential {
    /// Whether the access token must be refreshed before use.
    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        match (&self.access_token, self.expiry_at) {
            (Some(_), Some(expiry_at)) => expiry_at <= now,
            _ => true,
        }
    }
}

/// Short-lived OAuth handshake row, consumed at most once.
#[derive(Debug, Clone, PartialEq)]
pub struct HandshakeState {
    pub state: String,
    pub provider: String,
    /// PKCE verifier, only for providers that use PKCE
    pub code_verifier: Option<String>,
    pub expires_at: DateTime<Utc>,
}

/// Read-only connection status for a provider.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenStatus {
    pub is_connected: bool,
    pub expires_at: Option<String>,
    pub error: Option<String>,
}
