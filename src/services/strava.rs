// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Strava API client for activities and push subscriptions.
//!
//! Handles:
//! - Activity fetching (raw JSON, normalized by the webhook processor)
//! - Push subscription create/list/delete with app credentials
//! - Rate limit and token error detection

use crate::error::AppError;
use crate::services::http::{check_response_json, transport_error};
use serde::Deserialize;

const PROVIDER: &str = "strava";

/// Strava API client.
#[derive(Clone)]
pub struct StravaClient {
    http: reqwest::Client,
    base_url: String,
}

impl Default for StravaClient {
    fn default() -> Self {
        Self::new()
    }
}

impl StravaClient {
    pub fn new() -> Self {
        Self::with_base_url("https://www.strava.com/api/v3")
    }

    /// Point the client at another host (mock servers in tests).
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    /// Get a detailed activity by ID, as Strava sent it.
    pub async fn get_activity(
        &self,
        access_token: &str,
        activity_id: u64,
    ) -> Result<serde_json::Value, AppError> {
        let response = self
            .http
            .get(format!("{}/activities/{}", self.base_url, activity_id))
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(transport_error)?;

        check_response_json(PROVIDER, response).await
    }

    // ─── Push Subscriptions ──────────────────────────────────────────────────
    //
    // These authenticate with the application's client id and secret, not a
    // user token. Failures keep the raw status and body so the subscription
    // manager can classify them.

    /// Register a callback URL. Strava calls the callback with a challenge
    /// before answering this request.
    pub async fn create_push_subscription(
        &self,
        app: &AppCredentials<'_>,
        callback_url: &str,
        verify_token: &str,
    ) -> Result<PushSubscription, PushError> {
        let response = self
            .http
            .post(format!("{}/push_subscriptions", self.base_url))
            .form(&[
                ("client_id", app.client_id),
                ("client_secret", app.client_secret),
                ("callback_url", callback_url),
                ("verify_token", verify_token),
            ])
            .send()
            .await
            .map_err(|e| PushError::Transport(e.to_string()))?;

        parse_push_response(response).await
    }

    pub async fn list_push_subscriptions(
        &self,
        app: &AppCredentials<'_>,
    ) -> Result<Vec<PushSubscription>, PushError> {
        let response = self
            .http
            .get(format!("{}/push_subscriptions", self.base_url))
            .query(&[
                ("client_id", app.client_id),
                ("client_secret", app.client_secret),
            ])
            .send()
            .await
            .map_err(|e| PushError::Transport(e.to_string()))?;

        parse_push_response(response).await
    }

    pub async fn delete_push_subscription(
        &self,
        app: &AppCredentials<'_>,
        id: u64,
    ) -> Result<(), PushError> {
        let response = self
            .http
            .delete(format!("{}/push_subscriptions/{}", self.base_url, id))
            .query(&[
                ("client_id", app.client_id),
                ("client_secret", app.client_secret),
            ])
            .send()
            .await
            .map_err(|e| PushError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        Err(PushError::Status {
            status: status.as_u16(),
            body: response.text().await.unwrap_or_default(),
        })
    }
}

async fn parse_push_response<T: for<'de> Deserialize<'de>>(
    response: reqwest::Response,
) -> Result<T, PushError> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| PushError::Transport(e.to_string()))?;

    if !status.is_success() {
        return Err(PushError::Status {
            status: status.as_u16(),
            body,
        });
    }

    serde_json::from_str(&body).map_err(|e| PushError::Parse(e.to_string()))
}

/// Application credentials for the push subscription endpoints.
#[derive(Debug, Clone, Copy)]
pub struct AppCredentials<'a> {
    pub client_id: &'a str,
    pub client_secret: &'a str,
}

/// A push subscription as Strava reports it.
#[derive(Debug, Clone, Deserialize, serde::Serialize)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct PushSubscription {
    pub id: u64,
    #[serde(default)]
    pub callback_url: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// Raw failure from a push subscription call.
#[derive(Debug, thiserror::Error)]
pub enum PushError {
    #[error("Request failed: {0}")]
    Transport(String),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Unexpected response: {0}")]
    Parse(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    const APP: AppCredentials<'static> = AppCredentials {
        client_id: "cid",
        client_secret: "secret",
    };

    #[tokio::test]
    async fn test_list_push_subscriptions_sends_app_credentials() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/push_subscriptions")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("client_id".into(), "cid".into()),
                Matcher::UrlEncoded("client_secret".into(), "secret".into()),
            ]))
            .with_status(200)
            .with_body(
                r#"[{"id": 120475, "resource_state": 2, "application_id": 1,
                     "callback_url": "https://example.com/webhook/strava",
                     "created_at": "2018-06-05T18:58:47Z"}]"#,
            )
            .create_async()
            .await;
        let client = StravaClient::with_base_url(server.url());

        let subs = client.list_push_subscriptions(&APP).await.unwrap();

        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].id, 120475);
        assert_eq!(
            subs[0].callback_url.as_deref(),
            Some("https://example.com/webhook/strava")
        );
    }

    #[tokio::test]
    async fn test_push_failure_keeps_status_and_body() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/push_subscriptions")
            .with_status(400)
            .with_body(r#"{"errors":[{"code":"already exists"}]}"#)
            .create_async()
            .await;
        let client = StravaClient::with_base_url(server.url());

        let err = client
            .create_push_subscription(&APP, "https://cb", "tok")
            .await
            .unwrap_err();

        match err {
            PushError::Status { status, body } => {
                assert_eq!(status, 400);
                assert!(body.contains("already exists"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_get_activity_returns_raw_json() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/activities/42")
            .match_header("authorization", "Bearer token")
            .with_status(200)
            .with_body(r#"{"id": 42, "sport_type": "Run", "start_date": "2024-05-01T07:00:00Z"}"#)
            .create_async()
            .await;
        let client = StravaClient::with_base_url(server.url());

        let activity = client.get_activity("token", 42).await.unwrap();
        assert_eq!(activity["sport_type"], "Run");
    }
}
