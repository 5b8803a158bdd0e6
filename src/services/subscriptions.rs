// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Strava push subscription management.

use crate::config::Config;
use crate::services::strava::{AppCredentials, PushError, PushSubscription, StravaClient};
use axum::http::StatusCode;

/// Classified failure of a subscription call.
#[derive(Debug, thiserror::Error)]
pub enum SubscriptionError {
    #[error("Missing configuration: {0}")]
    MissingConfiguration(&'static str),

    #[error("A subscription already exists for this application")]
    AlreadySubscribed,

    #[error("Strava could not validate the callback URL: {0}")]
    CallbackUnreachable(String),

    #[error("Strava rejected the application credentials")]
    InvalidCredentials,

    #[error("Strava rejected the request: {0}")]
    ClientError(String),

    #[error("Strava request failed: {0}")]
    ProviderError(String),
}

impl SubscriptionError {
    pub fn code(&self) -> &'static str {
        match self {
            SubscriptionError::MissingConfiguration(_) => "missing-configuration",
            SubscriptionError::AlreadySubscribed => "already-subscribed",
            SubscriptionError::CallbackUnreachable(_) => "callback-unreachable",
            SubscriptionError::InvalidCredentials => "invalid-credentials",
            SubscriptionError::ClientError(_) => "client-error",
            SubscriptionError::ProviderError(_) => "provider-error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            SubscriptionError::MissingConfiguration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            SubscriptionError::AlreadySubscribed => StatusCode::CONFLICT,
            SubscriptionError::CallbackUnreachable(_) | SubscriptionError::ClientError(_) => {
                StatusCode::BAD_REQUEST
            }
            SubscriptionError::InvalidCredentials | SubscriptionError::ProviderError(_) => {
                StatusCode::BAD_GATEWAY
            }
        }
    }

    /// Map a raw Strava failure onto the classes above. Strava reports the
    /// specific cause in the `errors[].code` and `errors[].field` values of
    /// a 400 body, so the body text is inspected.
    fn classify(err: PushError) -> Self {
        match err {
            PushError::Status { status, body } => {
                let lowered = body.to_ascii_lowercase();
                match status {
                    401 | 403 => SubscriptionError::InvalidCredentials,
                    _ if lowered.contains("already exists") => {
                        SubscriptionError::AlreadySubscribed
                    }
                    400..=499 if lowered.contains("callback") => {
                        SubscriptionError::CallbackUnreachable(body)
                    }
                    400..=499 if lowered.contains("client_id") || lowered.contains("client_secret") => {
                        SubscriptionError::InvalidCredentials
                    }
                    400..=499 => SubscriptionError::ClientError(body),
                    _ => SubscriptionError::ProviderError(format!("HTTP {}: {}", status, body)),
                }
            }
            PushError::Transport(msg) | PushError::Parse(msg) => {
                SubscriptionError::ProviderError(msg)
            }
        }
    }
}

/// Administrative CRUD over Strava's push subscriptions. The registered
/// subscription is never stored locally; every check goes to Strava.
#[derive(Clone)]
pub struct SubscriptionManager {
    client: StravaClient,
    client_id: Option<String>,
    client_secret: Option<String>,
    verify_token: Option<String>,
    callback_url: Option<String>,
}

impl SubscriptionManager {
    pub fn new(config: &Config, client: StravaClient) -> Self {
        Self {
            client,
            client_id: config.strava_client_id.clone(),
            client_secret: config.strava_client_secret.clone(),
            verify_token: config.strava_verify_token.clone(),
            callback_url: config.strava_webhook_callback_url.clone(),
        }
    }

    /// Token Strava must echo during the subscription challenge.
    pub fn verify_token(&self) -> Option<&str> {
        self.verify_token.as_deref()
    }

    fn app(&self) -> Result<AppCredentials<'_>, SubscriptionError> {
        Ok(AppCredentials {
            client_id: self
                .client_id
                .as_deref()
                .ok_or(SubscriptionError::MissingConfiguration("STRAVA_CLIENT_ID"))?,
            client_secret: self
                .client_secret
                .as_deref()
                .ok_or(SubscriptionError::MissingConfiguration("STRAVA_CLIENT_SECRET"))?,
        })
    }

    pub async fn create(&self) -> Result<PushSubscription, SubscriptionError> {
        let app = self.app()?;
        let verify_token = self
            .verify_token
            .as_deref()
            .ok_or(SubscriptionError::MissingConfiguration("STRAVA_VERIFY_TOKEN"))?;
        let callback_url = self
            .callback_url
            .as_deref()
            .ok_or(SubscriptionError::MissingConfiguration("STRAVA_WEBHOOK_CALLBACK_URL"))?;

        let subscription = self
            .client
            .create_push_subscription(&app, callback_url, verify_token)
            .await
            .map_err(SubscriptionError::classify)
            .inspect_err(|e| tracing::warn!(code = e.code(), error = %e, "Subscription create failed"))?;

        tracing::info!(subscription_id = subscription.id, "Strava push subscription created");
        Ok(subscription)
    }

    pub async fn list(&self) -> Result<Vec<PushSubscription>, SubscriptionError> {
        let app = self.app()?;
        self.client
            .list_push_subscriptions(&app)
            .await
            .map_err(SubscriptionError::classify)
    }

    /// Delete a subscription. An id Strava no longer knows is treated as
    /// already deleted.
    pub async fn delete(&self, id: u64) -> Result<(), SubscriptionError> {
        let app = self.app()?;
        match self.client.delete_push_subscription(&app, id).await {
            Ok(()) => {
                tracing::info!(subscription_id = id, "Strava push subscription deleted");
                Ok(())
            }
            Err(PushError::Status { status: 404, .. }) => {
                tracing::info!(subscription_id = id, "Subscription already absent");
                Ok(())
            }
            Err(e) => Err(SubscriptionError::classify(e)),
        }
    }

    /// Whether `subscription_id` is currently registered with Strava.
    pub async fn is_registered(&self, subscription_id: u64) -> Result<bool, SubscriptionError> {
        Ok(self
            .list()
            .await?
            .iter()
            .any(|s| s.id == subscription_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;

    fn status(code: u16, body: &str) -> PushError {
        PushError::Status {
            status: code,
            body: body.to_string(),
        }
    }

    #[test]
    fn test_classify_strava_failures() {
        let cases = [
            (
                status(
                    400,
                    r#"{"message":"Bad Request","errors":[{"resource":"PushSubscription","field":"","code":"already exists"}]}"#,
                ),
                "already-subscribed",
            ),
            (
                status(
                    400,
                    r#"{"errors":[{"field":"callback url","code":"GET to callback URL does not return 200"}]}"#,
                ),
                "callback-unreachable",
            ),
            (status(401, r#"{"message":"Authorization Error"}"#), "invalid-credentials"),
            (
                status(400, r#"{"errors":[{"field":"client_id","code":"invalid"}]}"#),
                "invalid-credentials",
            ),
            (status(422, r#"{"message":"nope"}"#), "client-error"),
            (status(503, "unavailable"), "provider-error"),
            (PushError::Transport("connection refused".into()), "provider-error"),
        ];

        for (err, expected) in cases {
            assert_eq!(SubscriptionError::classify(err).code(), expected);
        }
    }

    #[tokio::test]
    async fn test_create_requires_verify_token() {
        let mut config = Config::test_default();
        config.strava_verify_token = None;
        let manager = SubscriptionManager::new(&config, StravaClient::with_base_url("http://127.0.0.1:9"));

        let err = manager.create().await.unwrap_err();
        assert_eq!(err.code(), "missing-configuration");
    }

    #[tokio::test]
    async fn test_delete_unknown_subscription_succeeds() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("DELETE", "/push_subscriptions/7")
            .match_query(mockito::Matcher::Any)
            .with_status(404)
            .create_async()
            .await;
        let manager = SubscriptionManager::new(
            &Config::test_default(),
            StravaClient::with_base_url(server.url()),
        );

        manager.delete(7).await.unwrap();
    }

    #[tokio::test]
    async fn test_is_registered_checks_live_list() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/push_subscriptions")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(r#"[{"id": 5}]"#)
            .expect(2)
            .create_async()
            .await;
        let manager = SubscriptionManager::new(
            &Config::test_default(),
            StravaClient::with_base_url(server.url()),
        );

        assert!(manager.is_registered(5).await.unwrap());
        assert!(!manager.is_registered(6).await.unwrap());
        mock.assert_async().await;
    }
}
