// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Strava webhook event validation and application.
//!
//! Events pass three gates in order:
//! 1. Structure: bodies that do not look like an event at all are ignored,
//!    bodies that look like one but fail to parse are rejected.
//! 2. Authenticity: the subscription id must be registered with Strava
//!    right now (checked live on every event).
//! 3. Application: idempotent per aspect, keyed by the activity id.

use crate::db::SqliteDb;
use crate::error::AppError;
use crate::models::ActivityRecord;
use crate::services::cache::{CacheInvalidator, STRAVA_TAG};
use crate::services::providers::Provider;
use crate::services::strava::StravaClient;
use crate::services::subscriptions::{SubscriptionError, SubscriptionManager};
use crate::services::tokens::TokenManager;
use crate::time_utils::parse_utc_rfc3339;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};

/// Updates arriving within this window of the last refresh are skipped.
pub const UPDATE_COOLDOWN_SECS: i64 = 60;

/// Keys whose presence makes a body "look like" a Strava event.
const EVENT_MARKER_KEYS: [&str; 3] = ["object_type", "aspect_type", "subscription_id"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectType {
    Activity,
    Athlete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AspectType {
    Create,
    Update,
    Delete,
}

/// Strava webhook event payload.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    pub object_type: ObjectType,
    pub object_id: u64,
    pub aspect_type: AspectType,
    pub subscription_id: u64,
    #[serde(default)]
    pub owner_id: Option<u64>,
    #[serde(default)]
    pub event_time: Option<i64>,
    #[serde(default)]
    pub updates: Option<Value>,
}

/// Result of the structural check.
#[derive(Debug)]
pub enum Classified {
    /// Not shaped like an event; acknowledge and do nothing.
    NotAnEvent,
    /// Shaped like an event but malformed.
    Invalid(String),
    Event(WebhookEvent),
}

/// Structural check on a raw request body.
pub fn classify(body: &[u8]) -> Classified {
    let Ok(value) = serde_json::from_slice::<Value>(body) else {
        return Classified::NotAnEvent;
    };
    let Some(object) = value.as_object() else {
        return Classified::NotAnEvent;
    };
    if !EVENT_MARKER_KEYS.iter().all(|k| object.contains_key(*k)) {
        return Classified::NotAnEvent;
    }

    match serde_json::from_value::<WebhookEvent>(value) {
        Ok(event) => Classified::Event(event),
        Err(e) => Classified::Invalid(e.to_string()),
    }
}

/// What applying an event did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    Upserted,
    /// Update within the cooldown window; nothing fetched.
    CooledDown,
    Deleted,
    /// Delete for an id we never stored.
    AlreadyAbsent,
    /// Authenticated but nothing to do (athlete events).
    Ignored,
}

#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("Unrecognized subscription")]
    UnknownSubscription,

    #[error("Could not verify subscription: {0}")]
    SubscriptionCheck(#[from] SubscriptionError),

    #[error("Activity fetch failed: {0}")]
    Fetch(AppError),

    #[error(transparent)]
    Storage(#[from] AppError),
}

/// Applies authenticated Strava events to the activity table.
#[derive(Clone)]
pub struct WebhookProcessor {
    db: SqliteDb,
    tokens: TokenManager,
    strava: StravaClient,
    subscriptions: SubscriptionManager,
    invalidator: CacheInvalidator,
}

impl WebhookProcessor {
    pub fn new(
        db: SqliteDb,
        tokens: TokenManager,
        strava: StravaClient,
        subscriptions: SubscriptionManager,
        invalidator: CacheInvalidator,
    ) -> Self {
        Self {
            db,
            tokens,
            strava,
            subscriptions,
            invalidator,
        }
    }

    pub async fn process(&self, event: &WebhookEvent) -> Result<EventOutcome, WebhookError> {
        self.process_at(event, Utc::now()).await
    }

    /// Authenticate and apply an event as of `now`.
    pub async fn process_at(
        &self,
        event: &WebhookEvent,
        now: DateTime<Utc>,
    ) -> Result<EventOutcome, WebhookError> {
        if !self.subscriptions.is_registered(event.subscription_id).await? {
            // The id itself stays out of the logs.
            tracing::warn!("Security Alert: webhook event for unrecognized subscription");
            return Err(WebhookError::UnknownSubscription);
        }

        tracing::info!(
            object_type = ?event.object_type,
            aspect_type = ?event.aspect_type,
            object_id = event.object_id,
            "Webhook event authenticated"
        );

        let outcome = match (event.object_type, event.aspect_type) {
            (ObjectType::Athlete, _) => EventOutcome::Ignored,
            (ObjectType::Activity, AspectType::Create) => {
                self.fetch_and_store(event.object_id, now).await?
            }
            (ObjectType::Activity, AspectType::Update) => {
                match self.db.get_activity(event.object_id)? {
                    Some(existing)
                        if now - existing.last_update
                            < Duration::seconds(UPDATE_COOLDOWN_SECS) =>
                    {
                        tracing::debug!(
                            activity_id = event.object_id,
                            "Update within cooldown, skipping fetch"
                        );
                        EventOutcome::CooledDown
                    }
                    _ => self.fetch_and_store(event.object_id, now).await?,
                }
            }
            (ObjectType::Activity, AspectType::Delete) => {
                if self.db.delete_activity(event.object_id)? {
                    tracing::info!(activity_id = event.object_id, "Activity deleted");
                    EventOutcome::Deleted
                } else {
                    EventOutcome::AlreadyAbsent
                }
            }
        };

        if matches!(outcome, EventOutcome::Upserted | EventOutcome::Deleted) {
            self.invalidator.invalidate(STRAVA_TAG).await;
        }
        Ok(outcome)
    }

    async fn fetch_and_store(
        &self,
        activity_id: u64,
        now: DateTime<Utc>,
    ) -> Result<EventOutcome, WebhookError> {
        let strava = &self.strava;
        let raw = self
            .tokens
            .call_with_token(Provider::Strava, |token| async move {
                strava.get_activity(&token, activity_id).await
            })
            .await
            .map_err(|e| {
                tracing::error!(activity_id, error = %e, "Failed to fetch activity");
                WebhookError::Fetch(e)
            })?;

        let activity_start_date = raw
            .get("start_date")
            .and_then(Value::as_str)
            .and_then(parse_utc_rfc3339)
            .unwrap_or(now);

        self.db.upsert_activity(&ActivityRecord {
            id: activity_id,
            activity_start_date,
            activity_data: normalize_keys(raw),
            last_update: now,
        })?;

        tracing::info!(activity_id, "Activity stored");
        Ok(EventOutcome::Upserted)
    }
}

/// Rename every object key from snake_case to camelCase, recursively.
pub fn normalize_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (snake_to_camel(&k), normalize_keys(v)))
                .collect::<Map<_, _>>(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(normalize_keys).collect()),
        other => other,
    }
}

fn snake_to_camel(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut upper_next = false;
    for (i, c) in key.chars().enumerate() {
        if c == '_' && i > 0 {
            upper_next = true;
        } else if upper_next {
            out.extend(c.to_uppercase());
            upper_next = false;
        } else {
            out.push(c);
        }
    }
    out
}
