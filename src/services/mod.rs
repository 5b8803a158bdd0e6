// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Service layer modules.

pub mod cache;
pub mod history;
pub mod http;
pub mod import;
pub mod oauth;
pub mod providers;
pub mod spotify;
pub mod strava;
pub mod subscriptions;
pub mod sync;
pub mod tokens;
pub mod webhook;

pub use cache::CacheInvalidator;
pub use history::HistoryReader;
pub use import::HistoryImporter;
pub use oauth::OAuthCoordinator;
pub use providers::{Provider, ProviderRegistry};
pub use spotify::SpotifyClient;
pub use strava::StravaClient;
pub use subscriptions::SubscriptionManager;
pub use sync::SyncEngine;
pub use tokens::TokenManager;
pub use webhook::WebhookProcessor;
