// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Feedkeeper: keeps local copies of a Spotify listening history and a
//! Strava activity feed in sync with their providers.
//!
//! This crate provides the OAuth token lifecycle for both providers, the
//! Strava webhook protocol, the scheduled Spotify sync, bulk history import,
//! and the read-through metadata cache behind the history API.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use db::SqliteDb;
use services::{
    CacheInvalidator, HistoryImporter, HistoryReader, OAuthCoordinator, ProviderRegistry,
    SpotifyClient, StravaClient, SubscriptionManager, SyncEngine, TokenManager, WebhookProcessor,
};

/// Outbound provider endpoints. Tests swap in mock server URLs.
#[derive(Clone)]
pub struct ProviderClients {
    pub providers: ProviderRegistry,
    pub spotify: SpotifyClient,
    pub strava: StravaClient,
    pub invalidator: CacheInvalidator,
}

impl ProviderClients {
    pub fn from_config(config: &Config) -> Self {
        Self {
            providers: ProviderRegistry::from_config(config),
            spotify: SpotifyClient::new(),
            strava: StravaClient::new(),
            invalidator: CacheInvalidator::from_config(config),
        }
    }
}

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub db: SqliteDb,
    pub tokens: TokenManager,
    pub oauth: OAuthCoordinator,
    pub subscriptions: SubscriptionManager,
    pub webhooks: WebhookProcessor,
    pub sync: SyncEngine,
    pub importer: HistoryImporter,
    pub history: HistoryReader,
}

impl AppState {
    pub fn new(config: Config, db: SqliteDb, clients: ProviderClients) -> Self {
        let tokens = TokenManager::new(db.clone(), clients.providers);
        let subscriptions = SubscriptionManager::new(&config, clients.strava.clone());

        Self {
            oauth: OAuthCoordinator::new(db.clone(), tokens.clone()),
            webhooks: WebhookProcessor::new(
                db.clone(),
                tokens.clone(),
                clients.strava,
                subscriptions.clone(),
                clients.invalidator.clone(),
            ),
            sync: SyncEngine::new(
                db.clone(),
                tokens.clone(),
                clients.spotify.clone(),
                clients.invalidator.clone(),
            ),
            importer: HistoryImporter::new(
                db.clone(),
                tokens.clone(),
                clients.spotify.clone(),
                clients.invalidator,
                config.rate_limit_retry_delay,
            ),
            history: HistoryReader::new(
                db.clone(),
                tokens.clone(),
                clients.spotify,
                config.rate_limit_retry_delay,
            ),
            subscriptions,
            tokens,
            db,
            config,
        }
    }
}
