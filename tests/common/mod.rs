// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use axum::body::Body;
use axum::http::{Request, Response};
use chrono::{DateTime, Duration, Utc};
use feedkeeper::config::Config;
use feedkeeper::db::SqliteDb;
use feedkeeper::models::{Credential, PlayRecord};
use feedkeeper::routes::create_router;
use feedkeeper::services::{
    CacheInvalidator, ProviderRegistry, SpotifyClient, StravaClient,
};
use feedkeeper::time_utils::parse_utc_rfc3339;
use feedkeeper::{AppState, ProviderClients};
use mockito::ServerGuard;
use std::sync::Arc;

/// Bearer header accepted by both the cron and admin routes.
#[allow(dead_code)]
pub const AUTH: &str = "Bearer test_cron_secret";

/// Spotify token endpoint path on the mock server.
#[allow(dead_code)]
pub const SPOTIFY_TOKEN_PATH: &str = "/spotify/token";
/// Strava token endpoint path on the mock server.
#[allow(dead_code)]
pub const STRAVA_TOKEN_PATH: &str = "/strava/oauth/token";

/// A router wired to a single mock server standing in for both providers.
///
/// Spotify API calls land at the server root, Strava API calls under
/// `/strava`.
pub struct TestApp {
    pub router: axum::Router,
    pub state: Arc<AppState>,
    pub server: ServerGuard,
}

#[allow(dead_code)]
pub async fn create_test_app() -> TestApp {
    create_test_app_with(Config::test_default()).await
}

pub async fn create_test_app_with(config: Config) -> TestApp {
    let server = mockito::Server::new_async().await;
    let url = server.url();

    let mut providers = ProviderRegistry::from_config(&config);
    providers.spotify = providers
        .spotify
        .with_token_url(format!("{}{}", url, SPOTIFY_TOKEN_PATH));
    providers.strava = providers
        .strava
        .with_token_url(format!("{}{}", url, STRAVA_TOKEN_PATH));

    let clients = ProviderClients {
        providers,
        spotify: SpotifyClient::with_base_url(url.clone()),
        strava: StravaClient::with_base_url(format!("{}/strava", url)),
        invalidator: CacheInvalidator::disabled(),
    };

    let db = SqliteDb::open_in_memory().expect("in-memory database");
    let state = Arc::new(AppState::new(config, db, clients));

    TestApp {
        router: create_router(state.clone()),
        state,
        server,
    }
}

/// Store a credential whose access token expires `expires_in` from now.
#[allow(dead_code)]
pub fn seed_credential(db: &SqliteDb, provider: &str, expires_in: Duration) {
    db.upsert_credential(&Credential {
        name: provider.to_string(),
        access_token: Some(format!("{}_access", provider)),
        refresh_token: Some(format!("{}_refresh", provider)),
        expiry_at: Some(Utc::now() + expires_in),
    })
    .expect("seed credential");
}

#[allow(dead_code)]
pub fn seed_play(db: &SqliteDb, played_at: &str, track_id: &str) {
    db.insert_play(&PlayRecord {
        played_at: ts(played_at),
        track_id: track_id.to_string(),
        album_id: format!("album-{}", track_id),
        artist_ids: vec![format!("artist-{}", track_id)],
    })
    .expect("seed play");
}

#[allow(dead_code)]
pub fn ts(raw: &str) -> DateTime<Utc> {
    parse_utc_rfc3339(raw).expect("valid timestamp")
}

/// Minimal Spotify track object.
#[allow(dead_code)]
pub fn track_json(id: &str) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "name": format!("Song {}", id),
        "external_urls": {"spotify": format!("https://open.spotify.com/track/{}", id)},
        "album": {
            "id": format!("album-{}", id),
            "name": format!("Album {}", id),
            "images": [{"url": format!("https://img/{}", id)}]
        },
        "artists": [{"id": format!("artist-{}", id), "name": "Artist"}]
    })
}

#[allow(dead_code)]
pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[allow(dead_code)]
pub fn authed(method: &str, uri: &str, body: Body) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", AUTH)
        .header("content-type", "application/json")
        .body(body)
        .unwrap()
}

#[allow(dead_code)]
pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
