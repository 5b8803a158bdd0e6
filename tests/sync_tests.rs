// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Integration tests for the scheduled Spotify sync.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::Duration;
use common::{authed, body_json, create_test_app, seed_credential, seed_play, track_json};
use serde_json::json;
use tower::ServiceExt;

fn feed(plays: &[(&str, &str)]) -> String {
    let items: Vec<_> = plays
        .iter()
        .map(|(played_at, id)| json!({"track": track_json(id), "played_at": played_at}))
        .collect();
    json!({"items": items, "cursors": null}).to_string()
}

#[tokio::test]
async fn test_sync_requires_cron_secret() {
    let mut app = create_test_app().await;
    let feed_mock = app
        .server
        .mock("GET", "/me/player/recently-played")
        .match_query(mockito::Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    for request in [
        Request::builder().uri("/cron/sync").body(Body::empty()).unwrap(),
        Request::builder()
            .method("POST")
            .uri("/cron/sync")
            .header("authorization", "Bearer wrong")
            .body(Body::empty())
            .unwrap(),
    ] {
        let response = app.router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    feed_mock.assert_async().await;
}

#[tokio::test]
async fn test_empty_ledger_is_skipped() {
    let app = create_test_app().await;

    let response = app
        .router
        .oneshot(authed("GET", "/cron/sync", Body::empty()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await,
        json!({"success": true, "skipped": true, "total": 0})
    );
}

#[tokio::test]
async fn test_second_sync_inserts_nothing() {
    let mut app = create_test_app().await;
    seed_credential(&app.state.db, "spotify", Duration::hours(1));
    seed_play(&app.state.db, "2024-01-01T10:00:00Z", "T0");
    let _feed = app
        .server
        .mock("GET", "/me/player/recently-played")
        .match_query(mockito::Matcher::UrlEncoded("limit".into(), "50".into()))
        .with_status(200)
        .with_body(feed(&[
            ("2024-01-01T10:08:00.000Z", "T2"),
            ("2024-01-01T10:04:00.000Z", "T1"),
            ("2024-01-01T10:00:00.000Z", "T0"),
        ]))
        .create_async()
        .await;

    let response = app
        .router
        .clone()
        .oneshot(authed("POST", "/cron/sync", Body::empty()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await,
        json!({"success": true, "total": 3, "inserted": 2, "skipped": 1, "gapDetected": false})
    );

    let response = app
        .router
        .oneshot(authed("POST", "/cron/sync", Body::empty()))
        .await
        .unwrap();
    let json = body_json(response).await;
    assert_eq!(json["inserted"], 0);
    assert_eq!(json["skipped"], 3);
    assert_eq!(app.state.db.count_plays().unwrap(), 3);
}

#[tokio::test]
async fn test_gap_detected_when_feed_does_not_reach_ledger() {
    let mut app = create_test_app().await;
    seed_credential(&app.state.db, "spotify", Duration::hours(1));
    seed_play(&app.state.db, "2024-01-01T08:00:00Z", "OLD");
    // First page only; the following page is empty.
    let _first = app
        .server
        .mock("GET", "/me/player/recently-played")
        .match_query(mockito::Matcher::Regex("^limit=50$".into()))
        .with_status(200)
        .with_body(feed(&[("2024-01-01T12:00:00.000Z", "NEW")]))
        .create_async()
        .await;
    let _rest = app
        .server
        .mock("GET", "/me/player/recently-played")
        .match_query(mockito::Matcher::Regex("before=".into()))
        .with_status(200)
        .with_body(r#"{"items": []}"#)
        .create_async()
        .await;

    let response = app
        .router
        .oneshot(authed("GET", "/cron/sync", Body::empty()))
        .await
        .unwrap();

    let json = body_json(response).await;
    assert_eq!(json["inserted"], 1);
    assert_eq!(json["gapDetected"], true);
}

#[tokio::test]
async fn test_sync_failure_is_500_with_error() {
    let mut app = create_test_app().await;
    seed_credential(&app.state.db, "spotify", Duration::hours(1));
    seed_play(&app.state.db, "2024-01-01T10:00:00Z", "T0");
    let _feed = app
        .server
        .mock("GET", "/me/player/recently-played")
        .match_query(mockito::Matcher::Any)
        .with_status(503)
        .create_async()
        .await;

    let response = app
        .router
        .oneshot(authed("GET", "/cron/sync", Body::empty()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body_json(response).await["error"].is_string());
}
