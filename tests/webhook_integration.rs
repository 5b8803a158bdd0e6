// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Integration tests for webhook handling.

mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use chrono::{Duration, Utc};
use common::{create_test_app, get, seed_credential, TestApp};
use feedkeeper::models::ActivityRecord;
use feedkeeper::services::webhook::{classify, Classified, EventOutcome};
use serde_json::json;
use tower::ServiceExt;

const SUBSCRIPTION_ID: u64 = 120475;

fn post_event(body: String) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/webhook/strava")
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap()
}

fn event(aspect: &str, object_id: u64, subscription_id: u64) -> serde_json::Value {
    json!({
        "aspect_type": aspect,
        "event_time": 1716123456,
        "object_id": object_id,
        "object_type": "activity",
        "owner_id": 134815,
        "subscription_id": subscription_id,
        "updates": {}
    })
}

async fn mock_subscriptions(app: &mut TestApp) -> mockito::Mock {
    app.server
        .mock("GET", "/strava/push_subscriptions")
        .match_query(mockito::Matcher::Any)
        .with_status(200)
        .with_body(json!([{ "id": SUBSCRIPTION_ID }]).to_string())
        .create_async()
        .await
}

fn seed_activity(app: &TestApp, id: u64, last_update: chrono::DateTime<Utc>) {
    app.state
        .db
        .upsert_activity(&ActivityRecord {
            id,
            activity_start_date: last_update,
            activity_data: json!({"name": "Old"}),
            last_update,
        })
        .unwrap();
}

#[tokio::test]
async fn test_webhook_verification() {
    let app = create_test_app().await;

    let response = app
        .router
        .oneshot(get(
            "/webhook/strava?hub.mode=subscribe&hub.challenge=test_challenge_123&hub.verify_token=test_verify_token",
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), 1024)
        .await
        .unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["hub.challenge"], "test_challenge_123");
}

#[tokio::test]
async fn test_webhook_verification_wrong_token() {
    let app = create_test_app().await;

    let response = app
        .router
        .oneshot(get(
            "/webhook/strava?hub.mode=subscribe&hub.challenge=c&hub.verify_token=wrong_token",
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_webhook_get_without_challenge_is_no_content() {
    let app = create_test_app().await;

    let response = app.router.oneshot(get("/webhook/strava")).await.unwrap();

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_unrelated_body_is_silently_accepted() {
    let app = create_test_app().await;

    let response = app
        .router
        .oneshot(post_event(r#"{"hello": "world"}"#.to_string()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_malformed_event_is_rejected() {
    let app = create_test_app().await;
    let mut body = event("create", 1, SUBSCRIPTION_ID);
    body["object_id"] = json!("not-a-number");

    let response = app
        .router
        .oneshot(post_event(body.to_string()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_subscription_is_forbidden() {
    let mut app = create_test_app().await;
    let _subs = mock_subscriptions(&mut app).await;

    let response = app
        .router
        .clone()
        .oneshot(post_event(event("delete", 1, 999).to_string()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_create_fetches_normalizes_and_stores() {
    let mut app = create_test_app().await;
    let _subs = mock_subscriptions(&mut app).await;
    let fetch = app
        .server
        .mock("GET", "/strava/activities/42")
        .match_header("authorization", "Bearer strava_access")
        .with_status(200)
        .with_body(
            json!({
                "id": 42,
                "sport_type": "TrailRun",
                "start_date": "2024-05-01T07:00:00Z",
                "map": {"summary_polyline": "abc"}
            })
            .to_string(),
        )
        .expect(1)
        .create_async()
        .await;
    seed_credential(&app.state.db, "strava", Duration::hours(1));

    let response = app
        .router
        .clone()
        .oneshot(post_event(event("create", 42, SUBSCRIPTION_ID).to_string()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
    assert!(body.is_empty());

    let stored = app.state.db.get_activity(42).unwrap().unwrap();
    assert_eq!(stored.activity_data["sportType"], "TrailRun");
    assert_eq!(stored.activity_data["map"]["summaryPolyline"], "abc");
    assert_eq!(stored.activity_start_date, common::ts("2024-05-01T07:00:00Z"));
    fetch.assert_async().await;
}

#[tokio::test]
async fn test_create_fetch_failure_is_an_error() {
    let mut app = create_test_app().await;
    let _subs = mock_subscriptions(&mut app).await;
    let _fetch = app
        .server
        .mock("GET", "/strava/activities/42")
        .with_status(500)
        .create_async()
        .await;
    seed_credential(&app.state.db, "strava", Duration::hours(1));

    let response = app
        .router
        .clone()
        .oneshot(post_event(event("create", 42, SUBSCRIPTION_ID).to_string()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert!(app.state.db.get_activity(42).unwrap().is_none());
}

#[tokio::test]
async fn test_delete_unknown_activity_succeeds() {
    let mut app = create_test_app().await;
    let _subs = mock_subscriptions(&mut app).await;

    let response = app
        .router
        .clone()
        .oneshot(post_event(event("delete", 404404, SUBSCRIPTION_ID).to_string()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_update_respects_cooldown_window() {
    let mut app = create_test_app().await;
    let _subs = mock_subscriptions(&mut app).await;
    let fetch = app
        .server
        .mock("GET", "/strava/activities/7")
        .with_status(200)
        .with_body(r#"{"id": 7, "name": "Renamed", "start_date": "2024-05-01T07:00:00Z"}"#)
        .expect(1)
        .create_async()
        .await;
    seed_credential(&app.state.db, "strava", Duration::hours(1));

    let Classified::Event(update) = classify(event("update", 7, SUBSCRIPTION_ID).to_string().as_bytes())
    else {
        panic!("expected event");
    };
    let now = Utc::now();

    // Refreshed 30 s ago: skipped without a fetch.
    seed_activity(&app, 7, now - Duration::seconds(30));
    let outcome = app.state.webhooks.process_at(&update, now).await.unwrap();
    assert_eq!(outcome, EventOutcome::CooledDown);
    assert_eq!(app.state.db.get_activity(7).unwrap().unwrap().activity_data["name"], "Old");

    // Refreshed 2 min ago: fetched and stamped.
    seed_activity(&app, 7, now - Duration::minutes(2));
    let outcome = app.state.webhooks.process_at(&update, now).await.unwrap();
    assert_eq!(outcome, EventOutcome::Upserted);
    let stored = app.state.db.get_activity(7).unwrap().unwrap();
    assert_eq!(stored.activity_data["name"], "Renamed");
    assert!((stored.last_update - now).num_milliseconds().abs() <= 1);

    fetch.assert_async().await;
}

#[tokio::test]
async fn test_update_fetch_failure_leaves_row_untouched() {
    let mut app = create_test_app().await;
    let _subs = mock_subscriptions(&mut app).await;
    let fetch = app
        .server
        .mock("GET", "/strava/activities/7")
        .with_status(500)
        .expect(1)
        .create_async()
        .await;
    seed_credential(&app.state.db, "strava", Duration::hours(1));
    let stamped = Utc::now() - Duration::minutes(5);
    seed_activity(&app, 7, stamped);
    let before = app.state.db.get_activity(7).unwrap().unwrap();

    let response = app
        .router
        .clone()
        .oneshot(post_event(event("update", 7, SUBSCRIPTION_ID).to_string()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let after = app.state.db.get_activity(7).unwrap().unwrap();
    assert_eq!(after.activity_data, before.activity_data);
    assert_eq!(after.last_update, before.last_update);
    fetch.assert_async().await;
}

#[tokio::test]
async fn test_athlete_events_are_acknowledged() {
    let mut app = create_test_app().await;
    let _subs = mock_subscriptions(&mut app).await;
    let mut body = event("update", 134815, SUBSCRIPTION_ID);
    body["object_type"] = json!("athlete");
    body["updates"] = json!({"authorized": "false"});

    let response = app
        .router
        .clone()
        .oneshot(post_event(body.to_string()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}
