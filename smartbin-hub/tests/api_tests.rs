//! Integration tests for smartbin-hub HTTP endpoints
//!
//! Tests cover:
//! - Item ingestion (accept and reject paths)
//! - Latest-state polling
//! - SSE subscription: cached item first, then live pushes
//! - Health endpoint

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use smartbin_hub::{build_router, AppState, BroadcastHub};
use std::sync::Arc;
use std::time::Duration;
use tower::util::ServiceExt; // for `oneshot` method

/// Test helper: fresh hub and router sharing it
fn setup_app() -> (axum::Router, AppState) {
    let state = AppState::new(Arc::new(BroadcastHub::new(8)));
    (build_router(state.clone()), state)
}

fn item_json(item_type: &str, class: &str) -> Value {
    json!({
        "type": item_type,
        "class": class,
        "bin": "BIN-001",
        "weight": "0.75 kg",
        "recyclable": true,
        "image": "aGVsbG8=",
        "timestamp": "2025-10-26 14:30:45"
    })
}

fn post_request(body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/item")
        .header("content-type", "application/json")
        .body(body.into())
        .unwrap()
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

/// Test helper: Extract JSON body from response
async fn extract_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .expect("Should read body");
    serde_json::from_slice(&bytes).expect("Should parse JSON")
}

/// Test helper: read the next non-empty SSE data frame as text
async fn next_sse_frame(body: &mut Body) -> String {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(2), body.frame())
            .await
            .expect("SSE frame should arrive")
            .expect("stream should stay open")
            .expect("frame should be readable");
        if let Ok(data) = frame.into_data() {
            let text = String::from_utf8(data.to_vec()).unwrap();
            if !text.trim().is_empty() {
                return text;
            }
        }
    }
}

fn sse_payload(frame: &str) -> Value {
    let data = frame
        .lines()
        .find_map(|line| line.strip_prefix("data: "))
        .expect("frame should carry data");
    serde_json::from_str(data).unwrap()
}

// =============================================================================
// Ingestion
// =============================================================================

#[tokio::test]
async fn test_post_item_accepted() {
    let (app, state) = setup_app();

    let response = app
        .oneshot(post_request(item_json("Aluminum Can", "Metal").to_string()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["status"], "success");
    assert_eq!(body["message"], "Item received");
    assert_eq!(state.hub.latest().unwrap().item_type, "Aluminum Can");
}

#[tokio::test]
async fn test_post_item_missing_field_rejected_with_reason() {
    let (app, state) = setup_app();
    let mut payload = item_json("Paper", "Paper");
    payload.as_object_mut().unwrap().remove("timestamp");

    let response = app.oneshot(post_request(payload.to_string())).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["status"], "error");
    assert_eq!(body["message"], "missing_field:timestamp");
    assert!(state.hub.latest().is_none());
}

#[tokio::test]
async fn test_post_item_garbage_body_rejected() {
    let (app, _state) = setup_app();

    let response = app.oneshot(post_request("not json at all")).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["message"], "invalid_json");
}

// =============================================================================
// Latest-state polling
// =============================================================================

#[tokio::test]
async fn test_latest_without_data() {
    let (app, _state) = setup_app();

    let response = app.oneshot(get_request("/api/latest")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body, json!({ "status": "no_data" }));
}

#[tokio::test]
async fn test_latest_returns_most_recent_item() {
    let (app, _state) = setup_app();

    for (t, c) in [("Glass Jar", "Glass"), ("Cardboard Box", "Cardboard")] {
        let response = app
            .clone()
            .oneshot(post_request(item_json(t, c).to_string()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app.oneshot(get_request("/api/latest")).await.unwrap();
    let body = extract_json(response.into_body()).await;
    assert_eq!(body, item_json("Cardboard Box", "Cardboard"));
}

#[tokio::test]
async fn test_rejected_item_does_not_replace_latest() {
    let (app, _state) = setup_app();
    app.clone()
        .oneshot(post_request(item_json("Paper", "Paper").to_string()))
        .await
        .unwrap();

    let mut bad = item_json("Metal Scrap", "Metal");
    bad["recyclable"] = json!("true");
    let response = app.clone().oneshot(post_request(bad.to_string())).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app.oneshot(get_request("/api/latest")).await.unwrap();
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["type"], "Paper");
}

// =============================================================================
// SSE subscription
// =============================================================================

#[tokio::test]
async fn test_sse_sends_cached_item_then_live_items() {
    let (app, state) = setup_app();
    state
        .endpoint
        .submit_json(item_json("Glass Jar", "Glass").to_string().as_bytes())
        .unwrap();

    let response = app.clone().oneshot(get_request("/api/events")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["content-type"].to_str().unwrap(),
        "text/event-stream"
    );
    let mut body = response.into_body();

    let first = next_sse_frame(&mut body).await;
    assert!(first.contains("event: new_item"));
    assert_eq!(sse_payload(&first)["type"], "Glass Jar");
    assert_eq!(state.hub.subscriber_count(), 1);

    app.oneshot(post_request(item_json("Paper", "Paper").to_string()))
        .await
        .unwrap();

    let second = next_sse_frame(&mut body).await;
    assert_eq!(sse_payload(&second)["type"], "Paper");
}

#[tokio::test]
async fn test_sse_disconnect_unregisters_subscriber() {
    let (app, state) = setup_app();

    let response = app.oneshot(get_request("/api/events")).await.unwrap();
    assert_eq!(state.hub.subscriber_count(), 1);

    drop(response);
    assert_eq!(state.hub.subscriber_count(), 0);
}

// =============================================================================
// Health
// =============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let (app, state) = setup_app();
    state
        .endpoint
        .submit_json(item_json("Paper", "Paper").to_string().as_bytes())
        .unwrap();

    let response = app.oneshot(get_request("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "smartbin-hub");
    assert_eq!(body["items_ingested"], 1);
    assert_eq!(body["subscribers"], 0);
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn test_buildinfo_endpoint() {
    let (app, _state) = setup_app();

    let response = app.oneshot(get_request("/api/buildinfo")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["module"], "smartbin-hub");
    assert!(body["git_hash"].is_string());
    assert!(body["build_profile"].is_string());
    assert_eq!(body["subscriber_buffer"], 8);
}
