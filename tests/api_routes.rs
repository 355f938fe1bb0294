//! HTTP relay route tests

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use self_healing_monitor::api::create_router;
use self_healing_monitor::monitor::{Monitor, MonitorConfig};

fn app() -> (Arc<Monitor>, Router) {
    let monitor = Arc::new(Monitor::new(MonitorConfig::default()).unwrap());
    (Arc::clone(&monitor), create_router(monitor))
}

async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn test_status() {
    let (_, app) = app();
    let (status, body) = call(&app, "GET", "/api/status", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "Self-Healing Blockchain Network API is running");
    assert_eq!(body["monitor"]["mode"], "NORMAL");
}

#[tokio::test]
async fn test_simulate_then_list_attacks() {
    let (_, app) = app();
    let (status, body) = call(
        &app,
        "POST",
        "/api/simulate/attack",
        Some(json!({ "type": "DDoS Attack", "address": "0xdeadbeef" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["attack"]["severity"], "critical");
    assert_eq!(body["attack"]["address"], "0xdeadbeef");

    let (_, body) = call(&app, "GET", "/api/attacks", None).await;
    let attacks = body["recentAttacks"].as_array().unwrap();
    assert_eq!(attacks.len(), 1);
    assert_eq!(attacks[0]["type"], "Potential DDoS Attack");
}

#[tokio::test]
async fn test_simulate_defaults_without_body() {
    let (_, app) = app();
    let (status, body) = call(&app, "POST", "/api/simulate/attack", Some(json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["attack"]["type"], "Unknown Attack");
    assert_eq!(body["attack"]["address"], "0xSimulatedAttacker");
    assert_eq!(body["attack"]["severity"], "medium");
}

#[tokio::test]
async fn test_recovery_cycle_over_http() {
    let (monitor, app) = app();
    call(
        &app,
        "POST",
        "/api/simulate/attack",
        Some(json!({ "type": "Reentrancy", "address": "0xattacker" })),
    )
    .await;

    let (status, body) = call(&app, "POST", "/api/recovery/trigger", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Recovery mode triggered successfully");
    assert_eq!(body["recovery"]["neutralized"], 1);

    let (_, body) = call(&app, "GET", "/api/blacklist", None).await;
    let entries = body["blacklistedAddresses"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["address"], "0xattacker");
    assert_eq!(entries[0]["reason"], "Potential Reentrancy Attack");

    let (_, body) = call(&app, "POST", "/api/recovery/trigger", None).await;
    assert_eq!(body["recovery"]["changed"], false);

    let (_, body) = call(&app, "POST", "/api/recovery/exit", None).await;
    assert_eq!(body["message"], "Exited recovery mode");
    assert!(monitor.is_blacklisted("0xattacker"));
}

#[tokio::test]
async fn test_ingest_event_and_reject_invalid() {
    let (_, app) = app();
    let (status, body) = call(
        &app,
        "POST",
        "/api/events",
        Some(json!({ "address": "0xabc", "kind": "transfer", "magnitude": 2.5 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["blocked"], false);

    let missing = json!({ "kind": "transfer" });
    let (status, body) = call(&app, "POST", "/api/events", Some(missing)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"].as_str().unwrap().contains("missing address"));
}

#[tokio::test]
async fn test_ml_detections_shape() {
    let (_, app) = app();
    let (status, body) = call(&app, "GET", "/api/ml-detections", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["recentMLDetections"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_metrics_text() {
    let (_, app) = app();
    call(&app, "POST", "/api/simulate/attack", Some(json!({ "type": "Sybil Attack" }))).await;

    let request = Request::builder()
        .method("GET")
        .uri("/api/metrics")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("monitor_findings_total{severity=\"medium\"} 1"));
}
