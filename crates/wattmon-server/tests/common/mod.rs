#![allow(dead_code)]

use anyhow::Result;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower::util::ServiceExt;
use wattmon_alert::engine::AlertEngine;
use wattmon_server::app;
use wattmon_server::config::ServerConfig;
use wattmon_server::scheduler::EvaluationScheduler;
use wattmon_server::state::AppState;
use wattmon_storage::Store;

pub struct TestContext {
    pub state: AppState,
    pub app: axum::Router,
    pub scheduler: EvaluationScheduler,
}

pub async fn build_test_context() -> Result<TestContext> {
    wattmon_common::id::init(1, 1);

    let store = Arc::new(Store::new("sqlite::memory:").await?);
    let engine = Arc::new(Mutex::new(AlertEngine::new(vec![])));

    let config = ServerConfig {
        http_port: 8080,
        data_dir: "data".to_string(),
        database_url: Some("sqlite::memory:".to_string()),
        cors_allowed_origins: vec![],
        evaluation: Default::default(),
    };

    let state = AppState {
        store: store.clone(),
        engine: engine.clone(),
        start_time: Utc::now(),
        config: Arc::new(config.clone()),
    };

    let app = app::build_http_app(state.clone());
    let scheduler = EvaluationScheduler::new(store, engine, config.evaluation);

    Ok(TestContext {
        state,
        app,
        scheduler,
    })
}

pub async fn request_json(
    app: &axum::Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value, Option<String>) {
    let mut builder = Request::builder().method(method).uri(uri);
    builder = builder.header("Content-Type", "application/json");

    let req_body = body.unwrap_or(Value::Null).to_string();
    let req = builder
        .body(Body::from(req_body))
        .expect("request should build");

    let resp = app
        .clone()
        .oneshot(req)
        .await
        .expect("request should be handled");

    let status = resp.status();
    let trace_id = resp
        .headers()
        .get("x-trace-id")
        .and_then(|h| h.to_str().ok())
        .map(|s| s.to_string());
    let bytes = to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("body should read");
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice::<Value>(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).to_string()))
    };

    (status, json, trace_id)
}

pub async fn request_no_body(
    app: &axum::Router,
    method: &str,
    uri: &str,
) -> (StatusCode, Value, Option<String>) {
    let req = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .expect("request should build");

    let resp = app
        .clone()
        .oneshot(req)
        .await
        .expect("request should be handled");
    let status = resp.status();
    let trace_id = resp
        .headers()
        .get("x-trace-id")
        .and_then(|h| h.to_str().ok())
        .map(|s| s.to_string());
    let bytes = to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("body should read");
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice::<Value>(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).to_string()))
    };

    (status, json, trace_id)
}

pub fn assert_ok_envelope(json: &Value) {
    assert_eq!(json["err_code"], 0);
    assert!(json["err_msg"].is_string());
    assert!(json.get("trace_id").is_some());
}

pub fn assert_err_envelope(json: &Value, err_code: i32) {
    assert_eq!(json["err_code"], err_code);
    assert!(json["err_msg"].is_string());
    assert!(json.get("trace_id").is_some());
    assert!(json["data"].is_null());
}

pub fn decode_data<T: DeserializeOwned>(json: &Value) -> T {
    serde_json::from_value(json["data"].clone()).expect("data should decode")
}

/// Register a device through the API and return its entry as JSON.
pub async fn register_device(
    app: &axum::Router,
    device_id: &str,
    max_power_watts: Option<f64>,
) -> Value {
    let (status, body, _) = request_json(
        app,
        "POST",
        "/v1/devices",
        Some(serde_json::json!({
            "device_id": device_id,
            "name": format!("Device {device_id}"),
            "kind": "manual",
            "max_power_watts": max_power_watts,
            "expected_interval_secs": 300,
            "location": "Porto,PT",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_ok_envelope(&body);
    body["data"].clone()
}

/// Ingest a reading through the API.
pub async fn ingest_reading(app: &axum::Router, device_id: &str, power_watts: f64) {
    let (status, body, _) = request_json(
        app,
        "POST",
        "/v1/readings",
        Some(serde_json::json!({
            "device_id": device_id,
            "power_watts": power_watts,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_ok_envelope(&body);
}
