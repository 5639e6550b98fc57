#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request};
use axum::response::Response;
use axum::Router;
use fleetpulse_core::failure::{FailureClassifier, FailureThresholds};
use fleetpulse_db::MemoryStore;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use fleetpulse_api::config::ServerConfig;
use fleetpulse_api::router::build_app_router;
use fleetpulse_api::state::AppState;

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        port: 0,
        ..ServerConfig::default()
    }
}

/// A router over a fresh in-memory store, plus handles on what it shares.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub store: Arc<MemoryStore>,
}

/// Build the full application router with the production middleware stack.
pub fn build_test_app() -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let classifier = FailureClassifier::new(FailureThresholds::default().without_nuisance());
    let config = test_config();
    let state = AppState::new(store.clone(), config.clone(), classifier);
    let router = build_app_router(state.clone(), &config);
    TestApp {
        router,
        state,
        store,
    }
}

pub async fn get(app: Router, uri: &str) -> Response {
    app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

pub async fn post_json(app: Router, uri: &str, body: Value) -> Response {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn body_json(response: Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// A healthy reading for `device_uid`.
pub fn sensor_message(device_uid: &str, tool_wear: f64) -> Value {
    json!({
        "device_uid": device_uid,
        "product_type": "M",
        "air_temp": 300.0,
        "process_temp": 310.5,
        "rotational_speed": 1500.0,
        "torque": 40.0,
        "tool_wear": tool_wear,
    })
}
