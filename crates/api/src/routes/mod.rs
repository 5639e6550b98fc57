pub mod devices;
pub mod health;

use axum::routing::{get, post};
use axum::Router;

use crate::handlers;
use crate::state::AppState;
use crate::ws;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /ingest                                  accept one sensor message (POST)
/// /devices                                 list devices
/// /devices/latest                          latest state per device
/// /devices/{device_uid}/charts             chart series (?start=&end=)
/// /devices/{device_uid}/history            export rows (?start=&end=)
/// /devices/{device_uid}/control            relay control command (POST)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/ingest", post(handlers::ingest::ingest_reading))
        .nest("/devices", devices::router())
}

/// WebSocket endpoints, mounted at root level.
///
/// ```text
/// /ws/live                                 live dashboard subscribers
/// /ws/ingest                               simulator links
/// ```
pub fn ws_routes() -> Router<AppState> {
    Router::new()
        .route("/ws/live", get(ws::live_ws_handler))
        .route("/ws/ingest", get(ws::ingest_ws_handler))
}
