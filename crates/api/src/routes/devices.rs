//! Route definitions for device queries and control.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::devices;
use crate::state::AppState;

/// Mounted at `/devices`.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(devices::list_devices))
        .route("/latest", get(devices::latest))
        .route("/{device_uid}/charts", get(devices::charts))
        .route("/{device_uid}/history", get(devices::history))
        .route("/{device_uid}/control", post(devices::control))
}
