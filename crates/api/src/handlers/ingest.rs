//! HTTP ingestion boundary.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use fleetpulse_db::models::reading::SensorReading;
use fleetpulse_pipeline::IngestError;
use serde_json::Value;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// POST /ingest
///
/// Accepts one sensor message. Malformed messages are rejected with 400
/// and nothing is stored.
pub async fn ingest_reading(
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> AppResult<(StatusCode, Json<DataResponse<SensorReading>>)> {
    let reading = state.ingestor.ingest_value(payload).await.map_err(|e| match e {
        IngestError::Store(store) => AppError::Store(store),
        other => {
            tracing::warn!(error = %other, "Rejected sensor message");
            AppError::BadRequest(other.to_string())
        }
    })?;
    Ok((StatusCode::CREATED, Json(DataResponse { data: reading })))
}
