//! Device query and control handlers.

use axum::extract::ws::Message;
use axum::extract::{Path, Query, State};
use axum::Json;
use fleetpulse_core::command::{ControlCommand, ControlEnvelope};
use fleetpulse_core::types::Timestamp;
use fleetpulse_db::models::device::Device;
use fleetpulse_db::models::reading::{ReadingWindow, SensorReading, TimeRange};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::live::{self, LivePayload};
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Query parameters
// ---------------------------------------------------------------------------

/// Optional UTC range, RFC 3339. Both bounds or neither.
#[derive(Debug, Default, Deserialize)]
pub struct RangeQuery {
    pub start: Option<Timestamp>,
    pub end: Option<Timestamp>,
}

impl RangeQuery {
    pub fn range(&self) -> AppResult<Option<TimeRange>> {
        match (self.start, self.end) {
            (None, None) => Ok(None),
            (Some(start), Some(end)) if start <= end => Ok(Some(TimeRange { start, end })),
            (Some(_), Some(_)) => Err(AppError::BadRequest("start must not be after end".into())),
            _ => Err(AppError::BadRequest(
                "start and end must be given together".into(),
            )),
        }
    }
}

async fn find_device(state: &AppState, device_uid: &str) -> AppResult<Device> {
    state
        .store
        .find_device(device_uid)
        .await?
        .ok_or_else(|| AppError::DeviceNotFound(device_uid.to_string()))
}

// ---------------------------------------------------------------------------
// Listing and latest state
// ---------------------------------------------------------------------------

/// GET /devices
pub async fn list_devices(State(state): State<AppState>) -> AppResult<Json<DataResponse<Vec<Device>>>> {
    let devices = state.store.list_devices().await?;
    Ok(Json(DataResponse { data: devices }))
}

/// GET /devices/latest
///
/// Latest reading, prediction and resolved status for every device.
pub async fn latest(State(state): State<AppState>) -> AppResult<Json<DataResponse<Vec<LivePayload>>>> {
    let payloads = live::snapshot(state.store.as_ref(), &state.classifier).await?;
    Ok(Json(DataResponse { data: payloads }))
}

// ---------------------------------------------------------------------------
// Charts
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct ChartPoint {
    pub x: Timestamp,
    pub y: f64,
}

#[derive(Debug, Serialize)]
pub struct ChartSeries {
    pub title: &'static str,
    pub data: Vec<ChartPoint>,
}

impl ChartSeries {
    fn new(title: &'static str, readings: &[SensorReading], value: impl Fn(&SensorReading) -> f64) -> Self {
        Self {
            title,
            data: readings
                .iter()
                .map(|r| ChartPoint {
                    x: r.timestamp,
                    y: value(r),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ChartSet {
    pub air_temp: ChartSeries,
    pub process_temp: ChartSeries,
    pub rotational_speed: ChartSeries,
    pub torque: ChartSeries,
    pub tool_wear: ChartSeries,
    pub power: ChartSeries,
    pub temp_difference: ChartSeries,
}

impl ChartSet {
    pub fn from_readings(readings: &[SensorReading]) -> Self {
        Self {
            air_temp: ChartSeries::new("Air temperature [K]", readings, |r| r.air_temp),
            process_temp: ChartSeries::new("Process temperature [K]", readings, |r| r.process_temp),
            rotational_speed: ChartSeries::new("Rotational speed [rpm]", readings, |r| {
                r.rotational_speed
            }),
            torque: ChartSeries::new("Torque [Nm]", readings, |r| r.torque),
            tool_wear: ChartSeries::new("Tool wear [min]", readings, |r| r.tool_wear),
            power: ChartSeries::new("Power [W]", readings, |r| r.vector().mechanical_power()),
            temp_difference: ChartSeries::new("Temperature difference [K]", readings, |r| {
                r.vector().temp_difference()
            }),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DeviceCharts {
    pub device_uid: String,
    pub product_type: Option<String>,
    pub charts: ChartSet,
}

/// GET /devices/{device_uid}/charts?start=&end=
///
/// With a range: readings inside it, oldest first, capped. Without: the
/// most recent readings, oldest first.
pub async fn charts(
    State(state): State<AppState>,
    Path(device_uid): Path<String>,
    Query(query): Query<RangeQuery>,
) -> AppResult<Json<DataResponse<DeviceCharts>>> {
    let window = ReadingWindow::for_charts(query.range()?);
    let device = find_device(&state, &device_uid).await?;
    let readings = state.store.readings_for_device(device.id, window).await?;

    Ok(Json(DataResponse {
        data: DeviceCharts {
            device_uid: device.device_uid,
            product_type: device.product_type,
            charts: ChartSet::from_readings(&readings),
        },
    }))
}

// ---------------------------------------------------------------------------
// History export
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct HistoryRow {
    pub timestamp: Timestamp,
    pub air_temp: f64,
    pub process_temp: f64,
    pub rotational_speed: f64,
    pub torque: f64,
    pub tool_wear: f64,
    pub predicted_rul: Option<f64>,
    pub failure_label: Option<String>,
}

/// GET /devices/{device_uid}/history?start=&end=
pub async fn history(
    State(state): State<AppState>,
    Path(device_uid): Path<String>,
    Query(query): Query<RangeQuery>,
) -> AppResult<Json<DataResponse<Vec<HistoryRow>>>> {
    let window = ReadingWindow::for_history(query.range()?);
    let device = find_device(&state, &device_uid).await?;
    let rows = state
        .store
        .history_for_device(device.id, window)
        .await?
        .into_iter()
        .map(|row| HistoryRow {
            timestamp: row.reading.timestamp,
            air_temp: row.reading.air_temp,
            process_temp: row.reading.process_temp,
            rotational_speed: row.reading.rotational_speed,
            torque: row.reading.torque,
            tool_wear: row.reading.tool_wear,
            predicted_rul: row.prediction.as_ref().map(|p| p.predicted_rul),
            failure_label: row.prediction.map(|p| p.failure_label),
        })
        .collect();
    Ok(Json(DataResponse { data: rows }))
}

// ---------------------------------------------------------------------------
// Control relay
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct ControlAccepted {
    pub device_uid: String,
    #[serde(flatten)]
    pub command: ControlCommand,
    /// Number of simulator links the command was relayed to.
    pub links: usize,
}

/// POST /devices/{device_uid}/control
///
/// Validates the command and relays it to every connected simulator link;
/// the link that owns the device applies it.
pub async fn control(
    State(state): State<AppState>,
    Path(device_uid): Path<String>,
    Json(command): Json<ControlCommand>,
) -> AppResult<Json<DataResponse<ControlAccepted>>> {
    command.validate()?;
    let device = find_device(&state, &device_uid).await?;

    let envelope = ControlEnvelope::new(device.device_uid.clone(), command.clone());
    let text = serde_json::to_string(&envelope)
        .map_err(|e| AppError::InternalError(format!("Failed to encode command: {e}")))?;

    let links = state.sim_links.broadcast(Message::Text(text.into())).await;
    if links == 0 {
        return Err(AppError::Unavailable("no simulator link is connected".into()));
    }

    tracing::info!(
        device_uid = %device.device_uid,
        action = ?command.action,
        links,
        "Control command relayed",
    );
    Ok(Json(DataResponse {
        data: ControlAccepted {
            device_uid: device.device_uid,
            command,
            links,
        },
    }))
}
