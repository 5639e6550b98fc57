//! Sensor reading models and read-side projections.

use fleetpulse_core::sensor::{ProductVariant, SensorVector};
use fleetpulse_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

use super::device::Device;
use super::prediction::Prediction;

/// Maximum points returned for an explicit chart range.
pub const CHART_RANGE_LIMIT: i64 = 2000;

/// Points returned for a live chart (no range given).
pub const CHART_LIVE_LIMIT: i64 = 100;

/// Maximum rows returned by a history export.
pub const HISTORY_LIMIT: i64 = 5000;

/// A row from the `sensor_readings` table. Immutable once written.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct SensorReading {
    pub id: DbId,
    pub device_id: DbId,
    pub air_temp: f64,
    pub process_temp: f64,
    pub rotational_speed: f64,
    pub torque: f64,
    pub tool_wear: f64,
    pub timestamp: Timestamp,
}

impl SensorReading {
    pub fn vector(&self) -> SensorVector {
        SensorVector {
            air_temp: self.air_temp,
            process_temp: self.process_temp,
            rotational_speed: self.rotational_speed,
            torque: self.torque,
            tool_wear: self.tool_wear,
        }
    }
}

/// The oldest reading still lacking a prediction, with its device variant.
#[derive(Debug, Clone, FromRow)]
pub struct PendingReading {
    #[sqlx(flatten)]
    pub reading: SensorReading,
    pub product_type: Option<String>,
}

impl PendingReading {
    pub fn variant(&self) -> Option<ProductVariant> {
        ProductVariant::parse_lenient(self.product_type.as_deref())
    }
}

/// Latest reading of one device joined with its prediction, if any.
#[derive(Debug, Clone)]
pub struct LatestState {
    pub device: Device,
    pub reading: SensorReading,
    pub prediction: Option<Prediction>,
}

/// A reading paired with its prediction for exports.
#[derive(Debug, Clone, Serialize)]
pub struct ReadingWithPrediction {
    pub reading: SensorReading,
    pub prediction: Option<Prediction>,
}

/// Inclusive UTC time range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeRange {
    pub start: Timestamp,
    pub end: Timestamp,
}

/// Which readings of a device to return. Results are always oldest first.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReadingWindow {
    /// The most recent `limit` readings.
    Latest { limit: i64 },
    /// Readings inside `range`, capped at `limit`.
    Range { range: TimeRange, limit: i64 },
}

impl ReadingWindow {
    /// Chart window: an explicit range, or the live tail.
    pub fn for_charts(range: Option<TimeRange>) -> Self {
        match range {
            Some(range) => ReadingWindow::Range {
                range,
                limit: CHART_RANGE_LIMIT,
            },
            None => ReadingWindow::Latest {
                limit: CHART_LIVE_LIMIT,
            },
        }
    }

    /// History export window.
    pub fn for_history(range: Option<TimeRange>) -> Self {
        match range {
            Some(range) => ReadingWindow::Range {
                range,
                limit: HISTORY_LIMIT,
            },
            None => ReadingWindow::Latest {
                limit: HISTORY_LIMIT,
            },
        }
    }
}
