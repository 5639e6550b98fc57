//! Repository for the `sensor_readings` table.
//!
//! Readings are append-only. The "latest" and "history" queries outer-join
//! `predictions` so a reading is visible before the scheduler reaches it.

use fleetpulse_core::sensor::SensorVector;
use fleetpulse_core::types::{DbId, Timestamp};
use sqlx::{FromRow, PgPool};

use crate::models::device::Device;
use crate::models::prediction::Prediction;
use crate::models::reading::{
    LatestState, PendingReading, ReadingWindow, ReadingWithPrediction, SensorReading,
};

/// Column list for `sensor_readings` queries.
const COLUMNS: &str = "\
    id, device_id, air_temp, process_temp, rotational_speed, torque, tool_wear, timestamp";

/// Same columns qualified with the `r` alias for joins.
const READING_COLUMNS_R: &str = "\
    r.id, r.device_id, r.air_temp, r.process_temp, r.rotational_speed, \
    r.torque, r.tool_wear, r.timestamp";

/// Outer-joined prediction columns, renamed to avoid clashes.
const PREDICTION_COLUMNS_P: &str = "\
    p.id AS prediction_id, p.predicted_rul, p.failure_label, \
    p.created_at AS prediction_created_at";

/// Reading plus nullable prediction columns from a `LEFT JOIN`.
#[derive(Debug, FromRow)]
struct JoinedRow {
    #[sqlx(flatten)]
    reading: SensorReading,
    prediction_id: Option<DbId>,
    predicted_rul: Option<f64>,
    failure_label: Option<String>,
    prediction_created_at: Option<Timestamp>,
}

impl JoinedRow {
    fn prediction(&self) -> Option<Prediction> {
        match (
            self.prediction_id,
            self.predicted_rul,
            &self.failure_label,
            self.prediction_created_at,
        ) {
            (Some(id), Some(rul), Some(label), Some(created_at)) => Some(Prediction {
                id,
                reading_id: self.reading.id,
                predicted_rul: rul,
                failure_label: label.clone(),
                created_at,
            }),
            _ => None,
        }
    }

    fn into_history(self) -> ReadingWithPrediction {
        let prediction = self.prediction();
        ReadingWithPrediction {
            reading: self.reading,
            prediction,
        }
    }
}

/// Latest-per-device row: device columns plus a joined reading.
#[derive(Debug, FromRow)]
struct LatestRow {
    device_pk: DbId,
    device_uid: String,
    product_type: Option<String>,
    device_created_at: Timestamp,
    #[sqlx(flatten)]
    joined: JoinedRow,
}

impl From<LatestRow> for LatestState {
    fn from(row: LatestRow) -> Self {
        let prediction = row.joined.prediction();
        LatestState {
            device: Device {
                id: row.device_pk,
                device_uid: row.device_uid,
                product_type: row.product_type,
                created_at: row.device_created_at,
            },
            reading: row.joined.reading,
            prediction,
        }
    }
}

/// Provides insert and query operations for sensor readings.
pub struct ReadingRepo;

impl ReadingRepo {
    /// Store one reading; the timestamp is assigned by the database.
    pub async fn insert(
        pool: &PgPool,
        device_id: DbId,
        vector: &SensorVector,
    ) -> Result<SensorReading, sqlx::Error> {
        let query = format!(
            "INSERT INTO sensor_readings \
                 (device_id, air_temp, process_temp, rotational_speed, torque, tool_wear) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, SensorReading>(&query)
            .bind(device_id)
            .bind(vector.air_temp)
            .bind(vector.process_temp)
            .bind(vector.rotational_speed)
            .bind(vector.torque)
            .bind(vector.tool_wear)
            .fetch_one(pool)
            .await
    }

    /// The oldest reading across all devices that has no prediction yet.
    pub async fn next_unpredicted(pool: &PgPool) -> Result<Option<PendingReading>, sqlx::Error> {
        let query = format!(
            "SELECT {READING_COLUMNS_R}, d.product_type \
             FROM sensor_readings r \
             JOIN devices d ON d.id = r.device_id \
             WHERE NOT EXISTS (SELECT 1 FROM predictions p WHERE p.reading_id = r.id) \
             ORDER BY r.id ASC \
             LIMIT 1"
        );
        sqlx::query_as::<_, PendingReading>(&query)
            .fetch_optional(pool)
            .await
    }

    /// Latest reading of every device with its prediction, if any.
    pub async fn latest_per_device(pool: &PgPool) -> Result<Vec<LatestState>, sqlx::Error> {
        let query = format!(
            "SELECT DISTINCT ON (r.device_id) \
                 d.id AS device_pk, d.device_uid, d.product_type, \
                 d.created_at AS device_created_at, \
                 {READING_COLUMNS_R}, {PREDICTION_COLUMNS_P} \
             FROM sensor_readings r \
             JOIN devices d ON d.id = r.device_id \
             LEFT JOIN predictions p ON p.reading_id = r.id \
             ORDER BY r.device_id, r.timestamp DESC, r.id DESC"
        );
        let rows = sqlx::query_as::<_, LatestRow>(&query)
            .fetch_all(pool)
            .await?;
        Ok(rows.into_iter().map(LatestState::from).collect())
    }

    /// Readings of one device, oldest first.
    pub async fn list_for_device(
        pool: &PgPool,
        device_id: DbId,
        window: ReadingWindow,
    ) -> Result<Vec<SensorReading>, sqlx::Error> {
        match window {
            ReadingWindow::Latest { limit } => {
                let query = format!(
                    "SELECT {COLUMNS} FROM sensor_readings \
                     WHERE device_id = $1 \
                     ORDER BY timestamp DESC, id DESC \
                     LIMIT $2"
                );
                let mut rows = sqlx::query_as::<_, SensorReading>(&query)
                    .bind(device_id)
                    .bind(limit)
                    .fetch_all(pool)
                    .await?;
                rows.reverse();
                Ok(rows)
            }
            ReadingWindow::Range { range, limit } => {
                let query = format!(
                    "SELECT {COLUMNS} FROM sensor_readings \
                     WHERE device_id = $1 AND timestamp >= $2 AND timestamp <= $3 \
                     ORDER BY timestamp ASC, id ASC \
                     LIMIT $4"
                );
                sqlx::query_as::<_, SensorReading>(&query)
                    .bind(device_id)
                    .bind(range.start)
                    .bind(range.end)
                    .bind(limit)
                    .fetch_all(pool)
                    .await
            }
        }
    }

    /// Readings of one device joined with predictions, oldest first.
    pub async fn history_for_device(
        pool: &PgPool,
        device_id: DbId,
        window: ReadingWindow,
    ) -> Result<Vec<ReadingWithPrediction>, sqlx::Error> {
        let base = format!(
            "SELECT {READING_COLUMNS_R}, {PREDICTION_COLUMNS_P} \
             FROM sensor_readings r \
             LEFT JOIN predictions p ON p.reading_id = r.id \
             WHERE r.device_id = $1"
        );
        let rows = match window {
            ReadingWindow::Latest { limit } => {
                let query = format!("{base} ORDER BY r.timestamp DESC, r.id DESC LIMIT $2");
                let mut rows = sqlx::query_as::<_, JoinedRow>(&query)
                    .bind(device_id)
                    .bind(limit)
                    .fetch_all(pool)
                    .await?;
                rows.reverse();
                rows
            }
            ReadingWindow::Range { range, limit } => {
                let query = format!(
                    "{base} AND r.timestamp >= $2 AND r.timestamp <= $3 \
                     ORDER BY r.timestamp ASC, r.id ASC LIMIT $4"
                );
                sqlx::query_as::<_, JoinedRow>(&query)
                    .bind(device_id)
                    .bind(range.start)
                    .bind(range.end)
                    .bind(limit)
                    .fetch_all(pool)
                    .await?
            }
        };
        Ok(rows.into_iter().map(JoinedRow::into_history).collect())
    }
}
