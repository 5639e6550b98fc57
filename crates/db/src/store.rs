//! The storage contract shared by the scheduler and the API.

use async_trait::async_trait;
use fleetpulse_core::sensor::{ProductVariant, SensorVector};
use fleetpulse_core::types::DbId;

use crate::error::StoreError;
use crate::models::device::Device;
use crate::models::prediction::{NewPrediction, Prediction};
use crate::models::reading::{
    LatestState, PendingReading, ReadingWindow, ReadingWithPrediction, SensorReading,
};
use crate::repositories::{DeviceRepo, PredictionRepo, ReadingRepo};
use crate::DbPool;

/// Durable record of devices, readings and predictions.
///
/// Implementations must enforce at most one prediction per reading and
/// report a second attempt as [`StoreError::DuplicatePrediction`].
#[async_trait]
pub trait SensorStore: Send + Sync {
    /// Get-or-create a device, backfilling an unknown variant.
    async fn upsert_device(
        &self,
        device_uid: &str,
        variant: Option<ProductVariant>,
    ) -> Result<Device, StoreError>;

    async fn insert_reading(
        &self,
        device_id: DbId,
        vector: &SensorVector,
    ) -> Result<SensorReading, StoreError>;

    /// Oldest reading without a prediction, across all devices.
    async fn next_unpredicted(&self) -> Result<Option<PendingReading>, StoreError>;

    async fn insert_prediction(&self, input: &NewPrediction) -> Result<Prediction, StoreError>;

    async fn list_devices(&self) -> Result<Vec<Device>, StoreError>;

    async fn find_device(&self, device_uid: &str) -> Result<Option<Device>, StoreError>;

    /// One entry per device that has at least one reading.
    async fn latest_per_device(&self) -> Result<Vec<LatestState>, StoreError>;

    async fn readings_for_device(
        &self,
        device_id: DbId,
        window: ReadingWindow,
    ) -> Result<Vec<SensorReading>, StoreError>;

    async fn history_for_device(
        &self,
        device_id: DbId,
        window: ReadingWindow,
    ) -> Result<Vec<ReadingWithPrediction>, StoreError>;
}

// ---------------------------------------------------------------------------
// PostgreSQL
// ---------------------------------------------------------------------------

/// [`SensorStore`] over a PostgreSQL pool.
#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait]
impl SensorStore for PgStore {
    async fn upsert_device(
        &self,
        device_uid: &str,
        variant: Option<ProductVariant>,
    ) -> Result<Device, StoreError> {
        Ok(DeviceRepo::get_or_create(&self.pool, device_uid, variant).await?)
    }

    async fn insert_reading(
        &self,
        device_id: DbId,
        vector: &SensorVector,
    ) -> Result<SensorReading, StoreError> {
        Ok(ReadingRepo::insert(&self.pool, device_id, vector).await?)
    }

    async fn next_unpredicted(&self) -> Result<Option<PendingReading>, StoreError> {
        Ok(ReadingRepo::next_unpredicted(&self.pool).await?)
    }

    async fn insert_prediction(&self, input: &NewPrediction) -> Result<Prediction, StoreError> {
        match PredictionRepo::insert(&self.pool, input).await? {
            Some(prediction) => Ok(prediction),
            None => {
                tracing::debug!(
                    reading_id = input.reading_id,
                    "Prediction rejected by uq_predictions_reading_id",
                );
                Err(StoreError::DuplicatePrediction(input.reading_id))
            }
        }
    }

    async fn list_devices(&self) -> Result<Vec<Device>, StoreError> {
        Ok(DeviceRepo::list(&self.pool).await?)
    }

    async fn find_device(&self, device_uid: &str) -> Result<Option<Device>, StoreError> {
        Ok(DeviceRepo::find_by_uid(&self.pool, device_uid).await?)
    }

    async fn latest_per_device(&self) -> Result<Vec<LatestState>, StoreError> {
        Ok(ReadingRepo::latest_per_device(&self.pool).await?)
    }

    async fn readings_for_device(
        &self,
        device_id: DbId,
        window: ReadingWindow,
    ) -> Result<Vec<SensorReading>, StoreError> {
        Ok(ReadingRepo::list_for_device(&self.pool, device_id, window).await?)
    }

    async fn history_for_device(
        &self,
        device_id: DbId,
        window: ReadingWindow,
    ) -> Result<Vec<ReadingWithPrediction>, StoreError> {
        Ok(ReadingRepo::history_for_device(&self.pool, device_id, window).await?)
    }
}
