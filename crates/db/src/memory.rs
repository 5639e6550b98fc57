//! In-process [`SensorStore`] used by tests and by the API when no
//! database is configured.

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use chrono::Utc;
use fleetpulse_core::sensor::{ProductVariant, SensorVector};
use fleetpulse_core::types::{DbId, Timestamp};
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::models::device::Device;
use crate::models::prediction::{NewPrediction, Prediction};
use crate::models::reading::{
    LatestState, PendingReading, ReadingWindow, ReadingWithPrediction, SensorReading,
};
use crate::store::SensorStore;

#[derive(Default)]
struct Inner {
    devices: Vec<Device>,
    /// Append order equals id order.
    readings: Vec<SensorReading>,
    /// Keyed by reading id; the key enforces one prediction per reading.
    predictions: HashMap<DbId, Prediction>,
    /// Reading ids still waiting for a prediction.
    pending: BTreeSet<DbId>,
    next_device_id: DbId,
    next_reading_id: DbId,
    next_prediction_id: DbId,
}

impl Inner {
    fn device_by_id(&self, id: DbId) -> Option<&Device> {
        self.devices.iter().find(|d| d.id == id)
    }

    fn reading_by_id(&self, id: DbId) -> Option<&SensorReading> {
        // Ids start at 1 and are never reused.
        self.readings.get(usize::try_from(id - 1).ok()?)
    }

    /// Readings of one device, oldest first.
    fn device_readings(&self, device_id: DbId, window: ReadingWindow) -> Vec<SensorReading> {
        let mut rows: Vec<&SensorReading> = self
            .readings
            .iter()
            .filter(|r| r.device_id == device_id)
            .collect();
        rows.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.id.cmp(&b.id)));

        let selected: Vec<&SensorReading> = match window {
            ReadingWindow::Latest { limit } => {
                let limit = usize::try_from(limit).unwrap_or(0);
                let skip = rows.len().saturating_sub(limit);
                rows.into_iter().skip(skip).collect()
            }
            ReadingWindow::Range { range, limit } => rows
                .into_iter()
                .filter(|r| r.timestamp >= range.start && r.timestamp <= range.end)
                .take(usize::try_from(limit).unwrap_or(0))
                .collect(),
        };
        selected.into_iter().cloned().collect()
    }
}

/// Memory-backed store with the same uniqueness guarantees as PostgreSQL.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a reading with an explicit timestamp.
    pub async fn insert_reading_at(
        &self,
        device_id: DbId,
        vector: &SensorVector,
        timestamp: Timestamp,
    ) -> Result<SensorReading, StoreError> {
        let mut inner = self.inner.write().await;
        if inner.device_by_id(device_id).is_none() {
            return Err(StoreError::NotFound {
                entity: "Device",
                id: device_id,
            });
        }
        inner.next_reading_id += 1;
        let reading = SensorReading {
            id: inner.next_reading_id,
            device_id,
            air_temp: vector.air_temp,
            process_temp: vector.process_temp,
            rotational_speed: vector.rotational_speed,
            torque: vector.torque,
            tool_wear: vector.tool_wear,
            timestamp,
        };
        inner.readings.push(reading.clone());
        inner.pending.insert(reading.id);
        Ok(reading)
    }

    /// Number of readings still lacking a prediction.
    pub async fn pending_count(&self) -> usize {
        self.inner.read().await.pending.len()
    }

    pub async fn prediction_count(&self) -> usize {
        self.inner.read().await.predictions.len()
    }
}

#[async_trait]
impl SensorStore for MemoryStore {
    async fn upsert_device(
        &self,
        device_uid: &str,
        variant: Option<ProductVariant>,
    ) -> Result<Device, StoreError> {
        let mut inner = self.inner.write().await;
        if let Some(existing) = inner
            .devices
            .iter_mut()
            .find(|d| d.device_uid == device_uid)
        {
            if existing.product_type.is_none() {
                existing.product_type = variant.map(|v| v.as_str().to_string());
            }
            return Ok(existing.clone());
        }

        inner.next_device_id += 1;
        let device = Device {
            id: inner.next_device_id,
            device_uid: device_uid.to_string(),
            product_type: variant.map(|v| v.as_str().to_string()),
            created_at: Utc::now(),
        };
        inner.devices.push(device.clone());
        Ok(device)
    }

    async fn insert_reading(
        &self,
        device_id: DbId,
        vector: &SensorVector,
    ) -> Result<SensorReading, StoreError> {
        self.insert_reading_at(device_id, vector, Utc::now()).await
    }

    async fn next_unpredicted(&self) -> Result<Option<PendingReading>, StoreError> {
        let inner = self.inner.read().await;
        let Some(&reading_id) = inner.pending.first() else {
            return Ok(None);
        };
        let reading = inner
            .reading_by_id(reading_id)
            .cloned()
            .ok_or(StoreError::NotFound {
                entity: "SensorReading",
                id: reading_id,
            })?;
        let product_type = inner
            .device_by_id(reading.device_id)
            .and_then(|d| d.product_type.clone());
        Ok(Some(PendingReading {
            reading,
            product_type,
        }))
    }

    async fn insert_prediction(&self, input: &NewPrediction) -> Result<Prediction, StoreError> {
        let mut inner = self.inner.write().await;
        if inner.predictions.contains_key(&input.reading_id) {
            tracing::debug!(reading_id = input.reading_id, "Reading already has a prediction");
            return Err(StoreError::DuplicatePrediction(input.reading_id));
        }
        if inner.reading_by_id(input.reading_id).is_none() {
            return Err(StoreError::NotFound {
                entity: "SensorReading",
                id: input.reading_id,
            });
        }
        inner.next_prediction_id += 1;
        let prediction = Prediction {
            id: inner.next_prediction_id,
            reading_id: input.reading_id,
            predicted_rul: input.predicted_rul,
            failure_label: input.failure_label.as_str().to_string(),
            created_at: Utc::now(),
        };
        inner.predictions.insert(input.reading_id, prediction.clone());
        inner.pending.remove(&input.reading_id);
        Ok(prediction)
    }

    async fn list_devices(&self) -> Result<Vec<Device>, StoreError> {
        Ok(self.inner.read().await.devices.clone())
    }

    async fn find_device(&self, device_uid: &str) -> Result<Option<Device>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .devices
            .iter()
            .find(|d| d.device_uid == device_uid)
            .cloned())
    }

    async fn latest_per_device(&self) -> Result<Vec<LatestState>, StoreError> {
        let inner = self.inner.read().await;
        let mut out = Vec::new();
        for device in &inner.devices {
            let latest = inner
                .readings
                .iter()
                .filter(|r| r.device_id == device.id)
                .max_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.id.cmp(&b.id)));
            if let Some(reading) = latest {
                out.push(LatestState {
                    device: device.clone(),
                    reading: reading.clone(),
                    prediction: inner.predictions.get(&reading.id).cloned(),
                });
            }
        }
        Ok(out)
    }

    async fn readings_for_device(
        &self,
        device_id: DbId,
        window: ReadingWindow,
    ) -> Result<Vec<SensorReading>, StoreError> {
        Ok(self.inner.read().await.device_readings(device_id, window))
    }

    async fn history_for_device(
        &self,
        device_id: DbId,
        window: ReadingWindow,
    ) -> Result<Vec<ReadingWithPrediction>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .device_readings(device_id, window)
            .into_iter()
            .map(|reading| {
                let prediction = inner.predictions.get(&reading.id).cloned();
                ReadingWithPrediction {
                    reading,
                    prediction,
                }
            })
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use fleetpulse_core::failure::FailureLabel;

    use super::*;

    fn vector(wear: f64) -> SensorVector {
        SensorVector {
            air_temp: 300.0,
            process_temp: 310.0,
            rotational_speed: 1500.0,
            torque: 40.0,
            tool_wear: wear,
        }
    }

    #[tokio::test]
    async fn upsert_backfills_unknown_variant_only() {
        let store = MemoryStore::new();
        let first = store.upsert_device("dev-1", None).await.unwrap();
        assert_eq!(first.product_type, None);

        let filled = store
            .upsert_device("dev-1", Some(ProductVariant::M))
            .await
            .unwrap();
        assert_eq!(filled.id, first.id);
        assert_eq!(filled.variant(), Some(ProductVariant::M));

        let kept = store
            .upsert_device("dev-1", Some(ProductVariant::H))
            .await
            .unwrap();
        assert_eq!(kept.variant(), Some(ProductVariant::M));
        assert_eq!(store.list_devices().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn reading_for_unknown_device_is_rejected() {
        let store = MemoryStore::new();
        assert_matches!(
            store.insert_reading(42, &vector(0.0)).await,
            Err(StoreError::NotFound { entity: "Device", id: 42 })
        );
    }

    #[tokio::test]
    async fn second_prediction_for_reading_is_duplicate() {
        let store = MemoryStore::new();
        let device = store.upsert_device("dev-1", None).await.unwrap();
        let reading = store.insert_reading(device.id, &vector(1.0)).await.unwrap();

        let input = NewPrediction {
            reading_id: reading.id,
            predicted_rul: 120.0,
            failure_label: FailureLabel::Normal,
        };
        store.insert_prediction(&input).await.unwrap();
        assert_matches!(
            store.insert_prediction(&input).await,
            Err(StoreError::DuplicatePrediction(id)) if id == reading.id
        );
        assert_eq!(store.prediction_count().await, 1);
    }

    #[tokio::test]
    async fn next_unpredicted_walks_readings_in_id_order() {
        let store = MemoryStore::new();
        let a = store
            .upsert_device("a", Some(ProductVariant::L))
            .await
            .unwrap();
        let b = store.upsert_device("b", None).await.unwrap();
        let r1 = store.insert_reading(a.id, &vector(1.0)).await.unwrap();
        let r2 = store.insert_reading(b.id, &vector(2.0)).await.unwrap();

        let next = store.next_unpredicted().await.unwrap().unwrap();
        assert_eq!(next.reading.id, r1.id);
        assert_eq!(next.variant(), Some(ProductVariant::L));

        store
            .insert_prediction(&NewPrediction {
                reading_id: r1.id,
                predicted_rul: 10.0,
                failure_label: FailureLabel::Normal,
            })
            .await
            .unwrap();

        let next = store.next_unpredicted().await.unwrap().unwrap();
        assert_eq!(next.reading.id, r2.id);
        assert_eq!(next.variant(), None);
    }

    #[tokio::test]
    async fn latest_window_returns_tail_oldest_first() {
        let store = MemoryStore::new();
        let device = store.upsert_device("dev-1", None).await.unwrap();
        for i in 0..5 {
            store
                .insert_reading(device.id, &vector(f64::from(i)))
                .await
                .unwrap();
        }

        let rows = store
            .readings_for_device(device.id, ReadingWindow::Latest { limit: 3 })
            .await
            .unwrap();
        let wear: Vec<f64> = rows.iter().map(|r| r.tool_wear).collect();
        assert_eq!(wear, vec![2.0, 3.0, 4.0]);
    }

    #[tokio::test]
    async fn range_window_is_inclusive_and_capped() {
        use crate::models::reading::TimeRange;
        use chrono::Duration;

        let store = MemoryStore::new();
        let device = store.upsert_device("dev-1", None).await.unwrap();
        let t0 = Utc::now();
        for i in 0..6 {
            store
                .insert_reading_at(device.id, &vector(f64::from(i)), t0 + Duration::seconds(i64::from(i)))
                .await
                .unwrap();
        }

        let range = TimeRange {
            start: t0 + Duration::seconds(1),
            end: t0 + Duration::seconds(4),
        };
        let rows = store
            .readings_for_device(device.id, ReadingWindow::Range { range, limit: 3 })
            .await
            .unwrap();
        let wear: Vec<f64> = rows.iter().map(|r| r.tool_wear).collect();
        assert_eq!(wear, vec![1.0, 2.0, 3.0]);
    }

    #[tokio::test]
    async fn latest_per_device_includes_prediction_when_present() {
        let store = MemoryStore::new();
        let a = store.upsert_device("a", None).await.unwrap();
        let b = store.upsert_device("b", None).await.unwrap();
        store.upsert_device("idle", None).await.unwrap();

        store.insert_reading(a.id, &vector(1.0)).await.unwrap();
        let a2 = store.insert_reading(a.id, &vector(2.0)).await.unwrap();
        store.insert_reading(b.id, &vector(3.0)).await.unwrap();
        store
            .insert_prediction(&NewPrediction {
                reading_id: a2.id,
                predicted_rul: 0.0,
                failure_label: FailureLabel::Twf,
            })
            .await
            .unwrap();

        let latest = store.latest_per_device().await.unwrap();
        assert_eq!(latest.len(), 2);
        assert_eq!(latest[0].reading.id, a2.id);
        assert_eq!(
            latest[0].prediction.as_ref().and_then(|p| p.label()),
            Some(FailureLabel::Twf)
        );
        assert!(latest[1].prediction.is_none());
    }
}
