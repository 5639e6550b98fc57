//! Ingestion boundary: turn a raw sensor message into a stored reading.

use std::sync::Arc;

use fleetpulse_core::error::CoreError;
use fleetpulse_core::sensor::SensorMessage;
use fleetpulse_db::models::reading::SensorReading;
use fleetpulse_db::{SensorStore, StoreError};
use serde_json::Value;

/// Fields every sensor message must carry.
pub const REQUIRED_FIELDS: [&str; 7] = [
    "device_uid",
    "product_type",
    "air_temp",
    "process_temp",
    "rotational_speed",
    "torque",
    "tool_wear",
];

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("Missing required field '{0}'")]
    MissingField(&'static str),

    #[error("Invalid sensor message: {0}")]
    Invalid(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<CoreError> for IngestError {
    fn from(err: CoreError) -> Self {
        IngestError::Invalid(err.to_string())
    }
}

/// Persists validated sensor messages, creating devices on first sight.
#[derive(Clone)]
pub struct Ingestor {
    store: Arc<dyn SensorStore>,
}

impl Ingestor {
    pub fn new(store: Arc<dyn SensorStore>) -> Self {
        Self { store }
    }

    /// Parse an untyped payload and store it.
    pub async fn ingest_value(&self, payload: Value) -> Result<SensorReading, IngestError> {
        let message = parse_message(payload)?;
        self.ingest(&message).await
    }

    /// Validate and store one message.
    ///
    /// An unrecognised `product_type` leaves the device variant unknown so a
    /// later valid message can fill it in.
    pub async fn ingest(&self, message: &SensorMessage) -> Result<SensorReading, IngestError> {
        message.validate()?;
        let device = self
            .store
            .upsert_device(&message.device_uid, message.variant())
            .await?;
        let reading = self.store.insert_reading(device.id, &message.vector()).await?;
        tracing::debug!(
            device_uid = %message.device_uid,
            reading_id = reading.id,
            "Sensor reading stored",
        );
        Ok(reading)
    }

    /// Store a payload, logging and dropping it when it is malformed.
    ///
    /// Store failures are still returned so the caller can decide whether
    /// the transport should keep going.
    pub async fn ingest_or_drop(&self, payload: Value) -> Result<Option<SensorReading>, StoreError> {
        match self.ingest_value(payload).await {
            Ok(reading) => Ok(Some(reading)),
            Err(IngestError::Store(e)) => Err(e),
            Err(e) => {
                tracing::warn!(error = %e, "Dropping sensor message");
                Ok(None)
            }
        }
    }
}

/// Check required fields first so the warning names what is missing.
pub fn parse_message(payload: Value) -> Result<SensorMessage, IngestError> {
    let Some(object) = payload.as_object() else {
        return Err(IngestError::Invalid("expected a JSON object".into()));
    };
    if let Some(missing) = REQUIRED_FIELDS
        .into_iter()
        .find(|field| object.get(*field).filter(|v| !v.is_null()).is_none())
    {
        return Err(IngestError::MissingField(missing));
    }
    serde_json::from_value(payload).map_err(|e| IngestError::Invalid(e.to_string()))
}
