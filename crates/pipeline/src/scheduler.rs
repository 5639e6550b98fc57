//! Prediction scheduler.
//!
//! Repeatedly takes the oldest reading without a prediction and writes
//! exactly one prediction for it. Several schedulers may share a store:
//! the store's uniqueness on the reading reference decides the race, so
//! no claim or lock is taken here.

use std::sync::Arc;
use std::time::Duration;

use fleetpulse_core::config;
use fleetpulse_core::error::CoreError;
use fleetpulse_core::failure::FailureClassifier;
use fleetpulse_core::types::DbId;
use fleetpulse_db::models::prediction::{NewPrediction, Prediction};
use fleetpulse_db::models::reading::PendingReading;
use fleetpulse_db::{SensorStore, StoreError};
use tokio_util::sync::CancellationToken;

use crate::model::{ModelError, RulModel};

/// Sleep when nothing is pending.
const DEFAULT_IDLE: Duration = Duration::from_millis(100);

/// Sleep after a store error or a reading that could not be predicted.
const DEFAULT_BACKOFF: Duration = Duration::from_secs(5);

/// Below this rotational speed [rpm] the machine is treated as stopped.
pub const DEFAULT_MIN_OPERATING_SPEED: f64 = 500.0;

#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerConfig {
    pub idle: Duration,
    pub backoff: Duration,
    pub min_operating_speed: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            idle: DEFAULT_IDLE,
            backoff: DEFAULT_BACKOFF,
            min_operating_speed: DEFAULT_MIN_OPERATING_SPEED,
        }
    }
}

impl SchedulerConfig {
    /// `SCHEDULER_IDLE_MS`, `SCHEDULER_BACKOFF_SECS`, `MIN_OPERATING_SPEED`.
    pub fn from_env() -> Result<Self, CoreError> {
        let idle_ms: u64 = config::env_or("SCHEDULER_IDLE_MS", 100)?;
        let backoff_secs: u64 = config::env_or("SCHEDULER_BACKOFF_SECS", 5)?;
        let min_operating_speed =
            config::env_or("MIN_OPERATING_SPEED", DEFAULT_MIN_OPERATING_SPEED)?;
        Ok(Self {
            idle: Duration::from_millis(idle_ms),
            backoff: Duration::from_secs(backoff_secs),
            min_operating_speed,
        })
    }
}

/// Why a single reading could not be predicted. The reading stays pending.
#[derive(Debug, thiserror::Error)]
pub enum PredictError {
    #[error(transparent)]
    Classifier(#[from] CoreError),

    #[error(transparent)]
    Model(#[from] ModelError),
}

/// Result of one scheduling iteration.
#[derive(Debug)]
pub enum StepOutcome {
    /// Nothing was pending.
    Idle,
    Predicted(Prediction),
    /// Another scheduler predicted this reading first.
    Duplicate(DbId),
    /// Classification or inference failed; the reading will be retried.
    Deferred(DbId),
}

pub struct PredictionScheduler {
    store: Arc<dyn SensorStore>,
    model: Arc<dyn RulModel>,
    classifier: FailureClassifier,
    config: SchedulerConfig,
}

impl PredictionScheduler {
    pub fn new(
        store: Arc<dyn SensorStore>,
        model: Arc<dyn RulModel>,
        classifier: FailureClassifier,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            store,
            model,
            classifier,
            config,
        }
    }

    /// Run until `cancel` fires.
    ///
    /// Transient store errors back off and retry. Loss of the store
    /// connection is returned to the caller.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), StoreError> {
        tracing::info!(
            idle_ms = self.config.idle.as_millis() as u64,
            backoff_secs = self.config.backoff.as_secs(),
            model = %self.model.describe(),
            "Prediction scheduler started",
        );

        while !cancel.is_cancelled() {
            let pause = match self.step().await {
                Ok(StepOutcome::Idle) => Some(self.config.idle),
                Ok(StepOutcome::Predicted(_)) | Ok(StepOutcome::Duplicate(_)) => None,
                Ok(StepOutcome::Deferred(_)) => Some(self.config.backoff),
                Err(e) if e.is_fatal() => {
                    tracing::error!(error = %e, "Prediction scheduler lost its store");
                    return Err(e);
                }
                Err(e) => {
                    tracing::error!(error = %e, "Scheduling iteration failed");
                    Some(self.config.backoff)
                }
            };

            if let Some(duration) = pause {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(duration) => {}
                }
            }
        }

        tracing::info!("Prediction scheduler shutting down");
        Ok(())
    }

    /// One iteration: select, predict and persist the oldest pending reading.
    pub async fn step(&self) -> Result<StepOutcome, StoreError> {
        let Some(pending) = self.store.next_unpredicted().await? else {
            tracing::trace!("No pending readings");
            return Ok(StepOutcome::Idle);
        };
        let reading_id = pending.reading.id;

        let input = match self.predict(&pending).await {
            Ok(input) => input,
            Err(e) => {
                tracing::warn!(reading_id, error = %e, "Prediction deferred");
                return Ok(StepOutcome::Deferred(reading_id));
            }
        };

        match self.store.insert_prediction(&input).await {
            Ok(prediction) => {
                tracing::debug!(
                    reading_id,
                    rul = prediction.predicted_rul,
                    label = %prediction.failure_label,
                    "Prediction stored",
                );
                Ok(StepOutcome::Predicted(prediction))
            }
            Err(StoreError::DuplicatePrediction(id)) => {
                tracing::debug!(reading_id = id, "Reading already predicted elsewhere");
                Ok(StepOutcome::Duplicate(id))
            }
            Err(e) => Err(e),
        }
    }

    /// Classify, then ask the model only for healthy running machines.
    pub async fn predict(&self, pending: &PendingReading) -> Result<NewPrediction, PredictError> {
        let vector = pending.reading.vector();
        let label = {
            let mut rng = rand::rng();
            self.classifier.classify(&vector, pending.variant(), None, &mut rng)?
        };

        // A stopped machine has no meaningful remaining life.
        let stopped = vector.rotational_speed < self.config.min_operating_speed;
        let predicted_rul = if label.is_failure() || stopped {
            0.0
        } else {
            self.model.predict(&vector.features()).await?.max(0.0)
        };

        Ok(NewPrediction {
            reading_id: pending.reading.id,
            predicted_rul,
            failure_label: label,
        })
    }
}
