//! Prediction entity: exactly one per sensor reading.

use fleetpulse_core::failure::FailureLabel;
use fleetpulse_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `predictions` table. Immutable once written.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Prediction {
    pub id: DbId,
    pub reading_id: DbId,
    /// Remaining useful life [hours], never negative.
    pub predicted_rul: f64,
    pub failure_label: String,
    pub created_at: Timestamp,
}

impl Prediction {
    /// Parsed label; `None` only for rows written outside this system.
    pub fn label(&self) -> Option<FailureLabel> {
        self.failure_label.parse().ok()
    }
}

/// DTO for recording a prediction.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPrediction {
    pub reading_id: DbId,
    pub predicted_rul: f64,
    pub failure_label: FailureLabel,
}
