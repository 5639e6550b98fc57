//! Visible device state pushed to subscribers and served by `/devices/latest`.

use fleetpulse_core::failure::{FailureClassifier, FailureLabel};
use fleetpulse_core::message_types::MSG_TYPE_LIVE_DATA;
use fleetpulse_core::status::{self, HealthStatus};
use fleetpulse_core::types::{DbId, Timestamp};
use fleetpulse_db::models::reading::LatestState;
use serde::Serialize;

/// Identifies the latest (reading, prediction) pair of a device. A new
/// reading or a prediction arriving for the current reading changes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiveSignature {
    pub reading_id: DbId,
    pub prediction_id: Option<DbId>,
}

impl LiveSignature {
    pub fn of(state: &LatestState) -> Self {
        Self {
            reading_id: state.reading.id,
            prediction_id: state.prediction.as_ref().map(|p| p.id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionView {
    /// `None` until the scheduler reaches the reading.
    pub rul: Option<f64>,
    pub failure_pred: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LivePayload {
    pub device_uid: String,
    pub product_type: Option<String>,
    pub air_temp: f64,
    pub process_temp: f64,
    pub rotational_speed: f64,
    pub torque: f64,
    pub tool_wear: f64,
    pub timestamp: Timestamp,
    pub prediction: PredictionView,
    /// Deterministic rules evaluated on the raw reading.
    pub detected_failure: FailureLabel,
    pub status: HealthStatus,
    #[serde(rename = "type")]
    pub msg_type: &'static str,
}

impl LivePayload {
    /// Format the visible state of one device.
    ///
    /// The status uses the detected failure when there is one, otherwise
    /// the stored prediction's label, so a nuisance failure recorded by the
    /// scheduler still shows as an emergency.
    pub fn from_state(state: &LatestState, classifier: &FailureClassifier) -> Self {
        let reading = &state.reading;
        let detected = classifier
            .classify_rules(&reading.vector(), state.device.variant(), None)
            .unwrap_or_else(|e| {
                tracing::warn!(reading_id = reading.id, error = %e, "Stored reading failed validation");
                FailureLabel::Normal
            });

        let predicted = state.prediction.as_ref();
        let effective = if detected.is_failure() {
            detected
        } else {
            predicted
                .and_then(|p| p.label())
                .unwrap_or(FailureLabel::Normal)
        };
        let rul = predicted.map(|p| p.predicted_rul);

        Self {
            device_uid: state.device.device_uid.clone(),
            product_type: state.device.product_type.clone(),
            air_temp: reading.air_temp,
            process_temp: reading.process_temp,
            rotational_speed: reading.rotational_speed,
            torque: reading.torque,
            tool_wear: reading.tool_wear,
            timestamp: reading.timestamp,
            prediction: PredictionView {
                rul,
                failure_pred: predicted.map(|p| p.failure_label.clone()),
            },
            detected_failure: detected,
            status: status::resolve(effective, rul),
            msg_type: MSG_TYPE_LIVE_DATA,
        }
    }
}
