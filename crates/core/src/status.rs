//! Device health status resolution.

use serde::{Deserialize, Serialize};

use crate::failure::FailureLabel;

/// Predicted remaining life below which a healthy device is flagged [hours].
pub const RISK_RUL_HOURS: f64 = 50.0;

/// Visible health of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Normal,
    Risk,
    Emergency,
}

/// Combine a failure label with the latest RUL estimate, if any.
///
/// A failure always wins; otherwise a short remaining life means risk.
/// No history is consulted.
pub fn resolve(failure: FailureLabel, rul: Option<f64>) -> HealthStatus {
    if failure.is_failure() {
        return HealthStatus::Emergency;
    }
    match rul {
        Some(hours) if hours < RISK_RUL_HOURS => HealthStatus::Risk,
        _ => HealthStatus::Normal,
    }
}
