//! Sensor vectors, product variants and the ingestion message shape.

use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Number of channels fed to the regression model.
pub const FEATURE_COUNT: usize = 5;

/// Converts rotational speed in rpm to angular velocity in rad/s.
pub const RPM_TO_RAD_PER_SEC: f64 = 2.0 * PI / 60.0;

// ---------------------------------------------------------------------------
// ProductVariant
// ---------------------------------------------------------------------------

/// Coarse equipment-quality tier shifting the overstrain threshold and the
/// simulated wear rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProductVariant {
    L,
    M,
    H,
}

impl ProductVariant {
    pub const ALL: [ProductVariant; 3] = [ProductVariant::L, ProductVariant::M, ProductVariant::H];

    pub fn as_str(self) -> &'static str {
        match self {
            ProductVariant::L => "L",
            ProductVariant::M => "M",
            ProductVariant::H => "H",
        }
    }

    /// Parse a stored or received variant, treating anything unrecognised
    /// as unknown rather than an error.
    pub fn parse_lenient(raw: Option<&str>) -> Option<Self> {
        raw.and_then(|s| s.parse().ok())
    }
}

impl fmt::Display for ProductVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProductVariant {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "L" | "l" => Ok(ProductVariant::L),
            "M" | "m" => Ok(ProductVariant::M),
            "H" | "h" => Ok(ProductVariant::H),
            other => Err(CoreError::Validation(format!(
                "unknown product variant '{other}', expected L, M or H"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// SensorVector
// ---------------------------------------------------------------------------

/// One periodic measurement of the five monitored channels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorVector {
    /// Ambient air temperature [K].
    pub air_temp: f64,
    /// Process temperature [K].
    pub process_temp: f64,
    /// Rotational speed [rpm].
    pub rotational_speed: f64,
    /// Torque [Nm].
    pub torque: f64,
    /// Accumulated tool wear [min].
    pub tool_wear: f64,
}

impl SensorVector {
    /// Feature order expected by the regression model.
    pub fn features(&self) -> [f64; FEATURE_COUNT] {
        [
            self.air_temp,
            self.process_temp,
            self.rotational_speed,
            self.torque,
            self.tool_wear,
        ]
    }

    /// Process minus air temperature [K].
    pub fn temp_difference(&self) -> f64 {
        self.process_temp - self.air_temp
    }

    /// Instantaneous mechanical power [W].
    pub fn mechanical_power(&self) -> f64 {
        self.torque * self.rotational_speed * RPM_TO_RAD_PER_SEC
    }

    /// Reject vectors containing NaN, infinite or negative channels.
    pub fn validate(&self) -> Result<(), CoreError> {
        let channels = [
            ("air_temp", self.air_temp),
            ("process_temp", self.process_temp),
            ("rotational_speed", self.rotational_speed),
            ("torque", self.torque),
            ("tool_wear", self.tool_wear),
        ];
        for (name, value) in channels {
            if !value.is_finite() {
                return Err(CoreError::Validation(format!(
                    "{name} must be a finite number, got {value}"
                )));
            }
            if value < 0.0 {
                return Err(CoreError::Validation(format!(
                    "{name} must not be negative, got {value}"
                )));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// SensorMessage
// ---------------------------------------------------------------------------

/// A reading as it crosses the ingestion boundary.
///
/// Every field is required; extra fields (the simulator adds `power`,
/// `scenario` and friends) are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorMessage {
    pub device_uid: String,
    pub product_type: String,
    pub air_temp: f64,
    pub process_temp: f64,
    pub rotational_speed: f64,
    pub torque: f64,
    pub tool_wear: f64,
}

impl SensorMessage {
    pub fn vector(&self) -> SensorVector {
        SensorVector {
            air_temp: self.air_temp,
            process_temp: self.process_temp,
            rotational_speed: self.rotational_speed,
            torque: self.torque,
            tool_wear: self.tool_wear,
        }
    }

    /// The declared variant, or `None` when the sender used an unknown tier.
    pub fn variant(&self) -> Option<ProductVariant> {
        ProductVariant::parse_lenient(Some(&self.product_type))
    }

    /// Check the identifier and every channel.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.device_uid.trim().is_empty() {
            return Err(CoreError::Validation("device_uid must not be empty".into()));
        }
        self.vector().validate()
    }
}
