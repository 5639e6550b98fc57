//! Rule-based failure classifier.
//!
//! A fixed priority chain evaluated against a single sensor vector:
//!
//! 1. **TWF** tool wear at or above the wear limit
//! 2. **HDF** small temperature difference at low speed
//! 3. **PWF** mechanical power outside the allowed band
//! 4. **OSF** wear x torque above the variant's overstrain threshold
//! 5. **RNF** a random nuisance failure with small fixed probability
//!
//! The first matching rule wins. Every call site (prediction scheduler,
//! live payloads, device simulator) uses this one order.

use std::fmt;
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config;
use crate::error::CoreError;
use crate::sensor::{ProductVariant, SensorVector};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Global tool-wear limit used by the live-serving path [min].
pub const DEFAULT_WEAR_LIMIT: f64 = 220.0;

/// HDF fires when process minus air temperature is below this [K] ...
pub const HDF_TEMP_DIFF_THRESHOLD: f64 = 8.6;

/// ... and rotational speed is below this [rpm].
pub const HDF_SPEED_THRESHOLD: f64 = 1380.0;

/// Lower bound of the allowed mechanical power band [W].
pub const POWER_MIN_WATTS: f64 = 3500.0;

/// Upper bound of the allowed mechanical power band [W].
pub const POWER_MAX_WATTS: f64 = 9000.0;

/// Overstrain thresholds (wear x torque) per product variant.
pub const OSF_THRESHOLD_L: f64 = 11_000.0;
pub const OSF_THRESHOLD_M: f64 = 12_000.0;
pub const OSF_THRESHOLD_H: f64 = 13_000.0;

/// Per-evaluation probability of a random nuisance failure.
pub const DEFAULT_NUISANCE_PROBABILITY: f64 = 0.001;

/// Deterministic rules in evaluation order. RNF is always evaluated last.
pub const RULE_ORDER: [FailureLabel; 4] = [
    FailureLabel::Twf,
    FailureLabel::Hdf,
    FailureLabel::Pwf,
    FailureLabel::Osf,
];

// ---------------------------------------------------------------------------
// FailureLabel
// ---------------------------------------------------------------------------

/// The fixed failure taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureLabel {
    Normal,
    #[serde(rename = "TWF")]
    Twf,
    #[serde(rename = "HDF")]
    Hdf,
    #[serde(rename = "PWF")]
    Pwf,
    #[serde(rename = "OSF")]
    Osf,
    #[serde(rename = "RNF")]
    Rnf,
}

impl FailureLabel {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureLabel::Normal => "Normal",
            FailureLabel::Twf => "TWF",
            FailureLabel::Hdf => "HDF",
            FailureLabel::Pwf => "PWF",
            FailureLabel::Osf => "OSF",
            FailureLabel::Rnf => "RNF",
        }
    }

    pub fn is_failure(self) -> bool {
        self != FailureLabel::Normal
    }
}

impl fmt::Display for FailureLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FailureLabel {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Normal" => Ok(FailureLabel::Normal),
            "TWF" => Ok(FailureLabel::Twf),
            "HDF" => Ok(FailureLabel::Hdf),
            "PWF" => Ok(FailureLabel::Pwf),
            "OSF" => Ok(FailureLabel::Osf),
            "RNF" => Ok(FailureLabel::Rnf),
            other => Err(CoreError::Validation(format!("unknown failure label '{other}'"))),
        }
    }
}

// ---------------------------------------------------------------------------
// FailureThresholds
// ---------------------------------------------------------------------------

/// Threshold set used by [`FailureClassifier`].
#[derive(Debug, Clone, PartialEq)]
pub struct FailureThresholds {
    pub wear_limit: f64,
    pub temp_diff: f64,
    pub speed: f64,
    pub power_min: f64,
    pub power_max: f64,
    pub overstrain_l: f64,
    pub overstrain_m: f64,
    pub overstrain_h: f64,
    pub nuisance_probability: f64,
}

impl Default for FailureThresholds {
    fn default() -> Self {
        Self {
            wear_limit: DEFAULT_WEAR_LIMIT,
            temp_diff: HDF_TEMP_DIFF_THRESHOLD,
            speed: HDF_SPEED_THRESHOLD,
            power_min: POWER_MIN_WATTS,
            power_max: POWER_MAX_WATTS,
            overstrain_l: OSF_THRESHOLD_L,
            overstrain_m: OSF_THRESHOLD_M,
            overstrain_h: OSF_THRESHOLD_H,
            nuisance_probability: DEFAULT_NUISANCE_PROBABILITY,
        }
    }
}

impl FailureThresholds {
    /// Defaults, with `WEAR_LIMIT` and `RNF_PROBABILITY` overridable.
    pub fn from_env() -> Result<Self, CoreError> {
        let thresholds = Self {
            wear_limit: config::env_or("WEAR_LIMIT", DEFAULT_WEAR_LIMIT)?,
            nuisance_probability: config::env_or("RNF_PROBABILITY", DEFAULT_NUISANCE_PROBABILITY)?,
            ..Self::default()
        };
        thresholds.validate()?;
        Ok(thresholds)
    }

    /// Same thresholds with nuisance failures switched off.
    pub fn without_nuisance(mut self) -> Self {
        self.nuisance_probability = 0.0;
        self
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if !(self.wear_limit.is_finite() && self.wear_limit > 0.0) {
            return Err(CoreError::Validation(format!(
                "wear limit must be positive, got {}",
                self.wear_limit
            )));
        }
        if !(0.0..=1.0).contains(&self.nuisance_probability) {
            return Err(CoreError::Validation(format!(
                "nuisance probability must be between 0.0 and 1.0, got {}",
                self.nuisance_probability
            )));
        }
        if self.power_min >= self.power_max {
            return Err(CoreError::Validation(
                "power_min must be below power_max".to_string(),
            ));
        }
        Ok(())
    }

    /// Overstrain threshold for a variant; unknown variants get the lowest tier.
    pub fn overstrain_threshold(&self, variant: Option<ProductVariant>) -> f64 {
        match variant {
            Some(ProductVariant::M) => self.overstrain_m,
            Some(ProductVariant::H) => self.overstrain_h,
            Some(ProductVariant::L) | None => self.overstrain_l,
        }
    }
}

// ---------------------------------------------------------------------------
// FailureClassifier
// ---------------------------------------------------------------------------

/// Stateless evaluator of the priority chain.
#[derive(Debug, Clone, Default)]
pub struct FailureClassifier {
    thresholds: FailureThresholds,
}

impl FailureClassifier {
    pub fn new(thresholds: FailureThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &FailureThresholds {
        &self.thresholds
    }

    /// Full chain including the random nuisance rule.
    ///
    /// `wear_limit` overrides the global limit (the simulator draws one per
    /// device). Identical inputs and an identically seeded `rng` always give
    /// the same label.
    pub fn classify<R: Rng + ?Sized>(
        &self,
        vector: &SensorVector,
        variant: Option<ProductVariant>,
        wear_limit: Option<f64>,
        rng: &mut R,
    ) -> Result<FailureLabel, CoreError> {
        let label = self.classify_rules(vector, variant, wear_limit)?;
        if label.is_failure() {
            return Ok(label);
        }
        if self.thresholds.nuisance_probability > 0.0
            && rng.random::<f64>() < self.thresholds.nuisance_probability
        {
            return Ok(FailureLabel::Rnf);
        }
        Ok(FailureLabel::Normal)
    }

    /// Deterministic rules 1-4 only. Never returns [`FailureLabel::Rnf`].
    pub fn classify_rules(
        &self,
        vector: &SensorVector,
        variant: Option<ProductVariant>,
        wear_limit: Option<f64>,
    ) -> Result<FailureLabel, CoreError> {
        vector.validate()?;
        let wear_limit = match wear_limit {
            Some(limit) if !(limit.is_finite() && limit > 0.0) => {
                return Err(CoreError::Validation(format!(
                    "wear limit must be positive, got {limit}"
                )));
            }
            Some(limit) => limit,
            None => self.thresholds.wear_limit,
        };

        let label = RULE_ORDER
            .into_iter()
            .find(|rule| self.rule_matches(*rule, vector, variant, wear_limit))
            .unwrap_or(FailureLabel::Normal);
        Ok(label)
    }

    fn rule_matches(
        &self,
        rule: FailureLabel,
        v: &SensorVector,
        variant: Option<ProductVariant>,
        wear_limit: f64,
    ) -> bool {
        let t = &self.thresholds;
        match rule {
            FailureLabel::Twf => v.tool_wear >= wear_limit,
            FailureLabel::Hdf => v.temp_difference() < t.temp_diff && v.rotational_speed < t.speed,
            FailureLabel::Pwf => {
                let power = v.mechanical_power();
                power < t.power_min || power > t.power_max
            }
            FailureLabel::Osf => v.tool_wear * v.torque > t.overstrain_threshold(variant),
            FailureLabel::Normal | FailureLabel::Rnf => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;

    fn nominal() -> SensorVector {
        SensorVector {
            air_temp: 300.0,
            process_temp: 310.0,
            rotational_speed: 1500.0,
            torque: 40.0,
            tool_wear: 10.0,
        }
    }

    fn deterministic() -> FailureClassifier {
        FailureClassifier::new(FailureThresholds::default().without_nuisance())
    }

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    #[test]
    fn nominal_vector_is_normal() {
        let label = deterministic()
            .classify(&nominal(), Some(ProductVariant::L), None, &mut rng())
            .unwrap();
        assert_eq!(label, FailureLabel::Normal);
    }

    #[test]
    fn excessive_wear_is_twf() {
        let v = SensorVector {
            tool_wear: 225.0,
            torque: 30.0,
            ..nominal()
        };
        let label = deterministic().classify_rules(&v, None, None).unwrap();
        assert_eq!(label, FailureLabel::Twf);
    }

    #[test]
    fn wear_limit_override_applies() {
        let v = SensorVector {
            tool_wear: 205.0,
            torque: 30.0,
            ..nominal()
        };
        let c = deterministic();
        assert_eq!(c.classify_rules(&v, None, None).unwrap(), FailureLabel::Normal);
        assert_eq!(
            c.classify_rules(&v, None, Some(200.0)).unwrap(),
            FailureLabel::Twf
        );
    }

    #[test]
    fn small_temp_difference_at_low_speed_is_hdf() {
        let v = SensorVector {
            process_temp: 305.0,
            air_temp: 300.0,
            rotational_speed: 1200.0,
            ..nominal()
        };
        assert_eq!(
            deterministic().classify_rules(&v, None, None).unwrap(),
            FailureLabel::Hdf
        );
    }

    #[test]
    fn small_temp_difference_at_high_speed_is_not_hdf() {
        let v = SensorVector {
            process_temp: 305.0,
            ..nominal()
        };
        assert_eq!(
            deterministic().classify_rules(&v, None, None).unwrap(),
            FailureLabel::Normal
        );
    }

    #[test]
    fn low_power_is_pwf() {
        let v = SensorVector {
            torque: 20.0,
            rotational_speed: 1000.0,
            ..nominal()
        };
        assert!(v.mechanical_power() < POWER_MIN_WATTS);
        assert_eq!(
            deterministic().classify_rules(&v, None, None).unwrap(),
            FailureLabel::Pwf
        );
    }

    #[test]
    fn high_power_is_pwf() {
        let v = SensorVector {
            torque: 65.0,
            rotational_speed: 2900.0,
            ..nominal()
        };
        assert_eq!(
            deterministic().classify_rules(&v, None, None).unwrap(),
            FailureLabel::Pwf
        );
    }

    #[test]
    fn overstrain_depends_on_variant() {
        // 150 * 80 = 12000; power at 1000 rpm is ~8378 W (inside the band).
        let v = SensorVector {
            tool_wear: 150.0,
            torque: 80.0,
            rotational_speed: 1000.0,
            ..nominal()
        };
        let c = deterministic();
        assert_eq!(
            c.classify_rules(&v, Some(ProductVariant::L), None).unwrap(),
            FailureLabel::Osf
        );
        assert_eq!(
            c.classify_rules(&v, None, None).unwrap(),
            FailureLabel::Osf,
            "unknown variant falls back to the lowest tier"
        );
        assert_eq!(
            c.classify_rules(&v, Some(ProductVariant::H), None).unwrap(),
            FailureLabel::Normal
        );
    }

    #[test]
    fn earlier_rule_wins_when_several_match() {
        // Matches TWF, PWF and OSF at once.
        let v = SensorVector {
            tool_wear: 230.0,
            torque: 80.0,
            rotational_speed: 2000.0,
            ..nominal()
        };
        assert_eq!(
            deterministic().classify_rules(&v, None, None).unwrap(),
            FailureLabel::Twf
        );

        // Matches HDF and PWF: HDF is evaluated first.
        let v = SensorVector {
            process_temp: 305.0,
            rotational_speed: 1200.0,
            torque: 20.0,
            ..nominal()
        };
        assert_eq!(
            deterministic().classify_rules(&v, None, None).unwrap(),
            FailureLabel::Hdf
        );
    }

    #[test]
    fn nuisance_rule_fires_when_certain() {
        let thresholds = FailureThresholds {
            nuisance_probability: 1.0,
            ..FailureThresholds::default()
        };
        let c = FailureClassifier::new(thresholds);
        assert_eq!(
            c.classify(&nominal(), None, None, &mut rng()).unwrap(),
            FailureLabel::Rnf
        );
    }

    #[test]
    fn deterministic_failure_beats_nuisance() {
        let thresholds = FailureThresholds {
            nuisance_probability: 1.0,
            ..FailureThresholds::default()
        };
        let v = SensorVector {
            tool_wear: 225.0,
            torque: 30.0,
            ..nominal()
        };
        let label = FailureClassifier::new(thresholds)
            .classify(&v, None, None, &mut rng())
            .unwrap();
        assert_eq!(label, FailureLabel::Twf);
    }

    #[test]
    fn same_input_and_seed_gives_same_label() {
        let c = FailureClassifier::new(FailureThresholds {
            nuisance_probability: 0.5,
            ..FailureThresholds::default()
        });
        let first: Vec<_> = {
            let mut r = rng();
            (0..50)
                .map(|_| c.classify(&nominal(), None, None, &mut r).unwrap())
                .collect()
        };
        let second: Vec<_> = {
            let mut r = rng();
            (0..50)
                .map(|_| c.classify(&nominal(), None, None, &mut r).unwrap())
                .collect()
        };
        assert_eq!(first, second);
    }

    #[test]
    fn invalid_vector_is_rejected() {
        let v = SensorVector {
            air_temp: f64::NAN,
            ..nominal()
        };
        assert_matches!(
            deterministic().classify_rules(&v, None, None),
            Err(CoreError::Validation(_))
        );
    }

    #[test]
    fn invalid_wear_limit_is_rejected() {
        assert_matches!(
            deterministic().classify_rules(&nominal(), None, Some(0.0)),
            Err(CoreError::Validation(_))
        );
    }

    #[test]
    fn label_string_round_trip() {
        for label in [
            FailureLabel::Normal,
            FailureLabel::Twf,
            FailureLabel::Hdf,
            FailureLabel::Pwf,
            FailureLabel::Osf,
            FailureLabel::Rnf,
        ] {
            assert_eq!(label.as_str().parse::<FailureLabel>().unwrap(), label);
        }
        assert_eq!(
            serde_json::to_value(FailureLabel::Hdf).unwrap(),
            serde_json::json!("HDF")
        );
    }

    #[test]
    fn threshold_validation_rejects_bad_probability() {
        let t = FailureThresholds {
            nuisance_probability: 1.5,
            ..FailureThresholds::default()
        };
        assert!(t.validate().is_err());
    }
}
