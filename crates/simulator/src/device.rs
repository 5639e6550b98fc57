//! Per-device simulation state machine.
//!
//! A device is `Healthy` until the classifier reports a failure on one of
//! its samples, then `Failed` until a control command resets it. The
//! device is a plain value; the runtime gives each one to its own task.

use fleetpulse_core::command::{CommandOutcome, ControlAction, ControlCommand, Scenario};
use fleetpulse_core::failure::{FailureClassifier, FailureLabel};
use fleetpulse_core::sensor::{ProductVariant, SensorVector};
use fleetpulse_core::types::Timestamp;
use rand::rngs::StdRng;
use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::Serialize;

use crate::degradation;
use crate::signal::{SignalTable, TableParams};

/// Tool-wear limit is drawn uniformly from this range per reset [min].
pub const WEAR_LIMIT_RANGE: std::ops::RangeInclusive<u32> = 200..=240;

/// Share of the table's wear channel added to accumulated wear.
const TABLE_WEAR_SHARE: f64 = 0.3;

/// Measurement noise per channel (air, process, speed, torque).
const NOISE_STD: [f64; 4] = [0.5, 0.3, 10.0, 1.0];

/// Wear accumulated per tick for a variant, before the multiplier.
pub fn wear_rate(variant: ProductVariant) -> f64 {
    match variant {
        ProductVariant::L => 0.2,
        ProductVariant::M => 0.3,
        ProductVariant::H => 0.5,
    }
}

/// Draw a product variant: L 50 %, M 30 %, H 20 %.
pub fn draw_variant<R: Rng + ?Sized>(rng: &mut R) -> ProductVariant {
    let r: f64 = rng.random();
    if r < 0.5 {
        ProductVariant::L
    } else if r < 0.8 {
        ProductVariant::M
    } else {
        ProductVariant::H
    }
}

fn round_to(value: f64, digits: i32) -> f64 {
    let factor = 10f64.powi(digits);
    (value * factor).round() / factor
}

// ---------------------------------------------------------------------------
// Output record
// ---------------------------------------------------------------------------

/// One published sample. Carries the ingestion fields plus simulator state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulatorReading {
    pub device_uid: String,
    pub product_type: ProductVariant,
    pub air_temp: f64,
    pub process_temp: f64,
    pub rotational_speed: f64,
    pub torque: f64,
    pub tool_wear: f64,
    pub power: f64,
    pub failure_type: FailureLabel,
    pub scenario: Scenario,
    pub is_failed: bool,
    pub timestamp: Timestamp,
}

impl SimulatorReading {
    pub fn vector(&self) -> SensorVector {
        SensorVector {
            air_temp: self.air_temp,
            process_temp: self.process_temp,
            rotational_speed: self.rotational_speed,
            torque: self.torque,
            tool_wear: self.tool_wear,
        }
    }
}

// ---------------------------------------------------------------------------
// Device
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DeviceState {
    Healthy,
    Failed {
        label: FailureLabel,
        since: Timestamp,
        /// Sample on which the failure fired; degradation starts here.
        at_failure: SensorVector,
    },
}

/// Tunables shared by every device of a runtime.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeviceParams {
    pub table_len: usize,
    pub wear_multiplier: f64,
}

pub struct SimulatedDevice {
    device_uid: String,
    classifier: FailureClassifier,
    params: DeviceParams,
    rng: StdRng,
    scenario: Scenario,
    variant: ProductVariant,
    wear_limit: f64,
    accumulated_wear: f64,
    index: usize,
    table: SignalTable,
    state: DeviceState,
}

impl SimulatedDevice {
    pub fn new(
        device_uid: impl Into<String>,
        scenario: Scenario,
        classifier: FailureClassifier,
        params: DeviceParams,
        rng: StdRng,
    ) -> Self {
        let mut device = Self {
            device_uid: device_uid.into(),
            classifier,
            params,
            rng,
            scenario,
            // Drawn by reset.
            variant: ProductVariant::L,
            wear_limit: 0.0,
            accumulated_wear: 0.0,
            index: 0,
            table: SignalTable::default(),
            state: DeviceState::Healthy,
        };
        device.reset(scenario);
        device
    }

    pub fn device_uid(&self) -> &str {
        &self.device_uid
    }

    pub fn scenario(&self) -> Scenario {
        self.scenario
    }

    pub fn variant(&self) -> ProductVariant {
        self.variant
    }

    pub fn wear_limit(&self) -> f64 {
        self.wear_limit
    }

    pub fn accumulated_wear(&self) -> f64 {
        self.accumulated_wear
    }

    pub fn state(&self) -> DeviceState {
        self.state
    }

    pub fn table(&self) -> &SignalTable {
        &self.table
    }

    /// Full reset: new variant, wear limit and table for `scenario`.
    pub fn reset(&mut self, scenario: Scenario) {
        self.scenario = scenario;
        self.variant = draw_variant(&mut self.rng);
        self.wear_limit = f64::from(self.rng.random_range(WEAR_LIMIT_RANGE));
        self.accumulated_wear = 0.0;
        self.index = 0;
        self.state = DeviceState::Healthy;

        let params = TableParams {
            scenario,
            len: self.params.table_len,
            wear_limit: self.wear_limit,
            overstrain_threshold: self
                .classifier
                .thresholds()
                .overstrain_threshold(Some(self.variant)),
        };
        self.table = SignalTable::generate(&params, &mut self.rng);

        tracing::info!(
            device_uid = %self.device_uid,
            scenario = %scenario,
            variant = %self.variant,
            wear_limit = self.wear_limit,
            "Device reset",
        );
    }

    /// Halve accumulated wear and clear the failure. The table, variant and
    /// wear limit are kept.
    pub fn repair_partial(&mut self) {
        self.accumulated_wear /= 2.0;
        self.state = DeviceState::Healthy;
        tracing::info!(
            device_uid = %self.device_uid,
            accumulated_wear = self.accumulated_wear,
            "Device partially repaired",
        );
    }

    /// Apply a control command and describe the result.
    pub fn apply(&mut self, command: &ControlCommand) -> CommandOutcome {
        let scenario = match command.scenario() {
            Ok(scenario) => scenario,
            Err(e) => return CommandOutcome::error(&self.device_uid, e.to_string()),
        };

        match command.action {
            ControlAction::Repair => {
                let scenario = scenario.unwrap_or(Scenario::Normal);
                self.reset(scenario);
                CommandOutcome::success(
                    &self.device_uid,
                    format!("Full repair done, scenario '{scenario}'"),
                )
            }
            ControlAction::RepairPartial => {
                self.repair_partial();
                CommandOutcome::success(&self.device_uid, "Partial repair done")
            }
            ControlAction::ChangeScenario => match scenario {
                Some(scenario) => {
                    self.reset(scenario);
                    CommandOutcome::success(
                        &self.device_uid,
                        format!("Scenario set to '{scenario}', state reset"),
                    )
                }
                None => CommandOutcome::error(&self.device_uid, "change_scenario requires a scenario"),
            },
        }
    }

    /// Produce the next sample at time `now`.
    pub fn tick(&mut self, now: Timestamp) -> SimulatorReading {
        let vector = match self.state {
            DeviceState::Healthy => self.tick_healthy(now),
            DeviceState::Failed {
                label,
                since,
                at_failure,
            } => {
                let elapsed = (now - since).num_milliseconds() as f64 / 1000.0;
                degradation::degrade(&at_failure, label, elapsed)
            }
        };
        self.index = self.index.wrapping_add(1);
        self.record(vector, now)
    }

    fn tick_healthy(&mut self, now: Timestamp) -> SensorVector {
        self.accumulated_wear += wear_rate(self.variant) * self.params.wear_multiplier;

        let base = self.table.row(self.index);
        let [air_std, process_std, speed_std, torque_std] = NOISE_STD;
        let vector = SensorVector {
            air_temp: base.air_temp + noise(&mut self.rng, air_std),
            process_temp: base.process_temp + noise(&mut self.rng, process_std),
            rotational_speed: (base.rotational_speed + noise(&mut self.rng, speed_std)).max(0.0),
            torque: (base.torque + noise(&mut self.rng, torque_std)).max(0.0),
            tool_wear: self.accumulated_wear + base.tool_wear * TABLE_WEAR_SHARE,
        };

        let classified = if self.scenario.allows_nuisance() {
            self.classifier
                .classify(&vector, Some(self.variant), Some(self.wear_limit), &mut self.rng)
        } else {
            self.classifier
                .classify_rules(&vector, Some(self.variant), Some(self.wear_limit))
        };
        let label = classified.unwrap_or_else(|e| {
            tracing::warn!(device_uid = %self.device_uid, error = %e, "Generated sample failed validation");
            FailureLabel::Normal
        });

        if label.is_failure() {
            tracing::warn!(
                device_uid = %self.device_uid,
                failure = %label,
                air_temp = vector.air_temp,
                process_temp = vector.process_temp,
                rotational_speed = vector.rotational_speed,
                torque = vector.torque,
                tool_wear = vector.tool_wear,
                "Failure detected",
            );
            self.state = DeviceState::Failed {
                label,
                since: now,
                at_failure: vector,
            };
        }
        vector
    }

    fn record(&self, vector: SensorVector, now: Timestamp) -> SimulatorReading {
        let (failure_type, is_failed) = match self.state {
            DeviceState::Healthy => (FailureLabel::Normal, false),
            DeviceState::Failed { label, .. } => (label, true),
        };
        SimulatorReading {
            device_uid: self.device_uid.clone(),
            product_type: self.variant,
            air_temp: round_to(vector.air_temp, 2),
            process_temp: round_to(vector.process_temp, 2),
            rotational_speed: round_to(vector.rotational_speed, 0),
            torque: round_to(vector.torque, 2),
            tool_wear: round_to(vector.tool_wear, 1),
            power: round_to(vector.mechanical_power(), 0),
            failure_type,
            scenario: self.scenario,
            is_failed,
            timestamp: now,
        }
    }
}

fn noise(rng: &mut StdRng, std: f64) -> f64 {
    match Normal::new(0.0, std) {
        Ok(dist) => dist.sample(rng),
        Err(_) => 0.0,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use chrono::{Duration, Utc};
    use fleetpulse_core::failure::FailureThresholds;
    use rand::SeedableRng;

    use super::*;

    fn params() -> DeviceParams {
        DeviceParams {
            table_len: 200,
            wear_multiplier: 1.0,
        }
    }

    fn device(scenario: Scenario, seed: u64) -> SimulatedDevice {
        SimulatedDevice::new(
            "dev-1",
            scenario,
            FailureClassifier::new(FailureThresholds::default().without_nuisance()),
            params(),
            StdRng::seed_from_u64(seed),
        )
    }

    /// Tick until the device fails or `max` ticks pass.
    fn run_until_failed(device: &mut SimulatedDevice, max: usize) -> Option<SimulatorReading> {
        let start = Utc::now();
        (0..max).find_map(|i| {
            let reading = device.tick(start + Duration::seconds(i as i64));
            reading.is_failed.then_some(reading)
        })
    }

    #[test]
    fn reset_draws_limit_in_range() {
        for seed in 0..20 {
            let d = device(Scenario::Normal, seed);
            assert!((200.0..=240.0).contains(&d.wear_limit()));
            assert_eq!(d.wear_limit().fract(), 0.0);
            assert_eq!(d.table().len(), 200);
        }
    }

    #[test]
    fn healthy_tick_accumulates_variant_wear() {
        let mut d = device(Scenario::Normal, 1);
        let rate = wear_rate(d.variant());
        d.tick(Utc::now());
        d.tick(Utc::now());
        assert!((d.accumulated_wear() - 2.0 * rate).abs() < 1e-9);
    }

    #[test]
    fn reading_carries_simulator_fields() {
        let mut d = device(Scenario::Hdf, 2);
        let reading = d.tick(Utc::now());
        let json = serde_json::to_value(&reading).unwrap();
        assert_eq!(json["device_uid"], "dev-1");
        assert_eq!(json["scenario"], "hdf");
        assert_eq!(json["failure_type"], "Normal");
        assert_eq!(json["is_failed"], false);
        assert!(json["power"].is_number());
        assert!(["L", "M", "H"].contains(&json["product_type"].as_str().unwrap()));
    }

    #[test]
    fn hdf_scenario_fails_and_stays_failed() {
        let mut d = device(Scenario::Hdf, 3);
        let failure = run_until_failed(&mut d, 400).expect("hdf scenario never failed");
        assert_eq!(failure.failure_type, FailureLabel::Hdf);
        assert_matches!(d.state(), DeviceState::Failed { label: FailureLabel::Hdf, .. });

        let wear = d.accumulated_wear();
        let later = d.tick(failure.timestamp + Duration::seconds(30));
        assert!(later.is_failed);
        assert_eq!(d.accumulated_wear(), wear);
        assert!(later.rotational_speed < failure.rotational_speed);
    }

    #[test]
    fn worn_stress_device_eventually_fails() {
        let mut d = device(Scenario::WornStress, 4);
        let failure = run_until_failed(&mut d, 5000).expect("device never wore out");
        assert!(failure.is_failed);
        assert!(failure.failure_type.is_failure());
    }

    #[test]
    fn partial_repair_halves_wear_and_keeps_table() {
        let mut d = device(Scenario::Hdf, 5);
        run_until_failed(&mut d, 400).expect("hdf scenario never failed");
        let wear = d.accumulated_wear();
        let limit = d.wear_limit();
        let table = d.table().clone();

        let outcome = d.apply(&ControlCommand::new(ControlAction::RepairPartial, None));
        assert!(outcome.success);
        assert_eq!(d.state(), DeviceState::Healthy);
        assert!((d.accumulated_wear() - wear / 2.0).abs() < 1e-9);
        assert_eq!(d.wear_limit(), limit);
        assert_eq!(d.table(), &table);
        assert_eq!(d.scenario(), Scenario::Hdf);
    }

    #[test]
    fn repair_resets_to_requested_scenario() {
        let mut d = device(Scenario::Hdf, 6);
        run_until_failed(&mut d, 400).expect("hdf scenario never failed");

        let outcome = d.apply(&ControlCommand::new(ControlAction::Repair, None));
        assert!(outcome.success);
        assert_eq!(d.scenario(), Scenario::Normal);
        assert_eq!(d.state(), DeviceState::Healthy);
        assert_eq!(d.accumulated_wear(), 0.0);
    }

    #[test]
    fn change_scenario_resets_state() {
        let mut d = device(Scenario::Normal, 7);
        for _ in 0..10 {
            d.tick(Utc::now());
        }

        let outcome = d.apply(&ControlCommand::new(
            ControlAction::ChangeScenario,
            Some(Scenario::Pwf),
        ));
        assert!(outcome.success);
        assert_eq!(outcome.device_uid, "dev-1");
        assert_eq!(d.scenario(), Scenario::Pwf);
        assert_eq!(d.accumulated_wear(), 0.0);
    }

    #[test]
    fn invalid_commands_report_errors_without_reset() {
        let mut d = device(Scenario::Osf, 8);
        d.tick(Utc::now());
        let wear = d.accumulated_wear();

        let missing = d.apply(&ControlCommand::new(ControlAction::ChangeScenario, None));
        assert!(!missing.success);

        let unknown = d.apply(&ControlCommand {
            action: ControlAction::ChangeScenario,
            scenario: Some("meltdown".into()),
        });
        assert!(!unknown.success);
        assert!(unknown.message.contains("meltdown"));

        assert_eq!(d.scenario(), Scenario::Osf);
        assert_eq!(d.accumulated_wear(), wear);
    }

    #[test]
    fn variant_draw_covers_all_tiers() {
        let mut rng = StdRng::seed_from_u64(11);
        let draws: Vec<ProductVariant> = (0..1000).map(|_| draw_variant(&mut rng)).collect();
        let share = |v| draws.iter().filter(|d| **d == v).count() as f64 / 1000.0;
        assert!((share(ProductVariant::L) - 0.5).abs() < 0.06);
        assert!((share(ProductVariant::M) - 0.3).abs() < 0.06);
        assert!((share(ProductVariant::H) - 0.2).abs() < 0.06);
    }
}
