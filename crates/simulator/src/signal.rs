//! Scenario signal generator.
//!
//! Each scenario precomputes a table of (air, process, speed, torque, wear)
//! rows. Rows before a scenario's failure window are kept inside every
//! failure rule; rows inside the window satisfy the scenario's own rule
//! before any rule that precedes it in the classifier's priority chain.

use fleetpulse_core::command::Scenario;
use fleetpulse_core::sensor::{SensorVector, RPM_TO_RAD_PER_SEC};
use rand::Rng;
use rand_distr::{Distribution, Normal};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

const BASE_AIR_TEMP: f64 = 300.0;
const BASE_SPEED: f64 = 1500.0;
const BASE_TORQUE: f64 = 40.0;

const AIR_WALK_STD: f64 = 0.6;
const AIR_BOUNDS: (f64, f64) = (295.0, 305.0);
const PROCESS_OFFSET: f64 = 10.0;
const PROCESS_STD: f64 = 1.0;
const SPEED_STD: f64 = 50.0;
const SPEED_BOUNDS: (f64, f64) = (1200.0, 2800.0);
const TORQUE_STD: f64 = 5.0;
const TORQUE_BOUNDS: (f64, f64) = (10.0, 70.0);
const WEAR_STEP: f64 = 0.1;
const WEAR_STEP_STD: f64 = 0.02;

/// Power band kept by healthy rows, inside the classifier's 3500-9000 W
/// with room for measurement noise.
const SAFE_POWER_LOW: f64 = 4000.0;
const SAFE_POWER_HIGH: f64 = 8500.0;
const CORRECTED_POWER_LOW: f64 = 4050.0;
const CORRECTED_POWER_HIGH: f64 = 8450.0;

/// Healthy rows near the heat-dissipation region get this temperature
/// difference.
const HDF_GUARD_DIFF: f64 = 10.0;
const HDF_GUARD_DIFF_BELOW: f64 = 9.0;
const HDF_GUARD_SPEED_BELOW: f64 = 1400.0;

/// Healthy rows keep wear x torque below this share of the threshold.
const OVERSTRAIN_MARGIN: f64 = 0.95;

/// Start of the failure window as a share of the table length.
const HDF_WINDOW: f64 = 0.7;
const PWF_WINDOW: f64 = 0.8;
const OSF_WINDOW: f64 = 0.6;

const OSF_WEAR_END: f64 = 200.0;
const OSF_TORQUE_MARGIN: f64 = 5.0;
const OSF_TORQUE_MAX: f64 = 80.0;

// ---------------------------------------------------------------------------
// Table
// ---------------------------------------------------------------------------

/// What a table is generated for.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TableParams {
    pub scenario: Scenario,
    pub len: usize,
    /// The device's tool-wear limit.
    pub wear_limit: f64,
    /// Overstrain threshold of the device's product variant.
    pub overstrain_threshold: f64,
}

/// Precomputed signal rows for one scenario run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SignalTable {
    pub air: Vec<f64>,
    pub process: Vec<f64>,
    pub speed: Vec<f64>,
    pub torque: Vec<f64>,
    pub wear: Vec<f64>,
}

impl SignalTable {
    fn with_capacity(len: usize) -> Self {
        Self {
            air: Vec::with_capacity(len),
            process: Vec::with_capacity(len),
            speed: Vec::with_capacity(len),
            torque: Vec::with_capacity(len),
            wear: Vec::with_capacity(len),
        }
    }

    fn push(&mut self, air: f64, process: f64, speed: f64, torque: f64, wear: f64) {
        self.air.push(air);
        self.process.push(process);
        self.speed.push(speed);
        self.torque.push(torque);
        self.wear.push(wear);
    }

    pub fn len(&self) -> usize {
        self.air.len()
    }

    pub fn is_empty(&self) -> bool {
        self.air.is_empty()
    }

    /// Row `index`, wrapping around the end of the table.
    pub fn row(&self, index: usize) -> SensorVector {
        let i = index % self.len().max(1);
        SensorVector {
            air_temp: self.air[i],
            process_temp: self.process[i],
            rotational_speed: self.speed[i],
            torque: self.torque[i],
            tool_wear: self.wear[i],
        }
    }

    /// Generate the table for `params`. `params.len` is raised to at least 1.
    pub fn generate<R: Rng + ?Sized>(params: &TableParams, rng: &mut R) -> Self {
        let len = params.len.max(1);
        match params.scenario {
            Scenario::Normal | Scenario::Rnf => normal(len, params, rng),
            Scenario::Twf => tool_wear(len, params, rng),
            Scenario::Hdf => heat_dissipation(len, params, rng),
            Scenario::Pwf => power(len, params, rng),
            Scenario::Osf => overstrain(len, params, rng),
            Scenario::WornStress => worn_stress(len, params, rng),
        }
    }
}

// ---------------------------------------------------------------------------
// Sampling helpers
// ---------------------------------------------------------------------------

fn gauss<R: Rng + ?Sized>(rng: &mut R, mean: f64, std: f64) -> f64 {
    match Normal::new(mean, std) {
        Ok(dist) => dist.sample(rng),
        Err(_) => mean,
    }
}

fn clip(value: f64, (low, high): (f64, f64)) -> f64 {
    value.clamp(low, high)
}

fn torque_for_power(power: f64, speed: f64) -> f64 {
    power / (speed * RPM_TO_RAD_PER_SEC)
}

fn window_start(len: usize, share: f64) -> usize {
    ((len as f64) * share) as usize
}

/// Evenly spaced values from `start` to `end` inclusive.
fn linspace(start: f64, end: f64, n: usize) -> impl Iterator<Item = f64> {
    let step = if n > 1 {
        (end - start) / (n - 1) as f64
    } else {
        0.0
    };
    (0..n).map(move |i| start + step * i as f64)
}

// ---------------------------------------------------------------------------
// Row guards
// ---------------------------------------------------------------------------

/// Keep row `i` clear of the power, overstrain and heat-dissipation rules.
fn keep_healthy(table: &mut SignalTable, i: usize, overstrain_threshold: f64) {
    let speed = table.speed[i];
    let power = table.torque[i] * speed * RPM_TO_RAD_PER_SEC;
    if power < SAFE_POWER_LOW {
        table.torque[i] = torque_for_power(CORRECTED_POWER_LOW, speed);
    } else if power > SAFE_POWER_HIGH {
        table.torque[i] = torque_for_power(CORRECTED_POWER_HIGH, speed);
    }

    let wear = table.wear[i];
    if wear > 0.0 {
        let max_torque = OVERSTRAIN_MARGIN * overstrain_threshold / wear;
        if table.torque[i] > max_torque {
            table.torque[i] = max_torque;
            // Lowering torque may leave the power band; recover with speed.
            if table.torque[i] * speed * RPM_TO_RAD_PER_SEC < SAFE_POWER_LOW {
                table.speed[i] = CORRECTED_POWER_LOW / (table.torque[i] * RPM_TO_RAD_PER_SEC);
            }
        }
    }

    guard_heat_dissipation(table, i);
}

fn guard_heat_dissipation(table: &mut SignalTable, i: usize) {
    let diff = table.process[i] - table.air[i];
    if diff < HDF_GUARD_DIFF_BELOW && table.speed[i] < HDF_GUARD_SPEED_BELOW {
        table.process[i] = table.air[i] + HDF_GUARD_DIFF;
    }
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

/// Random-walk air temperature with process temperature tracking it.
fn base_rows<R: Rng + ?Sized>(len: usize, rng: &mut R) -> SignalTable {
    let mut table = SignalTable::with_capacity(len);
    let mut air = BASE_AIR_TEMP;
    let mut wear: f64 = 0.0;

    for _ in 0..len {
        air = clip(air + gauss(rng, 0.0, AIR_WALK_STD), AIR_BOUNDS);
        let process = air + PROCESS_OFFSET + gauss(rng, 0.0, PROCESS_STD);
        let speed = clip(gauss(rng, BASE_SPEED, SPEED_STD), SPEED_BOUNDS);
        let torque = clip(gauss(rng, BASE_TORQUE, TORQUE_STD), TORQUE_BOUNDS);
        wear = (wear + WEAR_STEP + gauss(rng, 0.0, WEAR_STEP_STD)).max(0.0);
        table.push(air, process, speed, torque, wear);
    }
    table
}

fn normal<R: Rng + ?Sized>(len: usize, params: &TableParams, rng: &mut R) -> SignalTable {
    let mut table = base_rows(len, rng);
    for i in 0..len {
        keep_healthy(&mut table, i, params.overstrain_threshold);
    }
    table
}

/// Accelerated wear under high load until the wear limit, then held.
fn tool_wear<R: Rng + ?Sized>(len: usize, params: &TableParams, rng: &mut R) -> SignalTable {
    let mut table = SignalTable::with_capacity(len);
    let mut air = BASE_AIR_TEMP;
    let mut wear: f64 = 0.0;

    while table.len() < len {
        air = clip(air + gauss(rng, 0.0, AIR_WALK_STD), AIR_BOUNDS);
        let process = air + PROCESS_OFFSET + gauss(rng, 0.0, PROCESS_STD);
        let speed = clip(gauss(rng, BASE_SPEED * 1.2, SPEED_STD * 1.5), (1500.0, 2800.0));
        let torque = clip(gauss(rng, BASE_TORQUE * 1.3, TORQUE_STD * 1.2), (20.0, 70.0));
        wear += 0.5 + gauss(rng, 0.0, 0.05);
        table.push(air, process, speed, torque, wear);

        let i = table.len() - 1;
        if wear >= params.wear_limit {
            break;
        }
        keep_healthy(&mut table, i, params.overstrain_threshold);
    }

    // Hold the final row for the rest of the table.
    let last = table.row(table.len() - 1);
    while table.len() < len {
        table.push(
            last.air_temp,
            last.process_temp,
            last.rotational_speed,
            last.torque,
            last.tool_wear,
        );
    }
    table
}

/// Cooling loss: slow spindle and a shrinking temperature difference.
fn heat_dissipation<R: Rng + ?Sized>(len: usize, params: &TableParams, rng: &mut R) -> SignalTable {
    let mut table = normal(len, params, rng);
    for i in window_start(len, HDF_WINDOW)..len {
        table.speed[i] = rng.random_range(1100.0..1350.0);
        table.process[i] = table.air[i] + rng.random_range(2.0..8.0);
    }
    table
}

/// Supply fault: power pushed above or below the allowed band.
fn power<R: Rng + ?Sized>(len: usize, params: &TableParams, rng: &mut R) -> SignalTable {
    let mut table = normal(len, params, rng);
    let overpower = rng.random::<f64>() > 0.5;

    for i in window_start(len, PWF_WINDOW)..len {
        let (target, speed) = if overpower {
            (rng.random_range(9100.0..10000.0), rng.random_range(2800.0..3000.0))
        } else {
            (rng.random_range(2000.0..3400.0), rng.random_range(1200.0..1300.0))
        };
        table.speed[i] = speed;
        table.torque[i] = torque_for_power(target, speed);
        guard_heat_dissipation(&mut table, i);
    }
    table
}

/// Wear ramps up while torque rises to exceed the overstrain threshold.
fn overstrain<R: Rng + ?Sized>(len: usize, params: &TableParams, rng: &mut R) -> SignalTable {
    let mut table = normal(len, params, rng);
    let start = window_start(len, OSF_WINDOW);
    if start >= len {
        return table;
    }

    let ramp: Vec<f64> = linspace(table.wear[start], OSF_WEAR_END, len - start).collect();
    for (i, wear) in (start..len).zip(ramp) {
        let required = params.overstrain_threshold / wear.max(1.0) + OSF_TORQUE_MARGIN;
        let noise = gauss(rng, 0.0, 1.0).clamp(-3.0, 3.0);
        let torque = (required + noise).clamp(0.0, OSF_TORQUE_MAX);

        table.wear[i] = wear;
        table.torque[i] = torque;
        // Stay inside the power band so the overstrain rule is reached.
        let max_speed = CORRECTED_POWER_HIGH / (torque * RPM_TO_RAD_PER_SEC);
        table.speed[i] = table.speed[i].min(max_speed);
        guard_heat_dissipation(&mut table, i);
    }
    table
}

/// Old tooling under sustained load, close to but inside every rule.
fn worn_stress<R: Rng + ?Sized>(len: usize, params: &TableParams, rng: &mut R) -> SignalTable {
    let mut table = normal(len, params, rng);
    let base_wear = rng.random_range(150.0..180.0);

    let ramp: Vec<f64> = linspace(base_wear, base_wear + 2.0, len).collect();
    for (i, wear) in ramp.into_iter().enumerate() {
        table.wear[i] = wear;
        table.torque[i] = clip(gauss(rng, 48.0, 2.0), (42.0, 53.0));
        table.speed[i] = gauss(rng, 1450.0, 15.0);
        keep_healthy(&mut table, i, params.overstrain_threshold);
    }
    table
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use fleetpulse_core::failure::{FailureClassifier, FailureLabel, FailureThresholds};
    use fleetpulse_core::sensor::ProductVariant;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;

    const WEAR_LIMIT: f64 = 220.0;

    fn params(scenario: Scenario, len: usize, variant: ProductVariant) -> TableParams {
        TableParams {
            scenario,
            len,
            wear_limit: WEAR_LIMIT,
            overstrain_threshold: FailureThresholds::default().overstrain_threshold(Some(variant)),
        }
    }

    fn labels(table: &SignalTable, variant: ProductVariant) -> Vec<FailureLabel> {
        let classifier = FailureClassifier::default();
        (0..table.len())
            .map(|i| {
                classifier
                    .classify_rules(&table.row(i), Some(variant), Some(WEAR_LIMIT))
                    .unwrap()
            })
            .collect()
    }

    /// First non-normal label and the index where it appears.
    fn first_failure(labels: &[FailureLabel]) -> Option<(usize, FailureLabel)> {
        labels
            .iter()
            .copied()
            .enumerate()
            .find(|(_, label)| label.is_failure())
    }

    #[test]
    fn tables_have_requested_length() {
        let mut rng = StdRng::seed_from_u64(1);
        for scenario in Scenario::ALL {
            let table = SignalTable::generate(&params(scenario, 250, ProductVariant::M), &mut rng);
            assert_eq!(table.len(), 250, "{scenario}");
        }
    }

    #[test]
    fn same_seed_gives_same_table() {
        let s = params(Scenario::Pwf, 300, ProductVariant::L);
        let a = SignalTable::generate(&s, &mut StdRng::seed_from_u64(9));
        let b = SignalTable::generate(&s, &mut StdRng::seed_from_u64(9));
        assert_eq!(a, b);
    }

    #[test]
    fn normal_and_worn_stress_stay_healthy() {
        for seed in 0..5 {
            let mut rng = StdRng::seed_from_u64(seed);
            for scenario in [Scenario::Normal, Scenario::Rnf, Scenario::WornStress] {
                for variant in ProductVariant::ALL {
                    let table = SignalTable::generate(&params(scenario, 400, variant), &mut rng);
                    assert_eq!(first_failure(&labels(&table, variant)), None, "{scenario} {variant}");
                }
            }
        }
    }

    #[test]
    fn targeted_scenarios_trigger_their_own_failure() {
        let cases = [
            (Scenario::Twf, FailureLabel::Twf),
            (Scenario::Hdf, FailureLabel::Hdf),
            (Scenario::Pwf, FailureLabel::Pwf),
            (Scenario::Osf, FailureLabel::Osf),
        ];
        for seed in 0..5 {
            let mut rng = StdRng::seed_from_u64(seed);
            for (scenario, expected) in cases {
                for variant in ProductVariant::ALL {
                    let table = SignalTable::generate(&params(scenario, 600, variant), &mut rng);
                    let found = first_failure(&labels(&table, variant));
                    assert_matches::assert_matches!(
                        found,
                        Some((_, label)) if label == expected,
                        "{scenario} {variant}"
                    );
                }
            }
        }
    }

    #[test]
    fn heat_dissipation_starts_at_its_window() {
        let mut rng = StdRng::seed_from_u64(3);
        let table = SignalTable::generate(&params(Scenario::Hdf, 400, ProductVariant::L), &mut rng);
        let found = first_failure(&labels(&table, ProductVariant::L));
        assert_eq!(found, Some((window_start(400, HDF_WINDOW), FailureLabel::Hdf)));
    }

    #[test]
    fn tool_wear_table_holds_after_limit() {
        let mut rng = StdRng::seed_from_u64(4);
        let table = SignalTable::generate(&params(Scenario::Twf, 600, ProductVariant::H), &mut rng);
        let last = table.row(599);
        assert!(last.tool_wear >= WEAR_LIMIT);
        assert_eq!(table.row(598), last);
    }

    #[test]
    fn rows_wrap_around() {
        let mut rng = StdRng::seed_from_u64(5);
        let table = SignalTable::generate(&params(Scenario::Normal, 10, ProductVariant::L), &mut rng);
        assert_eq!(table.row(13), table.row(3));
    }
}
