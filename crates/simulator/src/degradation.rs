//! Post-failure degradation.
//!
//! After a failure the machine winds down: speed and torque decay toward
//! zero with failure-mode coefficients and temperatures drift toward
//! ambient. Every channel is monotone in the time since failure.

use fleetpulse_core::failure::FailureLabel;
use fleetpulse_core::sensor::SensorVector;

/// Seconds until the decay factor saturates.
const DECAY_SECONDS: f64 = 20.0;

const AIR_DROP_RATE: f64 = 0.3;
const AIR_DROP_MAX: f64 = 10.0;
const AIR_FLOOR: f64 = 295.0;
const PROCESS_DROP_RATE: f64 = 0.8;
const PROCESS_DROP_MAX: f64 = 20.0;
/// Process temperature never falls below air plus this [K], unless it was
/// already closer to air at the failure.
const PROCESS_ABOVE_AIR: f64 = 5.0;

/// (speed, torque) decay coefficients for a failure mode.
fn coefficients(label: FailureLabel) -> (f64, f64) {
    match label {
        FailureLabel::Twf => (0.8, 0.9),
        FailureLabel::Hdf => (1.0, 0.7),
        FailureLabel::Pwf => (0.6, 0.8),
        FailureLabel::Osf | FailureLabel::Rnf | FailureLabel::Normal => (0.9, 0.9),
    }
}

/// Degraded reading `elapsed_secs` after `label` fired on `at_failure`.
///
/// Tool wear is kept; accumulation stops while failed.
pub fn degrade(at_failure: &SensorVector, label: FailureLabel, elapsed_secs: f64) -> SensorVector {
    let t = elapsed_secs.max(0.0);
    let decay = (t / DECAY_SECONDS).min(1.0);
    let (k_speed, k_torque) = coefficients(label);

    let air = (at_failure.air_temp - (AIR_DROP_RATE * t).min(AIR_DROP_MAX)).max(AIR_FLOOR);
    let process = (at_failure.process_temp - (PROCESS_DROP_RATE * t).min(PROCESS_DROP_MAX))
        .max((air + PROCESS_ABOVE_AIR).min(at_failure.process_temp));

    SensorVector {
        air_temp: air,
        process_temp: process,
        rotational_speed: (at_failure.rotational_speed * (1.0 - decay * k_speed)).max(0.0),
        torque: (at_failure.torque * (1.0 - decay * k_torque)).max(0.0),
        tool_wear: at_failure.tool_wear,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed_reading() -> SensorVector {
        SensorVector {
            air_temp: 302.0,
            process_temp: 312.0,
            rotational_speed: 1500.0,
            torque: 45.0,
            tool_wear: 180.0,
        }
    }

    #[test]
    fn zero_elapsed_is_unchanged() {
        let v = failed_reading();
        assert_eq!(degrade(&v, FailureLabel::Twf, 0.0), v);
    }

    #[test]
    fn narrow_heat_gap_is_not_widened() {
        // Typical heat-dissipation failure: process only 3 K above air.
        let v = SensorVector {
            air_temp: 303.0,
            process_temp: 306.0,
            rotational_speed: 1250.0,
            torque: 48.0,
            tool_wear: 90.0,
        };
        assert_eq!(degrade(&v, FailureLabel::Hdf, 0.0), v);

        let mut previous = v;
        for step in 1..=120 {
            let next = degrade(&v, FailureLabel::Hdf, f64::from(step) * 0.5);
            assert!(next.process_temp <= previous.process_temp);
            assert!(next.process_temp >= next.air_temp);
            previous = next;
        }
    }

    #[test]
    fn channels_never_recover() {
        let v = failed_reading();
        for label in [
            FailureLabel::Twf,
            FailureLabel::Hdf,
            FailureLabel::Pwf,
            FailureLabel::Osf,
            FailureLabel::Rnf,
        ] {
            let mut previous = degrade(&v, label, 0.0);
            for step in 1..=120 {
                let next = degrade(&v, label, f64::from(step) * 0.5);
                assert!(next.rotational_speed <= previous.rotational_speed, "{label}");
                assert!(next.torque <= previous.torque, "{label}");
                assert!(next.air_temp <= previous.air_temp, "{label}");
                assert!(next.process_temp <= previous.process_temp, "{label}");
                assert_eq!(next.tool_wear, v.tool_wear);
                previous = next;
            }
        }
    }

    #[test]
    fn saturates_at_failure_mode_target() {
        let v = failed_reading();

        let hdf = degrade(&v, FailureLabel::Hdf, 60.0);
        assert_eq!(hdf.rotational_speed, 0.0);
        assert!((hdf.torque - 45.0 * 0.3).abs() < 1e-9);

        let pwf = degrade(&v, FailureLabel::Pwf, 60.0);
        assert!((pwf.rotational_speed - 1500.0 * 0.4).abs() < 1e-9);
        assert_eq!(degrade(&v, FailureLabel::Pwf, 600.0), pwf);
    }

    #[test]
    fn temperatures_respect_floors() {
        let v = failed_reading();
        let late = degrade(&v, FailureLabel::Osf, 600.0);
        assert_eq!(late.air_temp, 295.0);
        assert_eq!(late.process_temp, 300.0);
    }
}
