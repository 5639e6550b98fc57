//! Runtime tests: per-device tasks, command routing and shutdown.

use std::time::Duration;

use fleetpulse_core::command::{ControlAction, ControlCommand, ControlEnvelope, Scenario};
use fleetpulse_core::failure::{FailureClassifier, FailureThresholds};
use fleetpulse_simulator::config::SimulatorConfig;
use fleetpulse_simulator::runtime::SimulatorRuntime;
use tokio_util::sync::CancellationToken;

fn config(devices: usize) -> SimulatorConfig {
    SimulatorConfig {
        devices,
        interval: Duration::from_millis(10),
        table_len: 200,
        seed: Some(42),
        scenario: Some(Scenario::Normal),
        ..SimulatorConfig::default()
    }
}

fn classifier() -> FailureClassifier {
    FailureClassifier::new(FailureThresholds::default().without_nuisance())
}

#[tokio::test]
async fn every_device_publishes_readings() {
    let cancel = CancellationToken::new();
    let (runtime, mut channels) = SimulatorRuntime::spawn(&config(3), classifier(), 64, cancel.clone());
    assert_eq!(runtime.router().device_uids(), vec!["dev-1", "dev-2", "dev-3"]);

    let mut seen = std::collections::HashSet::new();
    while seen.len() < 3 {
        let reading = tokio::time::timeout(Duration::from_secs(2), channels.readings.recv())
            .await
            .expect("no reading in time")
            .expect("reading channel closed");
        assert_eq!(reading.scenario, Scenario::Normal);
        seen.insert(reading.device_uid);
    }

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(2), runtime.join())
        .await
        .expect("device tasks did not stop");
}

#[tokio::test]
async fn command_reaches_only_its_device() {
    let cancel = CancellationToken::new();
    let (runtime, mut channels) = SimulatorRuntime::spawn(&config(2), classifier(), 256, cancel.clone());
    let router = runtime.router();

    router
        .route(ControlEnvelope::new(
            "dev-2",
            ControlCommand::new(ControlAction::ChangeScenario, Some(Scenario::Hdf)),
        ))
        .unwrap();

    let outcome = tokio::time::timeout(Duration::from_secs(2), channels.outcomes.recv())
        .await
        .expect("no outcome in time")
        .unwrap();
    assert!(outcome.success);
    assert_eq!(outcome.device_uid, "dev-2");
    assert_eq!(outcome.msg_type, "control_result");

    // Drain until a post-command reading from each device shows its scenario.
    let mut dev1 = None;
    let mut dev2 = None;
    while dev1.is_none() || dev2.is_none() {
        let reading = tokio::time::timeout(Duration::from_secs(2), channels.readings.recv())
            .await
            .expect("no reading in time")
            .unwrap();
        match reading.device_uid.as_str() {
            "dev-1" => dev1 = Some(reading.scenario),
            "dev-2" if reading.scenario == Scenario::Hdf => dev2 = Some(reading.scenario),
            _ => {}
        }
    }
    assert_eq!(dev1, Some(Scenario::Normal));

    cancel.cancel();
    runtime.join().await;
}

#[tokio::test]
async fn unknown_device_is_reported() {
    let cancel = CancellationToken::new();
    let (runtime, _channels) = SimulatorRuntime::spawn(&config(1), classifier(), 8, cancel.clone());

    let outcome = runtime
        .router()
        .route(ControlEnvelope::new(
            "dev-9",
            ControlCommand::new(ControlAction::Repair, None),
        ))
        .unwrap_err();
    assert!(!outcome.success);
    assert_eq!(outcome.device_uid, "dev-9");

    cancel.cancel();
    runtime.join().await;
}

#[tokio::test]
async fn runtime_stops_when_readings_are_not_consumed() {
    let cancel = CancellationToken::new();
    let (runtime, channels) = SimulatorRuntime::spawn(&config(2), classifier(), 1, cancel.clone());
    drop(channels);

    tokio::time::timeout(Duration::from_secs(2), runtime.join())
        .await
        .expect("device tasks kept running without a consumer");
}
