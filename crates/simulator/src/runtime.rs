//! Device simulation runtime.
//!
//! One task per device owns that device's state. Control commands reach a
//! device through its own inbox, so a command and a tick never interleave.
//! Readings and command outcomes flow out through shared channels.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use fleetpulse_core::command::{CommandOutcome, ControlCommand, ControlEnvelope, Scenario};
use fleetpulse_core::failure::FailureClassifier;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::config::SimulatorConfig;
use crate::device::{SimulatedDevice, SimulatorReading};

/// Pending commands per device.
const INBOX_CAPACITY: usize = 16;

/// Routes control envelopes to device inboxes by `device_uid`.
#[derive(Clone, Default)]
pub struct CommandRouter {
    inboxes: Arc<HashMap<String, mpsc::Sender<ControlCommand>>>,
}

impl CommandRouter {
    /// Queue a command for its device.
    ///
    /// Returns an error outcome when the device is unknown to this runtime
    /// or its task has stopped.
    pub fn route(&self, envelope: ControlEnvelope) -> Result<(), CommandOutcome> {
        let Some(inbox) = self.inboxes.get(&envelope.device_uid) else {
            return Err(CommandOutcome::error(
                &envelope.device_uid,
                format!("Unknown device '{}'", envelope.device_uid),
            ));
        };
        inbox.try_send(envelope.command).map_err(|e| {
            tracing::warn!(device_uid = %envelope.device_uid, error = %e, "Command not queued");
            CommandOutcome::error(&envelope.device_uid, "Device is busy or stopped")
        })
    }

    pub fn device_uids(&self) -> Vec<String> {
        let mut uids: Vec<String> = self.inboxes.keys().cloned().collect();
        uids.sort();
        uids
    }
}

/// Output side of a runtime.
pub struct RuntimeChannels {
    pub readings: mpsc::Receiver<SimulatorReading>,
    pub outcomes: mpsc::UnboundedReceiver<CommandOutcome>,
}

pub struct SimulatorRuntime {
    router: CommandRouter,
    tasks: JoinSet<()>,
}

impl SimulatorRuntime {
    /// Spawn one task per configured device.
    ///
    /// `reading_capacity` bounds the reading channel; readings produced
    /// while it is full are dropped.
    pub fn spawn(
        config: &SimulatorConfig,
        classifier: FailureClassifier,
        reading_capacity: usize,
        cancel: CancellationToken,
    ) -> (Self, RuntimeChannels) {
        let (readings_tx, readings) = mpsc::channel(reading_capacity.max(1));
        let (outcomes_tx, outcomes) = mpsc::unbounded_channel();
        let mut inboxes = HashMap::new();
        let mut tasks = JoinSet::new();
        let mut seeder = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        for i in 1..=config.devices {
            let device_uid = SimulatorConfig::device_uid(i);
            let mut rng = StdRng::seed_from_u64(seeder.random());
            let scenario = config
                .scenario
                .unwrap_or_else(|| Scenario::ALL[rng.random_range(0..Scenario::ALL.len())]);
            let device = SimulatedDevice::new(
                device_uid.clone(),
                scenario,
                classifier.clone(),
                config.device_params(),
                rng,
            );

            let (inbox_tx, inbox) = mpsc::channel(INBOX_CAPACITY);
            inboxes.insert(device_uid, inbox_tx);
            tasks.spawn(run_device(
                device,
                inbox,
                readings_tx.clone(),
                outcomes_tx.clone(),
                config.interval,
                cancel.clone(),
            ));
        }

        tracing::info!(devices = config.devices, "Simulator runtime started");
        let runtime = Self {
            router: CommandRouter {
                inboxes: Arc::new(inboxes),
            },
            tasks,
        };
        (runtime, RuntimeChannels { readings, outcomes })
    }

    pub fn router(&self) -> CommandRouter {
        self.router.clone()
    }

    /// Wait for every device task to finish.
    pub async fn join(mut self) {
        while let Some(result) = self.tasks.join_next().await {
            if let Err(e) = result {
                tracing::error!(error = %e, "Device task failed");
            }
        }
    }
}

/// Tick on a fixed interval and apply commands between ticks.
async fn run_device(
    mut device: SimulatedDevice,
    mut inbox: mpsc::Receiver<ControlCommand>,
    readings: mpsc::Sender<SimulatorReading>,
    outcomes: mpsc::UnboundedSender<CommandOutcome>,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let reading = device.tick(Utc::now());
                match readings.try_send(reading) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        tracing::debug!(device_uid = %device.device_uid(), "Reading dropped, output is full");
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => break,
                }
            }
            Some(command) = inbox.recv() => {
                tracing::info!(device_uid = %device.device_uid(), action = ?command.action, "Control command received");
                let outcome = device.apply(&command);
                let _ = outcomes.send(outcome);
            }
        }
    }

    tracing::debug!(device_uid = %device.device_uid(), "Device task stopped");
}
