use std::time::Duration;

use fleetpulse_core::command::Scenario;
use fleetpulse_core::config;
use fleetpulse_core::error::CoreError;

use crate::device::DeviceParams;

/// Simulator configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Simulator link endpoint, e.g. `ws://host:3000/ws/ingest`. `None`
    /// prints readings to stdout instead.
    pub backend_ws_url: Option<String>,
    pub devices: usize,
    pub interval: Duration,
    pub wear_multiplier: f64,
    pub table_len: usize,
    /// Seeds the generator that draws each device's own seed. `None`
    /// seeds from the OS.
    pub seed: Option<u64>,
    /// Scenario every device starts in; `None` picks one per device.
    pub scenario: Option<Scenario>,
}

impl SimulatorConfig {
    /// | Env Var               | Default            |
    /// |-----------------------|--------------------|
    /// | `BACKEND_WS_URL`      | unset (stdout)     |
    /// | `SIM_DEVICES`         | `1`                |
    /// | `SIM_INTERVAL_SECS`   | `2.0`              |
    /// | `SIM_WEAR_MULTIPLIER` | `1.0`              |
    /// | `SIM_TABLE_LEN`       | `2000`             |
    /// | `SIM_SEED`            | unset (random)     |
    /// | `SIM_SCENARIO`        | unset (random)     |
    pub fn from_env() -> Result<Self, CoreError> {
        let devices: usize = config::env_or("SIM_DEVICES", 1)?;
        if devices == 0 {
            return Err(CoreError::Config("SIM_DEVICES must be at least 1".into()));
        }

        let interval_secs: f64 = config::env_or("SIM_INTERVAL_SECS", 2.0)?;
        let interval = Duration::try_from_secs_f64(interval_secs)
            .ok()
            .filter(|d| !d.is_zero())
            .ok_or_else(|| {
                CoreError::Config(format!("SIM_INTERVAL_SECS must be positive, got {interval_secs}"))
            })?;

        let wear_multiplier: f64 = config::env_or("SIM_WEAR_MULTIPLIER", 1.0)?;
        if !(wear_multiplier.is_finite() && wear_multiplier >= 0.0) {
            return Err(CoreError::Config(format!(
                "SIM_WEAR_MULTIPLIER must be a non-negative number, got {wear_multiplier}"
            )));
        }

        let table_len: usize = config::env_or("SIM_TABLE_LEN", 2000)?;
        if table_len == 0 {
            return Err(CoreError::Config("SIM_TABLE_LEN must be at least 1".into()));
        }

        Ok(Self {
            backend_ws_url: config::env_opt("BACKEND_WS_URL")?,
            devices,
            interval,
            wear_multiplier,
            table_len,
            seed: config::env_opt("SIM_SEED")?,
            scenario: config::env_opt("SIM_SCENARIO")?,
        })
    }

    pub fn device_params(&self) -> DeviceParams {
        DeviceParams {
            table_len: self.table_len,
            wear_multiplier: self.wear_multiplier,
        }
    }

    /// Uid of the `i`-th device, counting from 1.
    pub fn device_uid(i: usize) -> String {
        format!("dev-{i}")
    }
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            backend_ws_url: None,
            devices: 1,
            interval: Duration::from_secs(2),
            wear_multiplier: 1.0,
            table_len: 2000,
            seed: None,
            scenario: None,
        }
    }
}
