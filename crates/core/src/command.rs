//! Control commands for simulated devices and the scenario vocabulary.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::message_types::{MSG_TYPE_CONTROL, MSG_TYPE_CONTROL_RESULT};

// ---------------------------------------------------------------------------
// Scenario
// ---------------------------------------------------------------------------

/// Named signal-generation profile. Each failure scenario is shaped to
/// trigger its own failure mode within the generated sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scenario {
    Normal,
    Twf,
    Hdf,
    Pwf,
    Osf,
    Rnf,
    WornStress,
}

impl Scenario {
    pub const ALL: [Scenario; 7] = [
        Scenario::Normal,
        Scenario::Twf,
        Scenario::Hdf,
        Scenario::Pwf,
        Scenario::Osf,
        Scenario::Rnf,
        Scenario::WornStress,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Scenario::Normal => "normal",
            Scenario::Twf => "twf",
            Scenario::Hdf => "hdf",
            Scenario::Pwf => "pwf",
            Scenario::Osf => "osf",
            Scenario::Rnf => "rnf",
            Scenario::WornStress => "worn_stress",
        }
    }

    /// Whether random nuisance failures may fire while this scenario runs.
    ///
    /// Targeted scenarios should surface their own failure mode.
    pub fn allows_nuisance(self) -> bool {
        matches!(self, Scenario::Normal | Scenario::Rnf)
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scenario {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Scenario::ALL
            .into_iter()
            .find(|sc| sc.as_str() == s)
            .ok_or_else(|| CoreError::Validation(format!("unknown scenario '{s}'")))
    }
}

// ---------------------------------------------------------------------------
// ControlCommand
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlAction {
    /// Full reset: new thresholds, zero wear, regenerated signal table.
    Repair,
    /// Partial wear reduction without regenerating the table.
    RepairPartial,
    /// Full reset into a different scenario.
    ChangeScenario,
}

/// Command body accepted at the control boundary.
///
/// `scenario` stays a raw string so an unknown name can be reported back
/// instead of failing deserialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlCommand {
    pub action: ControlAction,
    #[serde(default)]
    pub scenario: Option<String>,
}

impl ControlCommand {
    pub fn new(action: ControlAction, scenario: Option<Scenario>) -> Self {
        Self {
            action,
            scenario: scenario.map(|s| s.as_str().to_string()),
        }
    }

    /// Parsed scenario, if one was given.
    pub fn scenario(&self) -> Result<Option<Scenario>, CoreError> {
        self.scenario.as_deref().map(str::parse).transpose()
    }

    /// `change_scenario` needs a known scenario; the other actions accept
    /// an optional one.
    pub fn validate(&self) -> Result<(), CoreError> {
        let scenario = self.scenario()?;
        if self.action == ControlAction::ChangeScenario && scenario.is_none() {
            return Err(CoreError::Validation(
                "change_scenario requires a scenario".to_string(),
            ));
        }
        Ok(())
    }
}

/// Command addressed to one device, as carried over the simulator link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlEnvelope {
    #[serde(rename = "type")]
    pub msg_type: String,
    pub device_uid: String,
    #[serde(flatten)]
    pub command: ControlCommand,
}

impl ControlEnvelope {
    pub fn new(device_uid: impl Into<String>, command: ControlCommand) -> Self {
        Self {
            msg_type: MSG_TYPE_CONTROL.to_string(),
            device_uid: device_uid.into(),
            command,
        }
    }
}

/// Result of applying a command, reported back by the simulator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandOutcome {
    #[serde(rename = "type")]
    pub msg_type: String,
    pub device_uid: String,
    pub success: bool,
    pub message: String,
}

impl CommandOutcome {
    pub fn success(device_uid: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            msg_type: MSG_TYPE_CONTROL_RESULT.to_string(),
            device_uid: device_uid.into(),
            success: true,
            message: message.into(),
        }
    }

    pub fn error(device_uid: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            ..Self::success(device_uid, message)
        }
    }
}
