//! Domain vocabulary shared by every fleetpulse crate.
//!
//! Pure logic only: no database, network or clock access. The failure
//! classifier and status resolver live here so that the prediction
//! scheduler, the live broadcaster and the device simulator all agree on
//! the same thresholds.

pub mod command;
pub mod config;
pub mod error;
pub mod failure;
pub mod message_types;
pub mod sensor;
pub mod status;
pub mod types;
