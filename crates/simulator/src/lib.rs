//! `fleetpulse-simulator` library crate.
//!
//! Scenario signal tables, post-failure degradation, the per-device state
//! machine and the runtime that drives one task per device. The binary
//! entrypoint lives in `main.rs`.

pub mod config;
pub mod degradation;
pub mod device;
pub mod runtime;
pub mod sender;
pub mod signal;
