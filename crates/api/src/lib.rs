//! FleetPulse API server library.
//!
//! Exposes config, state, error handling, routes, the live broadcast loop
//! and the WebSocket infrastructure so integration tests and the binary
//! entrypoint can both reach them.

pub mod config;
pub mod error;
pub mod handlers;
pub mod live;
pub mod response;
pub mod router;
pub mod routes;
pub mod state;
pub mod ws;
