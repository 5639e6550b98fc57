//! WebSocket infrastructure for real-time communication.
//!
//! Two connection families share the same manager type: live subscribers
//! on `/ws/live` and simulator links on `/ws/ingest`.

mod handler;
mod heartbeat;
mod ingest;
pub mod manager;

pub use handler::live_ws_handler;
pub use heartbeat::start_heartbeat;
pub use ingest::ingest_ws_handler;
pub use manager::WsManager;
