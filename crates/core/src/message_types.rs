//! WebSocket message type discriminators.
//!
//! Shared by the API (subscriber and simulator sockets) and the simulator
//! transport so both ends agree on the `type` field values.

/// Live device state pushed to subscribers.
pub const MSG_TYPE_LIVE_DATA: &str = "live_data";

/// Reply to a subscriber liveness probe.
pub const MSG_TYPE_PONG: &str = "pong";

/// Control command relayed from the API to a simulator link.
pub const MSG_TYPE_CONTROL: &str = "control";

/// Outcome of a control command, reported by the simulator.
pub const MSG_TYPE_CONTROL_RESULT: &str = "control_result";

/// Plain-text liveness probe a subscriber may send at any time.
pub const PING_TEXT: &str = "ping";
