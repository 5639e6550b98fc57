//! Change-detection fan-out of device state to live subscribers.

pub mod broadcast;
pub mod payload;

pub use broadcast::{greet_subscriber, snapshot, DeliveredSignatures, LiveBroadcaster};
pub use payload::{LivePayload, LiveSignature};
