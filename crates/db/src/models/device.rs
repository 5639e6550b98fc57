//! Device entity: one monitored machine, created on its first reading.

use fleetpulse_core::sensor::ProductVariant;
use fleetpulse_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `devices` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Device {
    pub id: DbId,
    pub device_uid: String,
    /// `None` until a message with a recognised variant arrives.
    pub product_type: Option<String>,
    pub created_at: Timestamp,
}

impl Device {
    pub fn variant(&self) -> Option<ProductVariant> {
        ProductVariant::parse_lenient(self.product_type.as_deref())
    }
}
