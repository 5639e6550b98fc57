//! Repository for the `devices` table.

use fleetpulse_core::sensor::ProductVariant;
use sqlx::PgPool;

use crate::models::device::Device;

/// Column list for `devices` queries.
const COLUMNS: &str = "id, device_uid, product_type, created_at";

/// Devices are created lazily and never deleted.
pub struct DeviceRepo;

impl DeviceRepo {
    /// Fetch a device by its external identifier.
    pub async fn find_by_uid(pool: &PgPool, device_uid: &str) -> Result<Option<Device>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM devices WHERE device_uid = $1");
        sqlx::query_as::<_, Device>(&query)
            .bind(device_uid)
            .fetch_optional(pool)
            .await
    }

    /// Return the device for `device_uid`, creating it on first sight.
    ///
    /// An existing device only has its variant backfilled when it was
    /// unknown; a known variant is never overwritten.
    pub async fn get_or_create(
        pool: &PgPool,
        device_uid: &str,
        variant: Option<ProductVariant>,
    ) -> Result<Device, sqlx::Error> {
        let query = format!(
            "INSERT INTO devices (device_uid, product_type) VALUES ($1, $2) \
             ON CONFLICT ON CONSTRAINT uq_devices_device_uid DO UPDATE \
                 SET product_type = COALESCE(devices.product_type, EXCLUDED.product_type) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Device>(&query)
            .bind(device_uid)
            .bind(variant.map(ProductVariant::as_str))
            .fetch_one(pool)
            .await
    }

    /// List every device in creation order.
    pub async fn list(pool: &PgPool) -> Result<Vec<Device>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM devices ORDER BY id ASC");
        sqlx::query_as::<_, Device>(&query).fetch_all(pool).await
    }
}
