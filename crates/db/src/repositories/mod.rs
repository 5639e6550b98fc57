//! Repository layer: one zero-sized struct per table with async query
//! methods taking a `&PgPool`.

pub mod device_repo;
pub mod prediction_repo;
pub mod reading_repo;

pub use device_repo::DeviceRepo;
pub use prediction_repo::PredictionRepo;
pub use reading_repo::ReadingRepo;
