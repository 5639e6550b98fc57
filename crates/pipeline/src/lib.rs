//! The condition-monitoring pipeline between the ingestion boundary and
//! the store: message intake, the regression model seam and the
//! prediction scheduler.

pub mod ingest;
pub mod model;
pub mod scheduler;

pub use ingest::{IngestError, Ingestor};
pub use model::{ModelError, RulModel};
pub use scheduler::{PredictError, PredictionScheduler, SchedulerConfig, StepOutcome};
