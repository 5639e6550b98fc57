use fleetpulse_core::config;
use fleetpulse_core::error::CoreError;
use fleetpulse_core::failure::FailureThresholds;
use fleetpulse_pipeline::model::ModelConfig;
use fleetpulse_pipeline::SchedulerConfig;

/// Worker configuration loaded from environment variables.
///
/// | Env Var                  | Default      |
/// |--------------------------|--------------|
/// | `DATABASE_URL`           | required     |
/// | `SCHEDULER_WORKERS`      | `1`          |
/// | `SCHEDULER_IDLE_MS`      | `100`        |
/// | `SCHEDULER_BACKOFF_SECS` | `5`          |
/// | `MIN_OPERATING_SPEED`    | `500`        |
/// | `RUL_MODEL_URL`          | -            |
/// | `RUL_MODEL_PATH`         | -            |
/// | `WEAR_LIMIT`             | `220`        |
/// | `RNF_PROBABILITY`        | `0.001`      |
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub database_url: String,
    pub workers: usize,
    pub scheduler: SchedulerConfig,
    pub model: ModelConfig,
    pub thresholds: FailureThresholds,
}

impl WorkerConfig {
    pub fn from_env() -> Result<Self, CoreError> {
        let workers: usize = config::env_or("SCHEDULER_WORKERS", 1)?;
        if workers == 0 {
            return Err(CoreError::Config("SCHEDULER_WORKERS must be at least 1".into()));
        }
        Ok(Self {
            database_url: config::env_required("DATABASE_URL")?,
            workers,
            scheduler: SchedulerConfig::from_env()?,
            model: ModelConfig::from_env()?,
            thresholds: FailureThresholds::from_env()?,
        })
    }
}
