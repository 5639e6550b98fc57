//! Regression model boundary.
//!
//! The scheduler only sees [`RulModel`]. Two backends exist: a remote
//! inference service reached over HTTP and a linear model loaded from a
//! JSON coefficients file. The process-wide instance is initialised once
//! at startup and never reloaded; a new model means a redeploy.

use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use fleetpulse_core::config;
use fleetpulse_core::error::CoreError;
use fleetpulse_core::sensor::FEATURE_COUNT;
use serde::{Deserialize, Serialize};

/// Default timeout for one remote inference call.
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// The backend could not be reached; the reading stays pending.
    #[error("Regression model unavailable: {0}")]
    Unavailable(String),

    #[error("Regression model returned an invalid value: {0}")]
    InvalidOutput(String),

    #[error("Failed to load regression model: {0}")]
    Load(String),

    #[error("Regression model already initialised")]
    AlreadyInitialized,
}

/// Predicts remaining useful life [hours] from the five model features.
#[async_trait]
pub trait RulModel: Send + Sync {
    async fn predict(&self, features: &[f64; FEATURE_COUNT]) -> Result<f64, ModelError>;

    /// Short backend description for logs.
    fn describe(&self) -> String;
}

// ---------------------------------------------------------------------------
// HTTP backend
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct PredictRequest<'a> {
    features: &'a [f64; FEATURE_COUNT],
}

#[derive(Deserialize)]
struct PredictResponse {
    rul: f64,
}

/// Remote inference service: `POST {url}` with `{"features": [..]}`,
/// answering `{"rul": <hours>}`.
pub struct HttpRulModel {
    client: reqwest::Client,
    url: String,
}

impl HttpRulModel {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, ModelError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ModelError::Load(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl RulModel for HttpRulModel {
    async fn predict(&self, features: &[f64; FEATURE_COUNT]) -> Result<f64, ModelError> {
        let response = self
            .client
            .post(&self.url)
            .json(&PredictRequest { features })
            .send()
            .await
            .map_err(|e| ModelError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ModelError::Unavailable(format!(
                "inference service answered {}",
                response.status()
            )));
        }

        let body: PredictResponse = response
            .json()
            .await
            .map_err(|e| ModelError::InvalidOutput(e.to_string()))?;
        finite(body.rul)
    }

    fn describe(&self) -> String {
        format!("http({})", self.url)
    }
}

// ---------------------------------------------------------------------------
// Linear backend
// ---------------------------------------------------------------------------

/// Standardised linear regression: `intercept + Σ w_i · (x_i − mean_i) / scale_i`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearRulModel {
    pub intercept: f64,
    pub coefficients: [f64; FEATURE_COUNT],
    #[serde(default = "zeros")]
    pub mean: [f64; FEATURE_COUNT],
    #[serde(default = "ones")]
    pub scale: [f64; FEATURE_COUNT],
}

fn zeros() -> [f64; FEATURE_COUNT] {
    [0.0; FEATURE_COUNT]
}

fn ones() -> [f64; FEATURE_COUNT] {
    [1.0; FEATURE_COUNT]
}

impl LinearRulModel {
    /// Load coefficients from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ModelError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ModelError::Load(format!("{}: {e}", path.display())))?;
        let model: Self = serde_json::from_str(&raw)
            .map_err(|e| ModelError::Load(format!("{}: {e}", path.display())))?;
        model.validate()?;
        Ok(model)
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        if self.scale.iter().any(|s| *s == 0.0 || !s.is_finite()) {
            return Err(ModelError::Load(
                "scale entries must be finite and non-zero".into(),
            ));
        }
        let all = std::iter::once(&self.intercept)
            .chain(&self.coefficients)
            .chain(&self.mean);
        if all.into_iter().any(|v| !v.is_finite()) {
            return Err(ModelError::Load("coefficients must be finite".into()));
        }
        Ok(())
    }

    pub fn evaluate(&self, features: &[f64; FEATURE_COUNT]) -> f64 {
        features
            .iter()
            .zip(&self.coefficients)
            .zip(self.mean.iter().zip(&self.scale))
            .fold(self.intercept, |acc, ((x, w), (m, s))| acc + w * (x - m) / s)
    }
}

#[async_trait]
impl RulModel for LinearRulModel {
    async fn predict(&self, features: &[f64; FEATURE_COUNT]) -> Result<f64, ModelError> {
        finite(self.evaluate(features))
    }

    fn describe(&self) -> String {
        "linear".to_string()
    }
}

fn finite(rul: f64) -> Result<f64, ModelError> {
    if rul.is_finite() {
        Ok(rul)
    } else {
        Err(ModelError::InvalidOutput(format!("non-finite RUL {rul}")))
    }
}

// ---------------------------------------------------------------------------
// Configuration and the process-wide instance
// ---------------------------------------------------------------------------

/// Which backend to build. `RUL_MODEL_URL` wins over `RUL_MODEL_PATH`.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelConfig {
    Http { url: String, timeout: Duration },
    Linear { path: PathBuf },
}

impl ModelConfig {
    pub fn from_env() -> Result<Self, CoreError> {
        if let Some(url) = config::env_opt::<String>("RUL_MODEL_URL")? {
            let timeout_secs: u64 =
                config::env_or("RUL_MODEL_TIMEOUT_SECS", DEFAULT_HTTP_TIMEOUT.as_secs())?;
            return Ok(ModelConfig::Http {
                url,
                timeout: Duration::from_secs(timeout_secs),
            });
        }
        if let Some(path) = config::env_opt::<PathBuf>("RUL_MODEL_PATH")? {
            return Ok(ModelConfig::Linear { path });
        }
        Err(CoreError::Config("set RUL_MODEL_URL or RUL_MODEL_PATH".to_string()))
    }

    pub fn build(&self) -> Result<Arc<dyn RulModel>, ModelError> {
        match self {
            ModelConfig::Http { url, timeout } => {
                Ok(Arc::new(HttpRulModel::new(url.clone(), *timeout)?))
            }
            ModelConfig::Linear { path } => Ok(Arc::new(LinearRulModel::from_file(path)?)),
        }
    }
}

static GLOBAL_MODEL: OnceLock<Arc<dyn RulModel>> = OnceLock::new();

/// Install the process-wide model. A second call fails.
pub fn init_global(model: Arc<dyn RulModel>) -> Result<Arc<dyn RulModel>, ModelError> {
    GLOBAL_MODEL
        .set(Arc::clone(&model))
        .map_err(|_| ModelError::AlreadyInitialized)?;
    tracing::info!(model = %model.describe(), "Regression model initialised");
    Ok(model)
}

/// The process-wide model, if [`init_global`] has run.
pub fn global() -> Option<Arc<dyn RulModel>> {
    GLOBAL_MODEL.get().cloned()
}
