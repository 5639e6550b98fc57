use std::time::Duration;

use fleetpulse_core::config;
use fleetpulse_core::error::CoreError;

/// Server configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS`.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Broadcast tick while subscribers are connected.
    pub live_tick: Duration,
    /// Broadcast tick while nobody is listening.
    pub live_idle_tick: Duration,
    /// PostgreSQL URL; `None` runs against the in-memory store.
    pub database_url: Option<String>,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default                    |
    /// |------------------------|----------------------------|
    /// | `HOST`                 | `0.0.0.0`                  |
    /// | `PORT`                 | `3000`                     |
    /// | `CORS_ORIGINS`         | `http://localhost:5173`    |
    /// | `REQUEST_TIMEOUT_SECS` | `30`                       |
    /// | `LIVE_TICK_MS`         | `100`                      |
    /// | `LIVE_IDLE_TICK_MS`    | `1000`                     |
    /// | `DATABASE_URL`         | unset (in-memory store)    |
    pub fn from_env() -> Result<Self, CoreError> {
        let cors_origins = config::env_or("CORS_ORIGINS", "http://localhost:5173".to_string())?
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let live_tick_ms: u64 = config::env_or("LIVE_TICK_MS", 100)?;
        let live_idle_tick_ms: u64 = config::env_or("LIVE_IDLE_TICK_MS", 1000)?;
        if live_tick_ms == 0 || live_idle_tick_ms == 0 {
            return Err(CoreError::Config("live tick intervals must be positive".into()));
        }

        Ok(Self {
            host: config::env_or("HOST", "0.0.0.0".to_string())?,
            port: config::env_or("PORT", 3000)?,
            cors_origins,
            request_timeout_secs: config::env_or("REQUEST_TIMEOUT_SECS", 30)?,
            live_tick: Duration::from_millis(live_tick_ms),
            live_idle_tick: Duration::from_millis(live_idle_tick_ms),
            database_url: config::env_opt("DATABASE_URL")?,
        })
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            cors_origins: vec!["http://localhost:5173".to_string()],
            request_timeout_secs: 30,
            live_tick: Duration::from_millis(100),
            live_idle_tick: Duration::from_millis(1000),
            database_url: None,
        }
    }
}
