//! `fleetpulse-simulator` -- simulated machine fleet.
//!
//! Runs one task per device, each replaying a scenario signal table with
//! noise and wear, and pushes readings to the backend's simulator link.
//! Control commands from the backend are applied between ticks. Without
//! `BACKEND_WS_URL` readings are printed to stdout as JSON lines.
//!
//! # Environment variables
//!
//! | Variable              | Default  | Description                                  |
//! |-----------------------|----------|----------------------------------------------|
//! | `BACKEND_WS_URL`      | --       | e.g. `ws://host:3000/ws/ingest`              |
//! | `SIM_DEVICES`         | `1`      | Number of simulated devices                  |
//! | `SIM_INTERVAL_SECS`   | `2.0`    | Seconds between readings per device          |
//! | `SIM_WEAR_MULTIPLIER` | `1.0`    | Scales per-tick wear accumulation            |
//! | `SIM_TABLE_LEN`       | `2000`   | Rows in each generated signal table          |
//! | `SIM_SEED`            | --       | Fixed seed for reproducible runs             |
//! | `SIM_SCENARIO`        | random   | Scenario for every device                    |

use fleetpulse_core::failure::{FailureClassifier, FailureThresholds};
use fleetpulse_simulator::config::SimulatorConfig;
use fleetpulse_simulator::runtime::SimulatorRuntime;
use fleetpulse_simulator::sender;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Readings buffered between the devices and the link.
const READING_CAPACITY: usize = 1024;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fleetpulse_simulator=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = SimulatorConfig::from_env().unwrap_or_else(|e| {
        tracing::error!(error = %e, "Invalid simulator configuration");
        std::process::exit(1);
    });
    let thresholds = FailureThresholds::from_env().unwrap_or_else(|e| {
        tracing::error!(error = %e, "Invalid failure thresholds");
        std::process::exit(1);
    });

    tracing::info!(
        devices = config.devices,
        interval_ms = config.interval.as_millis() as u64,
        scenario = ?config.scenario,
        backend = config.backend_ws_url.as_deref().unwrap_or("stdout"),
        "Starting fleetpulse-simulator",
    );

    let cancel = CancellationToken::new();
    let (runtime, channels) = SimulatorRuntime::spawn(
        &config,
        FailureClassifier::new(thresholds),
        READING_CAPACITY,
        cancel.clone(),
    );

    let link = match config.backend_ws_url.clone() {
        Some(url) => {
            let router = runtime.router();
            let cancel = cancel.clone();
            tokio::spawn(async move { sender::run(&url, channels, router, cancel).await })
        }
        None => tokio::spawn(sender::print_readings(channels, cancel.clone())),
    };

    shutdown_signal().await;
    cancel.cancel();

    if let Err(e) = link.await {
        tracing::error!(error = %e, "Link task failed");
    }
    runtime.join().await;
    tracing::info!("Simulator stopped");
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received SIGINT (Ctrl-C), shutting down"),
        () = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}
