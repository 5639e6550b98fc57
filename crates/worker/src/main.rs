use std::sync::Arc;
use std::time::Duration;

use fleetpulse_core::failure::FailureClassifier;
use fleetpulse_db::{PgStore, SensorStore};
use fleetpulse_pipeline::{model, PredictionScheduler};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;

use config::WorkerConfig;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fleetpulse_worker=debug,fleetpulse_pipeline=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = WorkerConfig::from_env().expect("Invalid worker configuration");
    tracing::info!(workers = config.workers, "Loaded worker configuration");

    // --- Database ---
    let pool = fleetpulse_db::create_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");
    fleetpulse_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    fleetpulse_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database ready");
    let store: Arc<dyn SensorStore> = Arc::new(PgStore::new(pool));

    // --- Regression model ---
    let built = config.model.build().expect("Failed to load regression model");
    let rul_model = model::init_global(built).expect("Regression model initialised twice");

    // --- Schedulers ---
    let cancel = CancellationToken::new();
    let classifier = FailureClassifier::new(config.thresholds.clone());
    let mut schedulers = JoinSet::new();
    for worker in 0..config.workers {
        let scheduler = PredictionScheduler::new(
            Arc::clone(&store),
            Arc::clone(&rul_model),
            classifier.clone(),
            config.scheduler.clone(),
        );
        let cancel = cancel.clone();
        schedulers.spawn(async move {
            let result = scheduler.run(cancel).await;
            (worker, result)
        });
    }

    // Stop everything on a signal, or as soon as one scheduler loses the
    // store so the supervisor can restart the process.
    let mut exit_code = 0;
    tokio::select! {
        () = shutdown_signal() => {}
        Some(joined) = schedulers.join_next() => {
            match joined {
                Ok((worker, Err(e))) => {
                    tracing::error!(worker, error = %e, "Scheduler stopped on fatal store error");
                    exit_code = 1;
                }
                Ok((worker, Ok(()))) => tracing::warn!(worker, "Scheduler exited"),
                Err(e) => {
                    tracing::error!(error = %e, "Scheduler task panicked");
                    exit_code = 1;
                }
            }
        }
    }

    cancel.cancel();
    let drained = tokio::time::timeout(Duration::from_secs(10), async {
        while schedulers.join_next().await.is_some() {}
    })
    .await;
    if drained.is_err() {
        tracing::warn!("Schedulers did not stop in time, aborting");
        schedulers.abort_all();
    }

    tracing::info!("Worker shut down");
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
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
        () = ctrl_c => tracing::info!("Received SIGINT, shutting down"),
        () = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}
