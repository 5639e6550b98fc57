use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use fleetpulse_core::failure::{FailureClassifier, FailureThresholds};
use fleetpulse_db::{MemoryStore, PgStore, SensorStore};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fleetpulse_api::config::ServerConfig;
use fleetpulse_api::live::LiveBroadcaster;
use fleetpulse_api::router::build_app_router;
use fleetpulse_api::state::AppState;
use fleetpulse_api::ws;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fleetpulse_api=debug,fleetpulse_pipeline=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env().expect("Invalid server configuration");
    let thresholds = FailureThresholds::from_env().expect("Invalid failure thresholds");
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Store ---
    let store: Arc<dyn SensorStore> = match &config.database_url {
        Some(database_url) => {
            let pool = fleetpulse_db::create_pool(database_url)
                .await
                .expect("Failed to connect to database");
            fleetpulse_db::health_check(&pool)
                .await
                .expect("Database health check failed");
            fleetpulse_db::run_migrations(&pool)
                .await
                .expect("Failed to run database migrations");
            tracing::info!("Database ready");
            Arc::new(PgStore::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory store");
            Arc::new(MemoryStore::new())
        }
    };

    // --- App state ---
    let state = AppState::new(
        Arc::clone(&store),
        config.clone(),
        FailureClassifier::new(thresholds),
    );
    let cancel = CancellationToken::new();

    // --- Heartbeat ---
    let heartbeat_handle = ws::start_heartbeat(
        vec![Arc::clone(&state.ws_manager), Arc::clone(&state.sim_links)],
        cancel.clone(),
    );

    // --- Live broadcaster ---
    let broadcaster = LiveBroadcaster::new(
        store,
        Arc::clone(&state.ws_manager),
        state.classifier.clone(),
        config.live_tick,
        config.live_idle_tick,
        state.delivered.clone(),
    );
    let mut broadcast_handle = tokio::spawn(broadcaster.run(cancel.clone()));

    let ws_manager = Arc::clone(&state.ws_manager);
    let sim_links = Arc::clone(&state.sim_links);
    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    let server = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .into_future();

    // Serve until a signal, or until the broadcaster loses the store so
    // the supervisor can restart the process.
    let mut exit_code = 0;
    let mut broadcast_done = false;
    tokio::select! {
        result = server => result.expect("Server error"),
        joined = &mut broadcast_handle => {
            broadcast_done = true;
            match joined {
                Ok(Err(e)) => {
                    tracing::error!(error = %e, "Live broadcaster stopped on fatal store error");
                    exit_code = 1;
                }
                Ok(Ok(())) => tracing::warn!("Live broadcaster exited"),
                Err(e) => {
                    tracing::error!(error = %e, "Live broadcaster task panicked");
                    exit_code = 1;
                }
            }
        }
    }

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    cancel.cancel();
    if !broadcast_done
        && tokio::time::timeout(Duration::from_secs(5), broadcast_handle)
            .await
            .is_err()
    {
        tracing::warn!("Live broadcaster did not stop in time");
    }
    tracing::info!("Live broadcaster stopped");

    let ws_count = ws_manager.connection_count().await;
    let link_count = sim_links.connection_count().await;
    tracing::info!(ws_count, link_count, "Closing remaining WebSocket connections");
    ws_manager.shutdown_all().await;
    sim_links.shutdown_all().await;

    let _ = heartbeat_handle.await;
    tracing::info!("Graceful shutdown complete");
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
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
