use std::sync::Arc;

use fleetpulse_core::failure::FailureClassifier;
use fleetpulse_db::SensorStore;
use fleetpulse_pipeline::Ingestor;

use crate::config::ServerConfig;
use crate::live::DeliveredSignatures;
use crate::ws::WsManager;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable; inner data is behind `Arc` or is already `Clone`.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn SensorStore>,
    pub config: Arc<ServerConfig>,
    /// Live subscribers on `/ws/live`.
    pub ws_manager: Arc<WsManager>,
    /// Simulator links on `/ws/ingest`; control commands are relayed here.
    pub sim_links: Arc<WsManager>,
    pub ingestor: Ingestor,
    /// Rules used to derive `detected_failure` for visible payloads.
    pub classifier: FailureClassifier,
    /// Shared with the live broadcaster so snapshots are not re-sent.
    pub delivered: DeliveredSignatures,
}

impl AppState {
    pub fn new(
        store: Arc<dyn SensorStore>,
        config: ServerConfig,
        classifier: FailureClassifier,
    ) -> Self {
        Self {
            ingestor: Ingestor::new(Arc::clone(&store)),
            store,
            config: Arc::new(config),
            ws_manager: Arc::new(WsManager::new()),
            sim_links: Arc::new(WsManager::new()),
            classifier,
            delivered: DeliveredSignatures::new(),
        }
    }
}
