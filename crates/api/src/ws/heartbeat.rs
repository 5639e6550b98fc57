use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::ws::manager::WsManager;

/// Interval between heartbeat pings (in seconds).
const HEARTBEAT_INTERVAL_SECS: u64 = 30;

/// Spawn a background task that sends periodic Ping frames to every
/// connection of each given manager until `cancel` fires.
pub fn start_heartbeat(
    managers: Vec<Arc<WsManager>>,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(HEARTBEAT_INTERVAL_SECS));

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    for manager in &managers {
                        let count = manager.connection_count().await;
                        tracing::debug!(count, "WebSocket heartbeat ping");
                        manager.ping_all().await;
                    }
                }
            }
        }
    })
}
