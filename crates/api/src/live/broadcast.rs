//! Live broadcast loop.
//!
//! Polls the latest state of every device and pushes a payload to all
//! subscribers only when a device's [`LiveSignature`] changed since the
//! last delivery, either by a tick or by a new subscriber's snapshot.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::Message;
use fleetpulse_core::failure::FailureClassifier;
use fleetpulse_db::{SensorStore, StoreError};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::live::payload::{LivePayload, LiveSignature};
use crate::ws::WsManager;

/// Latest visible state of every device that has a reading.
pub async fn snapshot(
    store: &dyn SensorStore,
    classifier: &FailureClassifier,
) -> Result<Vec<LivePayload>, StoreError> {
    let latest = store.latest_per_device().await?;
    Ok(latest
        .iter()
        .map(|state| LivePayload::from_state(state, classifier))
        .collect())
}

/// Last delivered signature per device uid.
///
/// Shared by the broadcast loop and connect-time snapshots. A snapshot
/// taken while its subscriber is the only one connected is recorded here,
/// so the next tick does not repeat it.
#[derive(Debug, Clone, Default)]
pub struct DeliveredSignatures {
    inner: Arc<Mutex<HashMap<String, LiveSignature>>>,
}

impl DeliveredSignatures {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, device_uid: &str) -> Option<LiveSignature> {
        self.inner.lock().await.get(device_uid).copied()
    }

    async fn record(&self, device_uid: &str, signature: LiveSignature) {
        self.inner
            .lock()
            .await
            .insert(device_uid.to_string(), signature);
    }
}

/// Queue the latest state of every device for one new subscriber.
///
/// Returns how many payloads were queued.
pub async fn greet_subscriber(
    store: &dyn SensorStore,
    classifier: &FailureClassifier,
    subscribers: &WsManager,
    delivered: &DeliveredSignatures,
    conn_id: &str,
) -> Result<usize, StoreError> {
    let latest = store.latest_per_device().await?;
    // With other subscribers connected, their pending updates still have
    // to go out on the next tick.
    let sole_subscriber = subscribers.connection_count().await == 1;

    let mut queued = 0;
    for state in &latest {
        let payload = LivePayload::from_state(state, classifier);
        let text = match serde_json::to_string(&payload) {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode snapshot payload");
                continue;
            }
        };
        if !subscribers.send_to(conn_id, Message::Text(text.into())).await {
            break;
        }
        if sole_subscriber {
            delivered
                .record(&state.device.device_uid, LiveSignature::of(state))
                .await;
        }
        queued += 1;
    }
    Ok(queued)
}

pub struct LiveBroadcaster {
    store: Arc<dyn SensorStore>,
    subscribers: Arc<WsManager>,
    classifier: FailureClassifier,
    tick_interval: Duration,
    idle_interval: Duration,
    delivered: DeliveredSignatures,
}

impl LiveBroadcaster {
    pub fn new(
        store: Arc<dyn SensorStore>,
        subscribers: Arc<WsManager>,
        classifier: FailureClassifier,
        tick_interval: Duration,
        idle_interval: Duration,
        delivered: DeliveredSignatures,
    ) -> Self {
        Self {
            store,
            subscribers,
            classifier,
            tick_interval,
            idle_interval,
            delivered,
        }
    }

    /// Run until `cancel` fires. Only loss of the store ends the loop early.
    pub async fn run(self, cancel: CancellationToken) -> Result<(), StoreError> {
        tracing::info!(
            tick_ms = self.tick_interval.as_millis() as u64,
            idle_tick_ms = self.idle_interval.as_millis() as u64,
            "Live broadcaster started",
        );

        loop {
            let result = self.tick().await;
            let listening = self.subscribers.connection_count().await > 0;
            let pause = match result {
                Ok(_) if listening => self.tick_interval,
                Ok(_) => self.idle_interval,
                Err(e) if e.is_fatal() => {
                    tracing::error!(error = %e, "Live broadcaster lost its store");
                    return Err(e);
                }
                Err(e) => {
                    tracing::error!(error = %e, "Broadcast tick failed");
                    self.idle_interval
                }
            };

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(pause) => {}
            }
        }

        tracing::info!("Live broadcaster shutting down");
        Ok(())
    }

    /// One pass over all devices. Returns how many device payloads were
    /// broadcast; nothing is read while no subscriber is connected.
    pub async fn tick(&self) -> Result<usize, StoreError> {
        if self.subscribers.connection_count().await == 0 {
            return Ok(0);
        }

        let latest = self.store.latest_per_device().await?;
        let mut sent = 0;
        for state in &latest {
            let signature = LiveSignature::of(state);
            let uid = &state.device.device_uid;
            if self.delivered.get(uid).await == Some(signature) {
                continue;
            }

            let payload = LivePayload::from_state(state, &self.classifier);
            let text = match serde_json::to_string(&payload) {
                Ok(text) => text,
                Err(e) => {
                    tracing::error!(device_uid = %uid, error = %e, "Failed to encode live payload");
                    continue;
                }
            };

            let delivered = self.subscribers.broadcast(Message::Text(text.into())).await;
            tracing::trace!(device_uid = %uid, delivered, "Live payload broadcast");
            self.delivered.record(uid, signature).await;
            sent += 1;
        }
        Ok(sent)
    }
}
