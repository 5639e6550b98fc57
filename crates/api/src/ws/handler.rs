use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use fleetpulse_core::message_types::{MSG_TYPE_PONG, PING_TEXT};
use futures::{SinkExt, StreamExt};
use serde_json::json;

use crate::live;
use crate::state::AppState;
use crate::ws::manager::WsManager;

/// HTTP handler that upgrades a live subscriber connection.
pub async fn live_ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Manage a single subscriber connection after upgrade.
///
/// Registers the connection, queues a snapshot of every device, then
/// forwards broadcast messages until the client goes away.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    tracing::info!(conn_id = %conn_id, "Live subscriber connected");

    let ws_manager: Arc<WsManager> = Arc::clone(&state.ws_manager);
    let mut rx = ws_manager.add(conn_id.clone()).await;

    send_snapshot(&state, &conn_id).await;

    let (mut sink, mut stream) = socket.split();

    // Sender task: forward channel messages to the WebSocket sink.
    let sender_conn_id = conn_id.clone();
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sink.send(msg).await.is_err() {
                tracing::debug!(conn_id = %sender_conn_id, "WebSocket sink closed");
                break;
            }
        }
    });

    while let Some(result) = stream.next().await {
        match result {
            Ok(Message::Text(text)) if text.as_str() == PING_TEXT => {
                let pong = json!({ "type": MSG_TYPE_PONG }).to_string();
                ws_manager.send_to(&conn_id, Message::Text(pong.into())).await;
            }
            Ok(Message::Close(_)) => break,
            Ok(Message::Pong(_)) => {
                tracing::trace!(conn_id = %conn_id, "Pong received");
            }
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(conn_id = %conn_id, error = %e, "WebSocket receive error");
                break;
            }
        }
    }

    ws_manager.remove(&conn_id).await;
    send_task.abort();
    tracing::info!(conn_id = %conn_id, "Live subscriber disconnected");
}

/// Queue the latest state of every device for one new subscriber.
async fn send_snapshot(state: &AppState, conn_id: &str) {
    let queued = live::greet_subscriber(
        state.store.as_ref(),
        &state.classifier,
        &state.ws_manager,
        &state.delivered,
        conn_id,
    )
    .await;
    match queued {
        Ok(devices) => tracing::debug!(conn_id = %conn_id, devices, "Snapshot queued"),
        Err(e) => tracing::warn!(conn_id = %conn_id, error = %e, "Snapshot unavailable"),
    }
}
