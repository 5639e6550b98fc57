use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use fleetpulse_core::command::CommandOutcome;
use fleetpulse_core::message_types::{MSG_TYPE_CONTROL_RESULT, MSG_TYPE_PONG, PING_TEXT};
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};

use crate::state::AppState;

/// HTTP handler that upgrades a simulator link.
///
/// The link carries sensor messages upstream and control commands
/// downstream.
pub async fn ingest_ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_link(socket, state))
}

async fn handle_link(socket: WebSocket, state: AppState) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    tracing::info!(conn_id = %conn_id, "Simulator link connected");

    let mut rx = state.sim_links.add(conn_id.clone()).await;
    let (mut sink, mut stream) = socket.split();

    let sender_conn_id = conn_id.clone();
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sink.send(msg).await.is_err() {
                tracing::debug!(conn_id = %sender_conn_id, "Simulator link sink closed");
                break;
            }
        }
    });

    while let Some(result) = stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                if text.as_str() == PING_TEXT {
                    let pong = json!({ "type": MSG_TYPE_PONG }).to_string();
                    state.sim_links.send_to(&conn_id, Message::Text(pong.into())).await;
                    continue;
                }
                process_link_message(&state, &conn_id, text.as_str()).await;
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(conn_id = %conn_id, error = %e, "Simulator link receive error");
                break;
            }
        }
    }

    state.sim_links.remove(&conn_id).await;
    send_task.abort();
    tracing::info!(conn_id = %conn_id, "Simulator link disconnected");
}

/// Dispatch one upstream message: a command outcome or a sensor message.
async fn process_link_message(state: &AppState, conn_id: &str, text: &str) {
    let value: Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(conn_id = %conn_id, error = %e, "Invalid JSON on simulator link");
            return;
        }
    };

    if value.get("type").and_then(Value::as_str) == Some(MSG_TYPE_CONTROL_RESULT) {
        match serde_json::from_value::<CommandOutcome>(value) {
            Ok(outcome) => {
                tracing::info!(
                    device_uid = %outcome.device_uid,
                    success = outcome.success,
                    message = %outcome.message,
                    "Control command applied",
                );
                if let Ok(text) = serde_json::to_string(&outcome) {
                    state.ws_manager.broadcast(Message::Text(text.into())).await;
                }
            }
            Err(e) => tracing::warn!(conn_id = %conn_id, error = %e, "Malformed control result"),
        }
        return;
    }

    if let Err(e) = state.ingestor.ingest_or_drop(value).await {
        tracing::error!(conn_id = %conn_id, error = %e, "Failed to store sensor message");
    }
}
