//! Simulator link transport.
//!
//! Pushes readings and command outcomes to the API's simulator link
//! WebSocket and routes incoming control envelopes to device inboxes.
//! Without a backend URL, readings are printed to stdout as JSON lines.

use std::time::Duration;

use fleetpulse_core::command::ControlEnvelope;
use fleetpulse_core::message_types::MSG_TYPE_CONTROL;
use futures::{Sink, SinkExt, StreamExt};
use serde::Serialize;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use crate::runtime::{CommandRouter, RuntimeChannels};

/// Reconnection delay after a WebSocket failure.
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Why a session ended.
#[derive(Debug, PartialEq, Eq)]
enum SessionEnd {
    /// Connection lost; reconnect.
    Disconnected,
    /// Cancelled or the runtime stopped producing; do not reconnect.
    Finished,
}

/// What an incoming text frame asks for.
#[derive(Debug, PartialEq)]
pub enum Incoming {
    Control(ControlEnvelope),
    Ignored,
}

/// Parse an incoming text frame. Only `control` messages are acted on.
pub fn parse_incoming(text: &str) -> Incoming {
    let value: serde_json::Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(error = %e, raw = %text, "Malformed incoming message");
            return Incoming::Ignored;
        }
    };
    if value.get("type").and_then(|t| t.as_str()) != Some(MSG_TYPE_CONTROL) {
        return Incoming::Ignored;
    }
    match serde_json::from_value(value) {
        Ok(envelope) => Incoming::Control(envelope),
        Err(e) => {
            tracing::warn!(error = %e, raw = %text, "Invalid control message");
            Incoming::Ignored
        }
    }
}

/// Print readings to stdout until cancelled or the runtime stops.
pub async fn print_readings(mut channels: RuntimeChannels, cancel: CancellationToken) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            reading = channels.readings.recv() => {
                let Some(reading) = reading else { break };
                match serde_json::to_string(&reading) {
                    Ok(json) => println!("{json}"),
                    Err(e) => tracing::error!(error = %e, "Failed to encode reading"),
                }
            }
        }
    }
}

/// Run the link until cancelled, reconnecting with a fixed delay.
pub async fn run(
    ws_url: &str,
    mut channels: RuntimeChannels,
    router: CommandRouter,
    cancel: CancellationToken,
) {
    loop {
        tracing::info!(url = %ws_url, "Connecting to backend WebSocket");

        let connected = tokio::select! {
            _ = cancel.cancelled() => return,
            result = connect_async(ws_url) => result,
        };
        match connected {
            Ok((ws_stream, _response)) => {
                tracing::info!("WebSocket connected");
                match run_session(ws_stream, &mut channels, &router, &cancel).await {
                    SessionEnd::Finished => return,
                    SessionEnd::Disconnected => {
                        tracing::warn!("WebSocket session ended, reconnecting");
                    }
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "WebSocket connection failed");
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(RECONNECT_DELAY) => {}
        }
    }
}

/// Drive one session: forward readings and outcomes, and route commands.
async fn run_session(
    ws_stream: tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
    channels: &mut RuntimeChannels,
    router: &CommandRouter,
    cancel: &CancellationToken,
) -> SessionEnd {
    let (mut sink, mut stream) = ws_stream.split();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = sink.send(Message::Close(None)).await;
                return SessionEnd::Finished;
            }
            reading = channels.readings.recv() => {
                let Some(reading) = reading else { return SessionEnd::Finished };
                if let Err(e) = send_json(&mut sink, &reading).await {
                    tracing::error!(error = %e, "Failed to send reading");
                    return SessionEnd::Disconnected;
                }
            }
            Some(outcome) = channels.outcomes.recv() => {
                if let Err(e) = send_json(&mut sink, &outcome).await {
                    tracing::error!(error = %e, "Failed to send command outcome");
                    return SessionEnd::Disconnected;
                }
            }
            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if let Incoming::Control(envelope) = parse_incoming(&text) {
                            route_command(&mut sink, router, envelope).await;
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        tracing::info!(?frame, "Backend closed WebSocket");
                        return SessionEnd::Disconnected;
                    }
                    Some(Ok(_)) => {
                        // Ping/pong are answered by tungstenite; binary is ignored.
                    }
                    Some(Err(e)) => {
                        tracing::error!(error = %e, "WebSocket receive error");
                        return SessionEnd::Disconnected;
                    }
                    None => {
                        tracing::info!("WebSocket stream exhausted");
                        return SessionEnd::Disconnected;
                    }
                }
            }
        }
    }
}

/// Queue a command; an unroutable one is answered immediately.
async fn route_command<S>(sink: &mut S, router: &CommandRouter, envelope: ControlEnvelope)
where
    S: Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
{
    if let Err(outcome) = router.route(envelope) {
        if let Err(e) = send_json(sink, &outcome).await {
            tracing::error!(error = %e, "Failed to send command outcome");
        }
    }
}

async fn send_json<S, T>(sink: &mut S, payload: &T) -> Result<(), tokio_tungstenite::tungstenite::Error>
where
    S: Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
    T: Serialize,
{
    let json = serde_json::to_string(payload)
        .map_err(|e| tokio_tungstenite::tungstenite::Error::Io(std::io::Error::other(e)))?;
    sink.send(Message::Text(json)).await
}
