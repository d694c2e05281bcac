//! WebSocket transport handler.
//!
//! Protocol: the client connects, sends an `init` message carrying its
//! session id, then streams base64 audio. Session audio flows back as
//! base64-framed `audio` messages, interleaved with `interruption` and
//! terminal `error` signals. The server closes the socket when the live
//! session ends.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use base64::prelude::*;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::bridge::{BridgeState, ConnectionBridge, TransportEvent};
use crate::handlers::messages::{ClientMessage, ServerMessage};
use crate::state::AppState;

/// Connections idle this long are closed.
const IDLE_TIMEOUT: Duration = Duration::from_secs(300);

/// Channel capacity for outbound transport events.
const TRANSPORT_CHANNEL_CAPACITY: usize = 256;

/// Upgrade handler for `GET /ws`.
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    tracing::info!("Client connected");
    let (sender, mut receiver) = socket.split();

    let (transport_tx, transport_rx) = mpsc::channel(TRANSPORT_CHANNEL_CAPACITY);
    let sender_task = tokio::spawn(forward_transport_events(transport_rx, sender));

    // The first accepted message must be init; audio before it is dropped
    let Some(session_id) = await_init(&mut receiver).await else {
        drop(transport_tx);
        let _ = sender_task.await;
        tracing::info!("Client disconnected before init");
        return;
    };
    tracing::info!(session_id = %session_id, "Session initialized");

    let (mut bridge, mut event_rx) = match ConnectionBridge::new(
        session_id.clone(),
        state.sessions.clone(),
        state.tools.clone(),
        transport_tx.clone(),
    ) {
        Ok(pair) => pair,
        Err(e) => {
            tracing::error!(session_id = %session_id, "Failed to create bridge: {}", e);
            let _ = transport_tx
                .send(TransportEvent::Error(e.to_string()))
                .await;
            let _ = transport_tx.send(TransportEvent::Close).await;
            drop(transport_tx);
            let _ = sender_task.await;
            return;
        }
    };
    drop(transport_tx);

    let instructions = state
        .config
        .instructions
        .resolve(&state.http, &session_id)
        .await;
    bridge.open(state.live_config(instructions)).await;

    let mut last_activity = Instant::now();
    let mut idle_check = tokio::time::interval(Duration::from_secs(30));

    while bridge.state() != BridgeState::Closed {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(message)) => {
                        last_activity = Instant::now();
                        if !process_client_message(message, &mut bridge).await {
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        tracing::warn!(session_id = %session_id, "WebSocket error: {}", e);
                        break;
                    }
                    None => break,
                }
            }

            Some(event) = event_rx.recv() => {
                bridge.handle_session_event(event).await;
            }

            _ = idle_check.tick() => {
                if last_activity.elapsed() > IDLE_TIMEOUT {
                    tracing::info!(session_id = %session_id, "Closing idle connection");
                    break;
                }
            }
        }
    }

    bridge.shutdown().await;
    let _ = sender_task.await;
    tracing::info!(session_id = %session_id, "Client connection finished");
}

/// Wait for the client's init message. Returns `None` if the socket closes
/// first. Non-init messages are dropped with a log line.
async fn await_init(receiver: &mut SplitStream<WebSocket>) -> Option<String> {
    while let Some(Ok(message)) = receiver.next().await {
        let Message::Text(text) = message else {
            continue;
        };
        match serde_json::from_str::<ClientMessage>(&text) {
            Ok(ClientMessage::Init { uuid }) => return Some(uuid),
            Ok(ClientMessage::Audio { .. }) => {
                tracing::trace!("Dropping audio received before init");
            }
            Err(e) => {
                tracing::warn!("Malformed client message before init: {}", e);
            }
        }
    }
    None
}

/// Handle one client message. Returns `false` when the connection should
/// close.
async fn process_client_message(message: Message, bridge: &mut ConnectionBridge) -> bool {
    match message {
        Message::Text(text) => {
            match serde_json::from_str::<ClientMessage>(&text) {
                Ok(ClientMessage::Audio { audio }) => match BASE64_STANDARD.decode(&audio) {
                    Ok(pcm) => bridge.handle_client_audio(&pcm).await,
                    Err(e) => tracing::warn!("Invalid base64 audio payload: {}", e),
                },
                Ok(ClientMessage::Init { .. }) => {
                    tracing::warn!("Ignoring duplicate init message");
                }
                Err(e) => {
                    // Transient: drop the message, keep the connection
                    tracing::warn!("Malformed client message: {}", e);
                }
            }
            true
        }
        Message::Close(_) => {
            tracing::debug!("Client sent close frame");
            false
        }
        // Pings are answered by axum; binary and pongs are ignored
        _ => true,
    }
}

/// Drain transport events into the WebSocket until `Close`.
async fn forward_transport_events(
    mut transport_rx: mpsc::Receiver<TransportEvent>,
    mut sender: SplitSink<WebSocket, Message>,
) {
    while let Some(event) = transport_rx.recv().await {
        let outbound = match event {
            TransportEvent::Frame(frame) => ServerMessage::Audio {
                audio: BASE64_STANDARD.encode(&frame),
            },
            TransportEvent::Interruption => ServerMessage::Interruption,
            TransportEvent::Error(message) => ServerMessage::Error { message },
            TransportEvent::Close => {
                let _ = sender.send(Message::Close(None)).await;
                break;
            }
        };

        match serde_json::to_string(&outbound) {
            Ok(json) => {
                if sender.send(Message::Text(json.into())).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                tracing::error!("Failed to serialize server message: {}", e);
            }
        }
    }
}
