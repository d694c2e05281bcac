//! HTTP streaming transport handler.
//!
//! `POST /stream` carries raw 8 kHz PCM16 in the request body; the response
//! body streams raw canonical frames of session audio back. The session id
//! comes from an `X-Session-UUID` request header, with a generated UUID as
//! fallback. There is no in-band signal channel on this transport, so
//! interruptions are not surfaced; a session error terminates the response
//! stream.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use futures_util::StreamExt;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::bridge::{BridgeState, ConnectionBridge, TransportEvent};
use crate::state::AppState;

/// Header carrying the client-chosen session id.
pub const SESSION_HEADER: &str = "x-session-uuid";

/// Channel capacity for outbound transport events.
const TRANSPORT_CHANNEL_CAPACITY: usize = 256;

/// Handler for `POST /stream`.
pub async fn stream_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Body,
) -> Response {
    let session_id = headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    tracing::info!(session_id = %session_id, "Stream connection opened");

    let (transport_tx, mut transport_rx) = mpsc::channel(TRANSPORT_CHANNEL_CAPACITY);
    let (mut bridge, mut event_rx) = match ConnectionBridge::new(
        session_id.clone(),
        state.sessions.clone(),
        state.tools.clone(),
        transport_tx,
    ) {
        Ok(pair) => pair,
        Err(e) => {
            tracing::error!(session_id = %session_id, "Failed to create bridge: {}", e);
            return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
        }
    };

    let instructions = state
        .config
        .instructions
        .resolve(&state.http, &session_id)
        .await;
    bridge.open(state.live_config(instructions)).await;

    // Drive inbound audio and session events; the response stream below only
    // consumes transport events.
    let driver_id = session_id.clone();
    tokio::spawn(async move {
        let mut inbound = body.into_data_stream();

        while bridge.state() != BridgeState::Closed {
            tokio::select! {
                chunk = inbound.next() => {
                    match chunk {
                        Some(Ok(bytes)) => bridge.handle_client_audio(&bytes).await,
                        Some(Err(e)) => {
                            tracing::warn!(session_id = %driver_id, "Request body error: {}", e);
                            break;
                        }
                        None => {
                            tracing::debug!(session_id = %driver_id, "Request body finished");
                            break;
                        }
                    }
                }

                Some(event) = event_rx.recv() => {
                    bridge.handle_session_event(event).await;
                }
            }
        }

        bridge.shutdown().await;
        tracing::info!(session_id = %driver_id, "Stream connection finished");
    });

    let outbound = async_stream::stream! {
        while let Some(event) = transport_rx.recv().await {
            match event {
                TransportEvent::Frame(frame) => yield Ok(frame),
                // No signal channel on a raw byte stream
                TransportEvent::Interruption => {}
                TransportEvent::Error(message) => {
                    yield Err(std::io::Error::other(message));
                    break;
                }
                TransportEvent::Close => break,
            }
        }
    };

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(SESSION_HEADER, session_id)
        .body(Body::from_stream(outbound))
        .unwrap_or_else(|e| {
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        })
}
