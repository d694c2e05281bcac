//! Gemini Live API client implementation.
//!
//! This module provides the client that implements the `BaseLiveSession`
//! trait over Gemini's BidiGenerateContent WebSocket protocol.
//!
//! # Protocol
//!
//! - Endpoint: `GEMINI_LIVE_URL`, authenticated via the `x-goog-api-key` header
//! - First client message is `setup`; the server answers `setupComplete`
//!   once the session is ready for realtime input
//! - Audio travels base64-encoded inside JSON; the server may use binary
//!   WebSocket frames that still carry JSON

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use base64::prelude::*;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{self, Message};

use super::config::{GEMINI_LIVE_URL, qualified_model};
use super::messages::{
    Blob, ClientMessage, Content, FunctionResponse, GenerationConfig, RealtimeInput, ServerMessage,
    Setup, ThinkingConfig, ToolDecls, ToolResponse,
};
use crate::core::live::base::{
    AudioChunkCallback, BaseLiveSession, ClosedCallback, InterruptedCallback, LiveError,
    LiveResult, LiveSessionConfig, OpenCallback, SessionErrorCallback, ToolCallCallback,
    ToolCallRequest, ToolCallResult,
};

/// Channel capacity for outgoing WebSocket messages.
const WS_CHANNEL_CAPACITY: usize = 256;

/// Gemini Live API client.
///
/// All mutable state is behind `Arc` so it can be shared with the spawned
/// connection task. The session is never reconnected: a lost connection is
/// terminal and surfaces through `on_error` / `on_closed`, leaving the
/// decision to the owner.
pub struct GeminiLive {
    /// Configuration
    config: LiveSessionConfig,
    /// Connected flag, shared with the connection task
    connected: Arc<AtomicBool>,
    /// WebSocket sender channel
    ws_sender: Arc<Mutex<Option<mpsc::Sender<ClientMessage>>>>,

    /// Callbacks
    open_callback: Arc<Mutex<Option<OpenCallback>>>,
    audio_callback: Arc<Mutex<Option<AudioChunkCallback>>>,
    tool_call_callback: Arc<Mutex<Option<ToolCallCallback>>>,
    interrupted_callback: Arc<Mutex<Option<InterruptedCallback>>>,
    error_callback: Arc<Mutex<Option<SessionErrorCallback>>>,
    closed_callback: Arc<Mutex<Option<ClosedCallback>>>,

    /// Connection task handle
    connection_handle: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl GeminiLive {
    /// Create a new client. Fails when no API key is configured.
    pub fn new(config: LiveSessionConfig) -> LiveResult<Self> {
        if config.api_key.is_empty() {
            return Err(LiveError::AuthenticationFailed(
                "API key is required".to_string(),
            ));
        }
        if config.model.is_empty() {
            return Err(LiveError::InvalidConfiguration(
                "model is required".to_string(),
            ));
        }

        Ok(Self {
            config,
            connected: Arc::new(AtomicBool::new(false)),
            ws_sender: Arc::new(Mutex::new(None)),
            open_callback: Arc::new(Mutex::new(None)),
            audio_callback: Arc::new(Mutex::new(None)),
            tool_call_callback: Arc::new(Mutex::new(None)),
            interrupted_callback: Arc::new(Mutex::new(None)),
            error_callback: Arc::new(Mutex::new(None)),
            closed_callback: Arc::new(Mutex::new(None)),
            connection_handle: Arc::new(Mutex::new(None)),
        })
    }

    /// Build the initial setup payload from the configuration.
    fn build_setup(&self) -> Setup {
        let thinking_config = if self.config.thinking_level.is_some()
            || self.config.thinking_budget.is_some()
        {
            Some(ThinkingConfig {
                thinking_level: self.config.thinking_level.clone(),
                thinking_budget: self.config.thinking_budget,
            })
        } else {
            None
        };

        let tools = if self.config.tools.is_empty() {
            None
        } else {
            Some(vec![ToolDecls {
                function_declarations: self.config.tools.clone(),
            }])
        };

        Setup {
            model: qualified_model(&self.config.model),
            generation_config: GenerationConfig {
                response_modalities: vec!["AUDIO".to_string()],
                thinking_config,
            },
            system_instruction: self
                .config
                .instructions
                .as_ref()
                .map(|text| Content::from_text(text.clone())),
            tools,
        }
    }

    /// Handle one server message, dispatching to the registered callbacks.
    async fn handle_server_message(
        msg: ServerMessage,
        open_cb: &Arc<Mutex<Option<OpenCallback>>>,
        audio_cb: &Arc<Mutex<Option<AudioChunkCallback>>>,
        tool_call_cb: &Arc<Mutex<Option<ToolCallCallback>>>,
        interrupted_cb: &Arc<Mutex<Option<InterruptedCallback>>>,
        error_cb: &Arc<Mutex<Option<SessionErrorCallback>>>,
    ) {
        if msg.setup_complete.is_some() {
            tracing::info!("Gemini Live session ready");
            if let Some(cb) = open_cb.lock().await.as_ref() {
                cb().await;
            }
            return;
        }

        if let Some(content) = msg.server_content {
            if content.interrupted == Some(true) {
                tracing::debug!("Gemini Live output interrupted");
                if let Some(cb) = interrupted_cb.lock().await.as_ref() {
                    cb().await;
                }
            }

            if let Some(turn) = content.model_turn {
                for part in turn.parts {
                    let Some(inline) = part.inline_data else {
                        continue;
                    };
                    match BASE64_STANDARD.decode(&inline.data) {
                        Ok(audio_bytes) => {
                            if let Some(cb) = audio_cb.lock().await.as_ref() {
                                cb(Bytes::from(audio_bytes)).await;
                            }
                        }
                        Err(e) => {
                            tracing::error!("Failed to decode inline audio: {}", e);
                            if let Some(cb) = error_cb.lock().await.as_ref() {
                                cb(LiveError::SerializationError(e.to_string())).await;
                            }
                        }
                    }
                }
            }

            if content.turn_complete == Some(true) {
                tracing::trace!("Gemini Live turn complete");
            }
            return;
        }

        if let Some(tool_call) = msg.tool_call {
            let requests: Vec<ToolCallRequest> = tool_call
                .function_calls
                .into_iter()
                .map(|fc| ToolCallRequest {
                    id: fc.id.unwrap_or_default(),
                    name: fc.name,
                    args: fc.args.unwrap_or(serde_json::Value::Null),
                })
                .collect();

            if requests.is_empty() {
                return;
            }
            tracing::debug!("Gemini Live requested {} tool call(s)", requests.len());
            if let Some(cb) = tool_call_cb.lock().await.as_ref() {
                cb(requests).await;
            }
            return;
        }

        if let Some(go_away) = msg.go_away {
            tracing::warn!(
                "Gemini Live connection will close, time left: {:?}",
                go_away.time_left
            );
            return;
        }

        if msg.usage_metadata.is_some() {
            tracing::trace!("Gemini Live usage metadata");
            return;
        }

        tracing::trace!("Unhandled Gemini Live server message");
    }

    /// Enqueue a message for the connection task.
    async fn send_message(&self, message: ClientMessage) -> LiveResult<()> {
        if let Some(sender) = self.ws_sender.lock().await.as_ref() {
            sender
                .send(message)
                .await
                .map_err(|e| LiveError::WebSocketError(e.to_string()))?;
            Ok(())
        } else {
            Err(LiveError::NotConnected)
        }
    }
}

#[async_trait]
impl BaseLiveSession for GeminiLive {
    async fn connect(&mut self) -> LiveResult<()> {
        if self.connected.load(Ordering::SeqCst) {
            return Ok(());
        }

        // Build request with the API key header
        let request = http::Request::builder()
            .uri(GEMINI_LIVE_URL)
            .header("x-goog-api-key", &self.config.api_key)
            .header(
                "Sec-WebSocket-Key",
                tungstenite::handshake::client::generate_key(),
            )
            .header("Sec-WebSocket-Version", "13")
            .header("Connection", "Upgrade")
            .header("Upgrade", "websocket")
            .header("Host", "generativelanguage.googleapis.com")
            .body(())
            .map_err(|e| LiveError::ConnectionFailed(e.to_string()))?;

        let (ws_stream, _response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| LiveError::ConnectionFailed(e.to_string()))?;

        tracing::info!(model = %self.config.model, "Connected to Gemini Live API");

        let (mut ws_sink, mut ws_stream) = ws_stream.split();

        let (tx, mut rx) = mpsc::channel::<ClientMessage>(WS_CHANNEL_CAPACITY);
        *self.ws_sender.lock().await = Some(tx);

        // Clone references for the connection task
        let open_cb = self.open_callback.clone();
        let audio_cb = self.audio_callback.clone();
        let tool_call_cb = self.tool_call_callback.clone();
        let interrupted_cb = self.interrupted_callback.clone();
        let error_cb = self.error_callback.clone();
        let closed_cb = self.closed_callback.clone();
        let ws_sender = self.ws_sender.clone();
        let connected = self.connected.clone();

        self.connected.store(true, Ordering::SeqCst);

        let handle = tokio::spawn(async move {
            let mut close_reason: Option<String> = None;

            loop {
                tokio::select! {
                    // Outgoing messages
                    Some(message) = rx.recv() => {
                        let json = match serde_json::to_string(&message) {
                            Ok(j) => j,
                            Err(e) => {
                                tracing::error!("Failed to serialize client message: {}", e);
                                continue;
                            }
                        };

                        if let Err(e) = ws_sink.send(Message::Text(json.into())).await {
                            tracing::error!("Failed to send WebSocket message: {}", e);
                            close_reason = Some(e.to_string());
                            break;
                        }
                    }

                    // Incoming messages; the server uses both text and binary frames
                    Some(msg) = ws_stream.next() => {
                        match msg {
                            Ok(Message::Text(text)) => {
                                match serde_json::from_str::<ServerMessage>(&text) {
                                    Ok(event) => {
                                        Self::handle_server_message(
                                            event,
                                            &open_cb,
                                            &audio_cb,
                                            &tool_call_cb,
                                            &interrupted_cb,
                                            &error_cb,
                                        ).await;
                                    }
                                    Err(e) => {
                                        tracing::warn!("Failed to parse server message: {}", e);
                                    }
                                }
                            }
                            Ok(Message::Binary(data)) => {
                                match serde_json::from_slice::<ServerMessage>(&data) {
                                    Ok(event) => {
                                        Self::handle_server_message(
                                            event,
                                            &open_cb,
                                            &audio_cb,
                                            &tool_call_cb,
                                            &interrupted_cb,
                                            &error_cb,
                                        ).await;
                                    }
                                    Err(e) => {
                                        tracing::warn!("Failed to parse binary server message: {}", e);
                                    }
                                }
                            }
                            Ok(Message::Close(frame)) => {
                                tracing::info!("Gemini Live closed the connection");
                                close_reason = frame.map(|f| f.reason.to_string());
                                break;
                            }
                            Ok(Message::Ping(data)) => {
                                if let Err(e) = ws_sink.send(Message::Pong(data)).await {
                                    tracing::error!("Failed to send pong: {}", e);
                                }
                            }
                            Err(e) => {
                                tracing::error!("Gemini Live WebSocket error: {}", e);
                                if let Some(cb) = error_cb.lock().await.as_ref() {
                                    cb(LiveError::WebSocketError(e.to_string())).await;
                                }
                                close_reason = Some(e.to_string());
                                break;
                            }
                            _ => {}
                        }
                    }

                    else => break,
                }
            }

            connected.store(false, Ordering::SeqCst);
            *ws_sender.lock().await = None;

            if let Some(cb) = closed_cb.lock().await.as_ref() {
                cb(close_reason).await;
            }
            tracing::info!("Gemini Live connection task ended");
        });

        *self.connection_handle.lock().await = Some(handle);

        // Setup must be the first message on the wire
        let setup = self.build_setup();
        self.send_message(ClientMessage::Setup { setup }).await?;

        Ok(())
    }

    async fn close(&mut self) -> LiveResult<()> {
        if !self.connected.swap(false, Ordering::SeqCst)
            && self.connection_handle.lock().await.is_none()
        {
            return Ok(());
        }

        *self.ws_sender.lock().await = None;

        if let Some(handle) = self.connection_handle.lock().await.take() {
            handle.abort();
        }

        tracing::info!("Disconnected from Gemini Live API");
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn send_audio(&mut self, audio: Bytes, mime: &str) -> LiveResult<()> {
        if !self.is_ready() {
            return Err(LiveError::NotConnected);
        }

        let message = ClientMessage::RealtimeInput {
            realtime_input: RealtimeInput {
                audio: Some(Blob {
                    mime_type: mime.to_string(),
                    data: BASE64_STANDARD.encode(&audio),
                }),
                text: None,
            },
        };
        self.send_message(message).await
    }

    async fn send_text(&mut self, text: &str) -> LiveResult<()> {
        if !self.is_ready() {
            return Err(LiveError::NotConnected);
        }

        let message = ClientMessage::RealtimeInput {
            realtime_input: RealtimeInput {
                audio: None,
                text: Some(text.to_string()),
            },
        };
        self.send_message(message).await
    }

    async fn send_tool_results(&mut self, results: Vec<ToolCallResult>) -> LiveResult<()> {
        if !self.is_ready() {
            return Err(LiveError::NotConnected);
        }

        let function_responses = results
            .into_iter()
            .map(|r| FunctionResponse {
                id: r.id,
                name: r.name,
                response: serde_json::json!({ "result": r.result }),
            })
            .collect();

        let message = ClientMessage::ToolResponse {
            tool_response: ToolResponse { function_responses },
        };
        self.send_message(message).await
    }

    fn on_open(&mut self, callback: OpenCallback) {
        register_callback(&self.open_callback, callback);
    }

    fn on_audio(&mut self, callback: AudioChunkCallback) {
        register_callback(&self.audio_callback, callback);
    }

    fn on_tool_call(&mut self, callback: ToolCallCallback) {
        register_callback(&self.tool_call_callback, callback);
    }

    fn on_interrupted(&mut self, callback: InterruptedCallback) {
        register_callback(&self.interrupted_callback, callback);
    }

    fn on_error(&mut self, callback: SessionErrorCallback) {
        register_callback(&self.error_callback, callback);
    }

    fn on_closed(&mut self, callback: ClosedCallback) {
        register_callback(&self.closed_callback, callback);
    }
}

/// Store a callback, preferring the synchronous path so registration is
/// complete before any message can arrive.
fn register_callback<T: Send + 'static>(slot: &Arc<Mutex<Option<T>>>, callback: T) {
    if let Ok(mut guard) = slot.try_lock() {
        *guard = Some(callback);
    } else {
        // Lock is held (unlikely in normal usage), spawn to avoid deadlock
        let slot = slot.clone();
        tokio::spawn(async move {
            *slot.lock().await = Some(callback);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> LiveSessionConfig {
        LiveSessionConfig {
            api_key: "test-key".to_string(),
            model: "gemini-live".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_api_key_required() {
        let result = GeminiLive::new(LiveSessionConfig {
            model: "gemini-live".to_string(),
            ..Default::default()
        });
        assert!(matches!(result, Err(LiveError::AuthenticationFailed(_))));
    }

    #[test]
    fn test_model_required() {
        let result = GeminiLive::new(LiveSessionConfig {
            api_key: "test-key".to_string(),
            ..Default::default()
        });
        assert!(matches!(result, Err(LiveError::InvalidConfiguration(_))));
    }

    #[tokio::test]
    async fn test_send_audio_requires_connection() {
        let mut session = GeminiLive::new(test_config()).unwrap();
        let result = session
            .send_audio(Bytes::from(vec![0u8; 64]), "audio/pcm;rate=16000")
            .await;
        assert!(matches!(result, Err(LiveError::NotConnected)));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let mut session = GeminiLive::new(test_config()).unwrap();
        assert!(session.close().await.is_ok());
        assert!(session.close().await.is_ok());
        assert!(!session.is_ready());
    }

    #[test]
    fn test_build_setup_with_tools_and_instructions() {
        let mut config = test_config();
        config.instructions = Some("Be concise.".to_string());
        config.thinking_level = Some("minimal".to_string());
        config.tools = vec![crate::core::live::base::FunctionDeclaration {
            name: "lookup".to_string(),
            description: None,
            parameters: None,
        }];

        let session = GeminiLive::new(config).unwrap();
        let setup = session.build_setup();

        assert_eq!(setup.model, "models/gemini-live");
        assert_eq!(setup.generation_config.response_modalities, vec!["AUDIO"]);
        assert!(setup.generation_config.thinking_config.is_some());
        assert!(setup.system_instruction.is_some());
        assert_eq!(setup.tools.unwrap()[0].function_declarations.len(), 1);
    }

    #[test]
    fn test_build_setup_omits_empty_sections() {
        let session = GeminiLive::new(test_config()).unwrap();
        let setup = session.build_setup();

        assert!(setup.tools.is_none());
        assert!(setup.system_instruction.is_none());
        assert!(setup.generation_config.thinking_config.is_none());
    }
}
