//! Base trait and types for live speech-to-speech sessions.
//!
//! A live session streams audio in both directions and delivers asynchronous
//! out-of-band events: tool-call requests, interruptions, errors and session
//! close. Audio sent to the session is PCM 16-bit little-endian mono; the
//! sample rate travels with each send as a MIME descriptor.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during live session operations.
#[derive(Debug, Error)]
pub enum LiveError {
    /// Connection to the service failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// WebSocket error
    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Not connected
    #[error("Not connected")]
    NotConnected,

    /// Session-level error reported by the service
    #[error("Session error: {0}")]
    SessionError(String),
}

/// Result type for live session operations.
pub type LiveResult<T> = Result<T, LiveError>;

// =============================================================================
// Configuration Types
// =============================================================================

/// Tool declaration advertised to the remote session at setup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDeclaration {
    /// Function name
    pub name: String,
    /// Function description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON schema for parameters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<serde_json::Value>,
}

/// Configuration for opening a live session.
///
/// The response modality is always audio; it is not configurable here.
#[derive(Debug, Clone, Default)]
pub struct LiveSessionConfig {
    /// API key for authentication
    pub api_key: String,

    /// Model identifier
    pub model: String,

    /// Resolved system instructions
    pub instructions: Option<String>,

    /// Tool declarations for function calling
    pub tools: Vec<FunctionDeclaration>,

    /// Reasoning-effort knob, passed through opaquely
    pub thinking_level: Option<String>,

    /// Reasoning budget knob, passed through opaquely
    pub thinking_budget: Option<i32>,
}

// =============================================================================
// Event Types
// =============================================================================

/// A tool invocation requested by the remote session.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallRequest {
    /// Opaque correlation id, echoed back in the result
    pub id: String,
    /// Tool name
    pub name: String,
    /// Argument mapping
    pub args: serde_json::Value,
}

/// The textual outcome of one tool invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallResult {
    /// Correlation id from the request
    pub id: String,
    /// Tool name from the request
    pub name: String,
    /// Textual outcome returned to the session
    pub result: String,
}

// =============================================================================
// Callback Types
// =============================================================================

/// Callback invoked once the session is open and ready for audio.
pub type OpenCallback = Arc<dyn Fn() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Callback for audio chunks produced by the session (raw PCM16LE).
pub type AudioChunkCallback =
    Arc<dyn Fn(Bytes) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Callback for a batch of tool-call requests.
pub type ToolCallCallback =
    Arc<dyn Fn(Vec<ToolCallRequest>) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Callback fired when the session interrupts its own audio output.
pub type InterruptedCallback =
    Arc<dyn Fn() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Callback for session-level errors.
pub type SessionErrorCallback =
    Arc<dyn Fn(LiveError) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Callback fired when the session closes, with an optional reason.
pub type ClosedCallback =
    Arc<dyn Fn(Option<String>) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

// =============================================================================
// Base Trait
// =============================================================================

/// Base trait for live speech-to-speech session clients.
///
/// Opening is asynchronous and may fail; a failure is terminal for the
/// owning connection and is never retried here. Sends are fire-and-forget
/// but preserve submission order. `close` is idempotent.
#[async_trait]
pub trait BaseLiveSession: Send + Sync {
    /// Open the session. Resolves once the transport is established and the
    /// setup payload has been submitted; readiness is signaled via `on_open`.
    async fn connect(&mut self) -> LiveResult<()>;

    /// Close the session. Safe to call more than once.
    async fn close(&mut self) -> LiveResult<()>;

    /// Whether the session is connected.
    fn is_ready(&self) -> bool;

    // -------------------------------------------------------------------------
    // Sending
    // -------------------------------------------------------------------------

    /// Send an audio chunk (PCM16LE) with its MIME descriptor.
    async fn send_audio(&mut self, audio: Bytes, mime: &str) -> LiveResult<()>;

    /// Send a text turn into the conversation.
    async fn send_text(&mut self, text: &str) -> LiveResult<()>;

    /// Return one batch of tool results. The whole batch goes out in a
    /// single message to preserve correlation on the remote side.
    async fn send_tool_results(&mut self, results: Vec<ToolCallResult>) -> LiveResult<()>;

    // -------------------------------------------------------------------------
    // Callbacks
    // -------------------------------------------------------------------------

    /// Register a callback for session readiness.
    fn on_open(&mut self, callback: OpenCallback);

    /// Register a callback for audio output.
    fn on_audio(&mut self, callback: AudioChunkCallback);

    /// Register a callback for tool-call batches.
    fn on_tool_call(&mut self, callback: ToolCallCallback);

    /// Register a callback for interruption events.
    fn on_interrupted(&mut self, callback: InterruptedCallback);

    /// Register a callback for session errors.
    fn on_error(&mut self, callback: SessionErrorCallback);

    /// Register a callback for session close.
    fn on_closed(&mut self, callback: ClosedCallback);
}

/// Boxed trait object for live sessions.
pub type BoxedLiveSession = Box<dyn BaseLiveSession>;
