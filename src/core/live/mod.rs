//! Remote conversational audio sessions.
//!
//! A live session is a duplex connection to a remote speech-to-speech
//! service: audio and text go in, audio, tool calls and interruption events
//! come back asynchronously.
//!
//! # Supported Providers
//!
//! - Gemini Live API (BidiGenerateContent over WebSocket)

pub mod base;
pub mod gemini;

pub use base::{
    AudioChunkCallback, BaseLiveSession, BoxedLiveSession, ClosedCallback, FunctionDeclaration,
    InterruptedCallback, LiveError, LiveResult, LiveSessionConfig, OpenCallback, SessionErrorCallback,
    ToolCallCallback, ToolCallRequest, ToolCallResult,
};
pub use gemini::GeminiLive;

/// Create a live session client for the given configuration.
pub fn create_live_session(config: LiveSessionConfig) -> LiveResult<BoxedLiveSession> {
    Ok(Box::new(GeminiLive::new(config)?))
}
