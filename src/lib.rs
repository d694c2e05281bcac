//! Voice bridge gateway.
//!
//! Bridges 8 kHz PCM16 audio clients (WebSocket or HTTP streaming) to a
//! remote speech-to-speech session, handling resampling, framing,
//! interruptions and tool dispatch.

pub mod audio;
pub mod bridge;
pub mod config;
pub mod core;
pub mod handlers;
pub mod instructions;
pub mod routes;
pub mod state;
pub mod tools;
