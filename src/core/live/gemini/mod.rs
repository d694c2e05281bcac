//! Gemini Live API client.
//!
//! Implements `BaseLiveSession` over the BidiGenerateContent WebSocket
//! protocol.

pub mod client;
pub mod config;
pub mod messages;

pub use client::GeminiLive;
pub use config::{GEMINI_LIVE_URL, GEMINI_OUTPUT_SAMPLE_RATE};
