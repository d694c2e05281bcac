//! Client-facing WebSocket message types.
//!
//! The client protocol is JSON, discriminated by a `type` field:
//!
//! - client -> server: `{"type": "init", "uuid": "..."}` then
//!   `{"type": "audio", "audio": "<base64 PCM16 8kHz>"}`
//! - server -> client: `{"type": "audio", "audio": "<base64 frame>"}`,
//!   `{"type": "interruption"}` and `{"type": "error", "message": "..."}`

use serde::{Deserialize, Serialize};

/// Messages received from the client over the WebSocket.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    /// Start a session; must be the first message
    Init {
        /// Client-chosen session identifier
        uuid: String,
    },
    /// One chunk of base64-encoded 8 kHz PCM16 audio
    Audio {
        /// Base64 payload
        audio: String,
    },
}

/// Messages sent to the client over the WebSocket.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerMessage {
    /// One canonical 20 ms frame of base64-encoded 8 kHz PCM16 audio
    Audio {
        /// Base64 payload, always a 320-byte frame
        audio: String,
    },
    /// The session interrupted its output; flush any queued playback
    Interruption,
    /// Terminal error; the connection closes after this message
    Error {
        /// Human-readable description
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_init() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type": "init", "uuid": "abc-123"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Init { uuid } if uuid == "abc-123"));
    }

    #[test]
    fn test_parse_audio() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type": "audio", "audio": "AAAA"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Audio { audio } if audio == "AAAA"));
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let result = serde_json::from_str::<ClientMessage>(r#"{"type": "ping"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_serialize_server_messages() {
        let json = serde_json::to_value(ServerMessage::Audio {
            audio: "AAAA".to_string(),
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"type": "audio", "audio": "AAAA"}));

        let json = serde_json::to_value(ServerMessage::Interruption).unwrap();
        assert_eq!(json, serde_json::json!({"type": "interruption"}));

        let json = serde_json::to_value(ServerMessage::Error {
            message: "boom".to_string(),
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"type": "error", "message": "boom"}));
    }
}
