//! Gemini Live API (BidiGenerateContent) WebSocket message types.
//!
//! All messages are JSON. The protocol is a union keyed by field presence:
//!
//! Client messages (sent to server):
//! - setup - Session configuration, first message on the connection
//! - realtimeInput - Streamed audio or text input
//! - toolResponse - Results for a previously received toolCall
//!
//! Server messages (received from server):
//! - setupComplete - Session is ready for input
//! - serverContent - Model audio output, interruption and turn markers
//! - toolCall - Batch of function calls to execute
//! - goAway - Advance notice that the server will close the connection
//! - usageMetadata - Token accounting
//!
//! The server may deliver messages in binary WebSocket frames; they still
//! contain JSON.

use serde::{Deserialize, Serialize};

use crate::core::live::base::FunctionDeclaration;

// =============================================================================
// Client Messages
// =============================================================================

/// Messages sent to the Gemini Live API.
///
/// Serialized untagged: each variant carries exactly one field whose name is
/// the wire discriminator.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ClientMessage {
    /// Session setup, must be the first message
    Setup {
        /// Setup payload
        setup: Setup,
    },
    /// Streamed realtime input
    RealtimeInput {
        /// Input payload
        #[serde(rename = "realtimeInput")]
        realtime_input: RealtimeInput,
    },
    /// Tool results for a toolCall batch
    ToolResponse {
        /// Response payload
        #[serde(rename = "toolResponse")]
        tool_response: ToolResponse,
    },
}

/// Session setup payload.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Setup {
    /// Fully qualified model resource name (`models/...`)
    pub model: String,

    /// Generation configuration
    pub generation_config: GenerationConfig,

    /// System instructions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,

    /// Tool declarations
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDecls>>,
}

/// Generation configuration inside setup.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    /// Response modalities; always `["AUDIO"]` for this bridge
    pub response_modalities: Vec<String>,

    /// Reasoning knobs, passed through opaquely
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking_config: Option<ThinkingConfig>,
}

/// Opaque reasoning-effort configuration.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThinkingConfig {
    /// Reasoning effort level
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking_level: Option<String>,

    /// Reasoning token budget
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking_budget: Option<i32>,
}

/// A grouping of tool declarations.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDecls {
    /// Declared functions
    pub function_declarations: Vec<FunctionDeclaration>,
}

/// Realtime input: one audio blob or one text fragment per message.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInput {
    /// Base64 PCM16 audio with its MIME descriptor
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio: Option<Blob>,

    /// Text input
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// Inline binary payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Blob {
    /// MIME descriptor, e.g. `audio/pcm;rate=16000`
    pub mime_type: String,
    /// Base64-encoded payload
    pub data: String,
}

/// Batched tool results.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResponse {
    /// One response per received function call
    pub function_responses: Vec<FunctionResponse>,
}

/// Result of one function call.
#[derive(Debug, Clone, Serialize)]
pub struct FunctionResponse {
    /// Correlation id from the request
    pub id: String,
    /// Function name from the request
    pub name: String,
    /// Structured response, `{"result": <text>}`
    pub response: serde_json::Value,
}

/// Structured content: a list of parts.
#[derive(Debug, Clone, Serialize)]
pub struct Content {
    /// Content parts
    pub parts: Vec<TextPart>,
}

impl Content {
    /// Build a single-part text content.
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            parts: vec![TextPart { text: text.into() }],
        }
    }
}

/// A text-only content part.
#[derive(Debug, Clone, Serialize)]
pub struct TextPart {
    /// Text content
    pub text: String,
}

// =============================================================================
// Server Messages
// =============================================================================

/// Messages received from the Gemini Live API.
///
/// Exactly one of the optional fields is populated per message.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerMessage {
    /// Session is ready for input
    #[serde(default)]
    pub setup_complete: Option<serde_json::Value>,

    /// Model output and turn markers
    #[serde(default)]
    pub server_content: Option<ServerContent>,

    /// Function calls to execute
    #[serde(default)]
    pub tool_call: Option<ToolCallMessage>,

    /// Server-initiated shutdown notice
    #[serde(default)]
    pub go_away: Option<GoAway>,

    /// Token accounting
    #[serde(default)]
    pub usage_metadata: Option<serde_json::Value>,
}

/// Incremental model output.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerContent {
    /// Content parts for the current model turn
    #[serde(default)]
    pub model_turn: Option<ModelTurn>,

    /// The model interrupted its own output; prior audio should be discarded
    #[serde(default)]
    pub interrupted: Option<bool>,

    /// The current turn is complete
    #[serde(default)]
    pub turn_complete: Option<bool>,
}

/// One model turn.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelTurn {
    /// Content parts; audio arrives as inline data
    #[serde(default)]
    pub parts: Vec<Part>,
}

/// One content part of a model turn.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    /// Text content
    #[serde(default)]
    pub text: Option<String>,

    /// Inline binary content (audio)
    #[serde(default)]
    pub inline_data: Option<Blob>,
}

/// A batch of function calls requested by the model.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallMessage {
    /// Requested calls, to be answered as one batch
    #[serde(default)]
    pub function_calls: Vec<FunctionCall>,
}

/// One requested function call.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionCall {
    /// Correlation id
    #[serde(default)]
    pub id: Option<String>,
    /// Function name
    pub name: String,
    /// Argument mapping
    #[serde(default)]
    pub args: Option<serde_json::Value>,
}

/// Advance notice that the connection will be closed.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoAway {
    /// Remaining time before the server closes the connection
    #[serde(default)]
    pub time_left: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_serialization() {
        let msg = ClientMessage::Setup {
            setup: Setup {
                model: "models/gemini-live".to_string(),
                generation_config: GenerationConfig {
                    response_modalities: vec!["AUDIO".to_string()],
                    thinking_config: Some(ThinkingConfig {
                        thinking_level: Some("minimal".to_string()),
                        thinking_budget: Some(0),
                    }),
                },
                system_instruction: Some(Content::from_text("Be brief.")),
                tools: None,
            },
        };

        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["setup"]["model"], "models/gemini-live");
        assert_eq!(
            json["setup"]["generationConfig"]["responseModalities"][0],
            "AUDIO"
        );
        assert_eq!(
            json["setup"]["generationConfig"]["thinkingConfig"]["thinkingLevel"],
            "minimal"
        );
        assert_eq!(
            json["setup"]["systemInstruction"]["parts"][0]["text"],
            "Be brief."
        );
        assert!(json["setup"].get("tools").is_none());
    }

    #[test]
    fn test_realtime_input_audio_serialization() {
        let msg = ClientMessage::RealtimeInput {
            realtime_input: RealtimeInput {
                audio: Some(Blob {
                    mime_type: "audio/pcm;rate=16000".to_string(),
                    data: "AAAA".to_string(),
                }),
                text: None,
            },
        };

        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            json["realtimeInput"]["audio"]["mimeType"],
            "audio/pcm;rate=16000"
        );
        assert!(json["realtimeInput"].get("text").is_none());
    }

    #[test]
    fn test_tool_response_serialization() {
        let msg = ClientMessage::ToolResponse {
            tool_response: ToolResponse {
                function_responses: vec![FunctionResponse {
                    id: "call-1".to_string(),
                    name: "lookup".to_string(),
                    response: serde_json::json!({"result": "found"}),
                }],
            },
        };

        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["toolResponse"]["functionResponses"][0]["id"], "call-1");
        assert_eq!(
            json["toolResponse"]["functionResponses"][0]["response"]["result"],
            "found"
        );
    }

    #[test]
    fn test_parse_setup_complete() {
        let msg: ServerMessage = serde_json::from_str(r#"{"setupComplete": {}}"#).unwrap();
        assert!(msg.setup_complete.is_some());
        assert!(msg.server_content.is_none());
    }

    #[test]
    fn test_parse_audio_content() {
        let raw = r#"{
            "serverContent": {
                "modelTurn": {
                    "parts": [
                        {"inlineData": {"mimeType": "audio/pcm;rate=24000", "data": "AAECAw=="}}
                    ]
                }
            }
        }"#;
        let msg: ServerMessage = serde_json::from_str(raw).unwrap();
        let content = msg.server_content.unwrap();
        let parts = content.model_turn.unwrap().parts;
        assert_eq!(parts.len(), 1);
        assert_eq!(
            parts[0].inline_data.as_ref().unwrap().mime_type,
            "audio/pcm;rate=24000"
        );
    }

    #[test]
    fn test_parse_interrupted() {
        let raw = r#"{"serverContent": {"interrupted": true}}"#;
        let msg: ServerMessage = serde_json::from_str(raw).unwrap();
        assert_eq!(msg.server_content.unwrap().interrupted, Some(true));
    }

    #[test]
    fn test_parse_tool_call() {
        let raw = r#"{
            "toolCall": {
                "functionCalls": [
                    {"id": "fc-1", "name": "lookup_order", "args": {"order_id": "42"}},
                    {"name": "current_time"}
                ]
            }
        }"#;
        let msg: ServerMessage = serde_json::from_str(raw).unwrap();
        let calls = msg.tool_call.unwrap().function_calls;
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].id.as_deref(), Some("fc-1"));
        assert_eq!(calls[1].name, "current_time");
        assert!(calls[1].id.is_none());
    }
}
