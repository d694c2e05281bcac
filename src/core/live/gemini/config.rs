//! Gemini Live API configuration constants.

/// Gemini Live API WebSocket endpoint (BidiGenerateContent).
pub const GEMINI_LIVE_URL: &str =
    "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

/// Default model when none is configured.
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-preview-native-audio-dialog";

/// Sample rate of audio produced by the Gemini Live API.
pub const GEMINI_OUTPUT_SAMPLE_RATE: u32 = 24000;

/// Qualify a bare model name with the `models/` resource prefix.
pub fn qualified_model(model: &str) -> String {
    if model.starts_with("models/") {
        model.to_string()
    } else {
        format!("models/{model}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qualified_model() {
        assert_eq!(qualified_model("gemini-live"), "models/gemini-live");
        assert_eq!(qualified_model("models/gemini-live"), "models/gemini-live");
    }
}
