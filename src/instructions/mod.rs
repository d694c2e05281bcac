//! System instructions resolution.
//!
//! Instructions for the live session come from one of four sources, tried in
//! priority order: inline text, a URL fetched over HTTP, a local file, and a
//! built-in default. A failing source logs a warning and falls through to the
//! next one, so resolution always yields usable instructions.
//!
//! The URL source returns JSON of the shape `{"system": "<instructions>"}`
//! and receives the session id in an `X-AVR-UUID` header, so upstream prompt
//! services can tailor instructions per call.

use std::path::PathBuf;

use serde::Deserialize;

/// Response shape of the URL instructions source.
#[derive(Debug, Deserialize)]
struct RemoteInstructions {
    system: String,
}

/// Instructions used when no other source is configured or usable.
pub const DEFAULT_INSTRUCTIONS: &str =
    "You are a helpful assistant and answer in a friendly tone.";

/// Configured instruction sources, in priority order.
#[derive(Debug, Clone, Default)]
pub struct InstructionSources {
    /// Inline instruction text, highest priority
    pub inline: Option<String>,
    /// URL to fetch instructions from
    pub url: Option<String>,
    /// Path of a local instructions file
    pub file: Option<PathBuf>,
}

impl InstructionSources {
    /// Resolve instructions: inline, then URL, then file, then the default.
    pub async fn resolve(&self, http: &reqwest::Client, session_id: &str) -> String {
        if let Some(text) = &self.inline {
            if !text.trim().is_empty() {
                tracing::debug!("Using inline instructions");
                return text.clone();
            }
        }

        if let Some(url) = &self.url {
            match fetch_instructions(http, url, session_id).await {
                Ok(text) => {
                    tracing::info!(url = %url, "Loaded instructions from URL");
                    return text;
                }
                Err(e) => {
                    tracing::warn!(url = %url, "Failed to load instructions from URL: {}", e);
                }
            }
        }

        if let Some(path) = &self.file {
            match tokio::fs::read_to_string(path).await {
                Ok(text) => {
                    tracing::info!(file = %path.display(), "Loaded instructions from file");
                    return text;
                }
                Err(e) => {
                    tracing::warn!(
                        file = %path.display(),
                        "Failed to load instructions from file: {}",
                        e
                    );
                }
            }
        }

        tracing::debug!("Using default instructions");
        DEFAULT_INSTRUCTIONS.to_string()
    }
}

async fn fetch_instructions(
    http: &reqwest::Client,
    url: &str,
    session_id: &str,
) -> anyhow::Result<String> {
    let response = http
        .get(url)
        .header("X-AVR-UUID", session_id)
        .send()
        .await?
        .error_for_status()?;
    let body: RemoteInstructions = response.json().await?;
    Ok(body.system)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_inline_takes_priority() {
        let sources = InstructionSources {
            inline: Some("Speak like a pirate.".to_string()),
            url: Some("http://127.0.0.1:1/unreachable".to_string()),
            file: None,
        };
        let http = reqwest::Client::new();
        assert_eq!(
            sources.resolve(&http, "sess-1").await,
            "Speak like a pirate."
        );
    }

    #[tokio::test]
    async fn test_url_source_sends_session_header() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/prompt"))
            .and(wiremock::matchers::header("X-AVR-UUID", "sess-1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"system": "Be terse."})),
            )
            .mount(&server)
            .await;

        let sources = InstructionSources {
            inline: None,
            url: Some(format!("{}/prompt", server.uri())),
            file: None,
        };
        let http = reqwest::Client::new();
        assert_eq!(sources.resolve(&http, "sess-1").await, "Be terse.");
    }

    #[tokio::test]
    async fn test_url_failure_falls_through_to_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/prompt"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("instructions.txt");
        std::fs::write(&file, "From the file.").unwrap();

        let sources = InstructionSources {
            inline: None,
            url: Some(format!("{}/prompt", server.uri())),
            file: Some(file),
        };
        let http = reqwest::Client::new();
        assert_eq!(sources.resolve(&http, "sess-1").await, "From the file.");
    }

    #[tokio::test]
    async fn test_all_sources_fail_yields_default() {
        let sources = InstructionSources {
            inline: None,
            url: None,
            file: Some(PathBuf::from("/nonexistent/instructions.txt")),
        };
        let http = reqwest::Client::new();
        assert_eq!(sources.resolve(&http, "sess-1").await, DEFAULT_INSTRUCTIONS);
    }

    #[tokio::test]
    async fn test_blank_inline_is_skipped() {
        let sources = InstructionSources {
            inline: Some("   ".to_string()),
            url: None,
            file: None,
        };
        let http = reqwest::Client::new();
        assert_eq!(sources.resolve(&http, "sess-1").await, DEFAULT_INSTRUCTIONS);
    }
}
