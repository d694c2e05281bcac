//! Server configuration loaded from environment variables.
//!
//! All settings have workable defaults except the API key, which is
//! validated lazily when a session is opened so the health endpoint can run
//! without credentials.

use std::env;
use std::path::PathBuf;

use crate::core::live::gemini::config::DEFAULT_MODEL;
use crate::instructions::InstructionSources;

/// Default bind port.
pub const DEFAULT_PORT: u16 = 6037;

/// Directory tool schemas are loaded from when `TOOLS_DIR` is unset.
pub const DEFAULT_TOOLS_DIR: &str = "tools";

/// Runtime configuration for the gateway.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address
    pub host: String,
    /// Bind port
    pub port: u16,

    /// Gemini API key
    pub api_key: String,
    /// Model identifier
    pub model: String,
    /// Reasoning effort level
    pub thinking_level: Option<String>,
    /// Reasoning token budget
    pub thinking_budget: Option<i32>,

    /// Instruction sources, in priority order
    pub instructions: InstructionSources,
    /// Directory of tool schema JSON files
    pub tools_dir: PathBuf,
}

impl ServerConfig {
    /// Load configuration from the environment.
    pub fn from_env() -> Self {
        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(DEFAULT_PORT);

        let api_key = env::var("GEMINI_API_KEY").unwrap_or_default();
        if api_key.is_empty() {
            tracing::warn!("GEMINI_API_KEY is not set; sessions will fail to open");
        }

        let model = env::var("GEMINI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());

        let thinking_level = env::var("GEMINI_THINKING_LEVEL").ok().filter(|v| !v.is_empty());
        let thinking_budget = env::var("GEMINI_THINKING_BUDGET")
            .ok()
            .and_then(|v| match v.parse() {
                Ok(n) => Some(n),
                Err(_) => {
                    tracing::warn!("GEMINI_THINKING_BUDGET is not a number, ignoring");
                    None
                }
            });

        let url = env::var("GEMINI_URL_INSTRUCTIONS")
            .ok()
            .filter(|v| !v.is_empty())
            .and_then(|raw| match url::Url::parse(&raw) {
                Ok(_) => Some(raw),
                Err(e) => {
                    tracing::warn!("GEMINI_URL_INSTRUCTIONS is not a valid URL, ignoring: {}", e);
                    None
                }
            });

        let instructions = InstructionSources {
            inline: env::var("GEMINI_INSTRUCTIONS").ok().filter(|v| !v.is_empty()),
            url,
            file: env::var("GEMINI_FILE_INSTRUCTIONS")
                .ok()
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
        };

        let tools_dir = env::var("TOOLS_DIR")
            .ok()
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_TOOLS_DIR));

        Self {
            host,
            port,
            api_key,
            model,
            thinking_level,
            thinking_budget,
            instructions,
            tools_dir,
        }
    }

    /// Socket address string to bind.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
