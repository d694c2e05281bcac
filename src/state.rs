//! Shared application state.

use std::sync::Arc;

use crate::bridge::SessionFactory;
use crate::config::ServerConfig;
use crate::core::live::base::LiveSessionConfig;
use crate::core::live::create_live_session;
use crate::tools::ToolRegistry;

/// State shared by all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Runtime configuration
    pub config: ServerConfig,
    /// Loaded tool schemas and handlers
    pub tools: Arc<ToolRegistry>,
    /// HTTP client for instructions fetching
    pub http: reqwest::Client,
    /// Live session factory; injectable for tests
    pub sessions: SessionFactory,
}

impl AppState {
    /// Build state from configuration, loading tool schemas from disk.
    pub fn new(config: ServerConfig) -> Self {
        let tools = Arc::new(ToolRegistry::load_from_dir(&config.tools_dir));
        Self {
            config,
            tools,
            http: reqwest::Client::new(),
            sessions: Arc::new(create_live_session),
        }
    }

    /// Assemble the live session configuration for one connection.
    pub fn live_config(&self, instructions: String) -> LiveSessionConfig {
        LiveSessionConfig {
            api_key: self.config.api_key.clone(),
            model: self.config.model.clone(),
            instructions: Some(instructions),
            tools: self.tools.declarations().to_vec(),
            thinking_level: self.config.thinking_level.clone(),
            thinking_budget: self.config.thinking_budget,
        }
    }
}
