//! Tool registry and dispatch.
//!
//! Tool schemas are loaded from JSON files in a configurable directory and
//! advertised to the live session at setup. When the session requests a batch
//! of tool calls, the registry dispatches each call to its registered handler
//! and always produces exactly one result per request, substituting a fixed
//! fallback text for unknown tools and handler failures.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;

use crate::core::live::base::{FunctionDeclaration, ToolCallRequest, ToolCallResult};

/// Result text returned when a tool is unknown or its handler fails.
pub const FALLBACK_RESULT: &str = "I'm sorry, I cannot retrieve the requested information.";

/// Executes one tool call.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Run the tool with the given arguments and return its textual outcome.
    async fn invoke(&self, session_id: &str, args: &Value) -> anyhow::Result<String>;
}

/// Registry of tool schemas and their handlers.
///
/// Schemas and handlers are registered independently: a schema without a
/// handler is still advertised to the session, and calls to it resolve to
/// the fallback result.
pub struct ToolRegistry {
    declarations: Vec<FunctionDeclaration>,
    handlers: RwLock<HashMap<String, Arc<dyn ToolHandler>>>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            declarations: Vec::new(),
            handlers: RwLock::new(HashMap::new()),
        }
    }

    /// Load tool schemas from JSON files in a directory.
    ///
    /// Each `.json` file holds either a single declaration or an array of
    /// declarations. A missing directory or an unreadable file degrades to
    /// fewer tools with a warning; it never fails startup.
    pub fn load_from_dir(dir: impl AsRef<Path>) -> Self {
        let mut registry = Self::new();
        let dir = dir.as_ref();

        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(dir = %dir.display(), "Tools directory not readable: {}", e);
                return registry;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            let contents = match std::fs::read_to_string(&path) {
                Ok(c) => c,
                Err(e) => {
                    tracing::warn!(file = %path.display(), "Failed to read tool schema: {}", e);
                    continue;
                }
            };

            match serde_json::from_str::<Value>(&contents) {
                Ok(Value::Array(items)) => {
                    for item in items {
                        registry.add_declaration_value(&path, item);
                    }
                }
                Ok(item) => registry.add_declaration_value(&path, item),
                Err(e) => {
                    tracing::warn!(file = %path.display(), "Invalid tool schema JSON: {}", e);
                }
            }
        }

        registry
            .declarations
            .sort_by(|a, b| a.name.cmp(&b.name));
        tracing::info!(count = registry.declarations.len(), "Loaded tool schemas");
        registry
    }

    fn add_declaration_value(&mut self, path: &Path, value: Value) {
        match serde_json::from_value::<FunctionDeclaration>(value) {
            Ok(decl) => {
                tracing::debug!(tool = %decl.name, file = %path.display(), "Registered tool schema");
                self.declarations.push(decl);
            }
            Err(e) => {
                tracing::warn!(file = %path.display(), "Skipping malformed tool declaration: {}", e);
            }
        }
    }

    /// Schemas to advertise at session setup.
    pub fn declarations(&self) -> &[FunctionDeclaration] {
        &self.declarations
    }

    /// Register a handler for a tool name.
    pub fn register_handler(&self, name: impl Into<String>, handler: Arc<dyn ToolHandler>) {
        self.handlers.write().insert(name.into(), handler);
    }

    /// Dispatch a batch of tool calls.
    ///
    /// Returns exactly one result per request, in request order. Unknown
    /// tools and failed handlers yield the fallback text so the session
    /// always receives a complete batch.
    pub async fn dispatch(
        &self,
        session_id: &str,
        requests: Vec<ToolCallRequest>,
    ) -> Vec<ToolCallResult> {
        let mut results = Vec::with_capacity(requests.len());

        for request in requests {
            let handler = self.handlers.read().get(&request.name).cloned();

            let result = match handler {
                Some(handler) => match handler.invoke(session_id, &request.args).await {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::error!(
                            session_id = %session_id,
                            tool = %request.name,
                            "Tool handler failed: {}",
                            e
                        );
                        FALLBACK_RESULT.to_string()
                    }
                },
                None => {
                    tracing::warn!(
                        session_id = %session_id,
                        tool = %request.name,
                        "No handler registered for requested tool"
                    );
                    FALLBACK_RESULT.to_string()
                }
            };

            results.push(ToolCallResult {
                id: request.id,
                name: request.name,
                result,
            });
        }

        results
    }
}
