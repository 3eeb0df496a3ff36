//! Engine configuration — typically stored in a `config.toml` next to the
//! database file.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::error::{EngineError, EngineResult};

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Model provider settings.
    pub model: ModelConfig,

    /// Status narrator settings.
    pub narrator: NarratorConfig,

    /// Routing settings.
    pub routing: RoutingConfig,

    /// Persistence settings.
    pub database: DatabaseConfig,

    /// Tool sources mounted for task execution.
    pub capabilities: Vec<CapabilityConfig>,
}

impl EngineConfig {
    /// Load configuration from a TOML file.
    pub fn from_path(path: impl AsRef<Path>) -> EngineResult<Self> {
        let raw = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            EngineError::invalid_request(format!(
                "cannot read config {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        toml::from_str(&raw)
            .map_err(|e| EngineError::invalid_request(format!("invalid config: {}", e)))
    }
}

/// Model provider settings. The provider string and model id are opaque
/// to the engine; `parameters` is forwarded to the provider untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Opaque provider name (e.g. "openai", "anthropic").
    pub provider: String,

    /// Model identifier passed to the provider.
    pub id: String,

    /// Provider-specific parameters, forwarded verbatim.
    pub parameters: HashMap<String, serde_json::Value>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: String::new(),
            id: String::new(),
            parameters: HashMap::new(),
        }
    }
}

/// Status narrator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NarratorConfig {
    /// Narration cadence in milliseconds.
    pub interval_ms: u64,

    /// How many recent status messages to de-duplicate against.
    pub recent_window: usize,

    /// Maximum narration length in characters.
    pub max_chars: usize,
}

impl Default for NarratorConfig {
    fn default() -> Self {
        Self {
            interval_ms: 5000,
            recent_window: 5,
            max_chars: 50,
        }
    }
}

/// Routing settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// When set, every request becomes a task and the routing model
    /// call is skipped.
    pub always_task: bool,
}

/// Persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Path of the SQLite database file.
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "engine.db".to_string(),
        }
    }
}

/// A tool source. Discriminated by `type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CapabilityConfig {
    /// A built-in capability: `exec`, `memory`, or `search`.
    Prebuilt {
        /// Name of the built-in.
        name: String,
    },
    /// A remote A2A agent mounted as a single tool.
    A2a {
        /// JSON-RPC endpoint of the remote agent.
        url: String,
    },
    /// A remote MCP tool server; every listed tool is mounted.
    Mcp {
        /// JSON-RPC endpoint of the MCP server.
        url: String,
        /// Extra headers sent with every request.
        #[serde(default)]
        headers: HashMap<String, String>,
        /// Transport flavor.
        #[serde(default)]
        transport: McpTransport,
    },
}

/// MCP transport flavor. Both variants speak JSON-RPC over POST; the
/// value selects the Accept header the server expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum McpTransport {
    /// Streamable HTTP.
    #[default]
    Http,
    /// Legacy SSE endpoint.
    Sse,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = EngineConfig::default();
        assert_eq!(config.narrator.interval_ms, 5000);
        assert_eq!(config.narrator.recent_window, 5);
        assert_eq!(config.narrator.max_chars, 50);
        assert!(!config.routing.always_task);
        assert!(config.capabilities.is_empty());
    }

    #[test]
    fn parses_full_config() {
        let raw = r#"
            [model]
            provider = "openai"
            id = "gpt-4o"

            [model.parameters]
            temperature = 0.2

            [narrator]
            interval_ms = 1000
            max_chars = 40

            [routing]
            always_task = true

            [database]
            path = "/tmp/agent.db"

            [[capabilities]]
            type = "prebuilt"
            name = "memory"

            [[capabilities]]
            type = "a2a"
            url = "http://localhost:7420/a2a"

            [[capabilities]]
            type = "mcp"
            url = "http://localhost:9000/mcp"
            transport = "sse"

            [capabilities.headers]
            authorization = "Bearer token"
        "#;
        let config: EngineConfig = toml::from_str(raw).unwrap();
        assert_eq!(config.model.provider, "openai");
        assert_eq!(config.narrator.interval_ms, 1000);
        assert_eq!(config.narrator.recent_window, 5);
        assert!(config.routing.always_task);
        assert_eq!(config.capabilities.len(), 3);
        match &config.capabilities[2] {
            CapabilityConfig::Mcp {
                transport, headers, ..
            } => {
                assert_eq!(*transport, McpTransport::Sse);
                assert_eq!(headers.get("authorization").unwrap(), "Bearer token");
            }
            other => panic!("expected mcp capability, got {:?}", other),
        }
    }
}
