//! Capabilities — the tools the model can call during task execution.
//!
//! Every tool source (built-in, remote A2A agent, MCP server) is
//! flattened into the uniform [`Capability`] shape: a name, a
//! description, an argument schema, and an async `invoke`. Per request
//! the handler takes an immutable [`CapabilitySet`] snapshot; tools are
//! never added or removed mid-task.

pub mod builtin;
pub mod remote;

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::CapabilityConfig;
use crate::error::{EngineError, EngineResult};
use crate::model::ToolDefinition;
use crate::persistence::Database;

/// An invokable operation exposed to the model.
#[async_trait]
pub trait Capability: Send + Sync {
    /// Wire name of the tool.
    fn name(&self) -> &str;

    /// What the tool does, shown to the model.
    fn description(&self) -> &str;

    /// JSON schema of the tool's arguments.
    fn parameters(&self) -> serde_json::Value;

    /// Invoke the tool. Implementations should poll the token for
    /// long-running work.
    async fn invoke(
        &self,
        args: serde_json::Value,
        cancel: &CancellationToken,
    ) -> EngineResult<serde_json::Value>;
}

/// An immutable snapshot of the capabilities available to one request.
#[derive(Clone, Default)]
pub struct CapabilitySet {
    inner: Arc<Vec<Arc<dyn Capability>>>,
}

impl CapabilitySet {
    /// Build a set from a list of capabilities.
    pub fn new(capabilities: Vec<Arc<dyn Capability>>) -> Self {
        Self {
            inner: Arc::new(capabilities),
        }
    }

    /// An empty set.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Look up a capability by name.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Capability>> {
        self.inner.iter().find(|c| c.name() == name)
    }

    /// Number of capabilities in the set.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Tool definitions for a model request.
    pub fn tool_definitions(&self) -> Vec<ToolDefinition> {
        self.inner
            .iter()
            .map(|c| ToolDefinition {
                name: c.name().to_string(),
                description: c.description().to_string(),
                parameters: c.parameters(),
            })
            .collect()
    }
}

/// Mount the configured tool sources into a [`CapabilitySet`].
///
/// Remote MCP sources are contacted at mount time (`tools/list`), so
/// this is async and can fail on unreachable servers.
pub async fn mount_capabilities(
    configs: &[CapabilityConfig],
    db: &Database,
) -> EngineResult<CapabilitySet> {
    let mut capabilities: Vec<Arc<dyn Capability>> = Vec::new();

    for config in configs {
        match config {
            CapabilityConfig::Prebuilt { name } => match name.as_str() {
                "exec" => capabilities.push(Arc::new(builtin::ExecCapability::new())),
                "memory" => capabilities.push(Arc::new(builtin::MemoryCapability::new())),
                "search" => {
                    capabilities.push(Arc::new(builtin::SearchCapability::new(db.messages())))
                }
                other => {
                    return Err(EngineError::invalid_request(format!(
                        "unknown prebuilt capability '{}' — supported: exec, memory, search",
                        other
                    )))
                }
            },
            CapabilityConfig::A2a { url } => {
                capabilities.push(Arc::new(remote::A2aCapability::mount(url).await?));
            }
            CapabilityConfig::Mcp {
                url,
                headers,
                transport,
            } => {
                let mounted = remote::mount_mcp_tools(url, headers, *transport).await?;
                capabilities.extend(mounted);
            }
        }
    }

    debug!(count = capabilities.len(), "Capabilities mounted");
    Ok(CapabilitySet::new(capabilities))
}
