//! Remote tool sources: A2A agents and MCP servers.
//!
//! Both speak JSON-RPC 2.0 over HTTP POST. An A2A source mounts as a
//! single tool that forwards a message to the remote agent; an MCP
//! source mounts every tool the server lists.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::McpTransport;
use crate::error::{EngineError, EngineResult};
use crate::types::{AgentCard, SendMessageResponse};
use crate::utils::get_message_text;

use super::Capability;

/// Shared JSON-RPC POST transport.
#[derive(Clone)]
struct JsonRpcEndpoint {
    client: reqwest::Client,
    url: String,
    headers: HashMap<String, String>,
    accept: &'static str,
}

impl JsonRpcEndpoint {
    fn new(url: &str, headers: HashMap<String, String>, accept: &'static str) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.to_string(),
            headers,
            accept,
        }
    }

    async fn call(&self, method: &str, params: Value) -> EngineResult<Value> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let mut request = self
            .client
            .post(&self.url)
            .header("accept", self.accept)
            .json(&body);
        for (key, value) in &self.headers {
            request = request.header(key, value);
        }

        let response = request
            .send()
            .await
            .map_err(|e| EngineError::tool(format!("{}: request failed: {}", method, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(EngineError::tool(format!(
                "{}: HTTP {} from {}",
                method, status, self.url
            )));
        }

        let envelope: Value = response
            .json()
            .await
            .map_err(|e| EngineError::tool(format!("{}: invalid JSON response: {}", method, e)))?;

        if let Some(error) = envelope.get("error") {
            return Err(EngineError::tool(format!(
                "{}: remote error: {}",
                method, error
            )));
        }

        envelope
            .get("result")
            .cloned()
            .ok_or_else(|| EngineError::tool(format!("{}: response missing result", method)))
    }
}

fn sanitize_tool_name(raw: &str) -> String {
    let name: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    if name.is_empty() {
        "remote_agent".to_string()
    } else {
        name
    }
}

// ---------------------------------------------------------------------------
// A2A
// ---------------------------------------------------------------------------

/// A remote A2A agent mounted as a single tool.
pub struct A2aCapability {
    endpoint: JsonRpcEndpoint,
    name: String,
    description: String,
}

impl A2aCapability {
    /// Mount a remote agent. The agent card at
    /// `/.well-known/agent.json` supplies the tool name and
    /// description; an unreachable card falls back to defaults so a
    /// temporarily offline agent does not block startup.
    pub async fn mount(url: &str) -> EngineResult<Self> {
        let endpoint = JsonRpcEndpoint::new(url, HashMap::new(), "application/json");

        let (name, description) = match fetch_agent_card(&endpoint.client, url).await {
            Ok(card) => (sanitize_tool_name(&card.name), card.description),
            Err(e) => {
                warn!(url = %url, error = %e, "Agent card unavailable, using defaults");
                (
                    "remote_agent".to_string(),
                    format!("Forward a message to the agent at {}", url),
                )
            }
        };

        debug!(url = %url, tool = %name, "Mounted A2A capability");
        Ok(Self {
            endpoint,
            name,
            description,
        })
    }
}

async fn fetch_agent_card(client: &reqwest::Client, url: &str) -> EngineResult<AgentCard> {
    let base = url::card_base(url);
    let card_url = format!("{}/.well-known/agent.json", base);
    let response = client
        .get(&card_url)
        .send()
        .await
        .map_err(|e| EngineError::tool(format!("agent card fetch failed: {}", e)))?;
    response
        .json::<AgentCard>()
        .await
        .map_err(|e| EngineError::tool(format!("invalid agent card: {}", e)))
}

mod url {
    /// Strip the path from a URL, keeping scheme and authority.
    pub fn card_base(url: &str) -> &str {
        if let Some(scheme_end) = url.find("://") {
            let after = scheme_end + 3;
            match url[after..].find('/') {
                Some(path_start) => &url[..after + path_start],
                None => url,
            }
        } else {
            url
        }
    }
}

#[async_trait]
impl Capability for A2aCapability {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "message": {
                    "type": "string",
                    "description": "The message to send to the remote agent"
                }
            },
            "required": ["message"]
        })
    }

    async fn invoke(&self, args: Value, cancel: &CancellationToken) -> EngineResult<Value> {
        let text = args
            .get("message")
            .and_then(|v| v.as_str())
            .ok_or_else(|| EngineError::tool("a2a: missing 'message' argument"))?;

        let params = json!({
            "message": {
                "messageId": uuid::Uuid::new_v4().to_string(),
                "role": "user",
                "kind": "message",
                "parts": [{"kind": "text", "text": text}],
            }
        });

        let result = tokio::select! {
            _ = cancel.cancelled() => return Err(EngineError::canceled("a2a call")),
            result = self.endpoint.call("message/send", params) => result?,
        };

        let response: SendMessageResponse = serde_json::from_value(result)
            .map_err(|e| EngineError::tool(format!("a2a: unexpected response shape: {}", e)))?;

        let reply = match response {
            SendMessageResponse::Message(message) => get_message_text(&message, "\n"),
            SendMessageResponse::Task(task) => {
                // Prefer the final status message, then artifact text.
                if let Some(message) = &task.status.message {
                    get_message_text(message, "\n")
                } else {
                    task.artifacts
                        .as_deref()
                        .unwrap_or_default()
                        .iter()
                        .map(|a| crate::utils::get_artifact_text(a, "\n"))
                        .collect::<Vec<_>>()
                        .join("\n")
                }
            }
        };

        Ok(json!({"reply": reply}))
    }
}

// ---------------------------------------------------------------------------
// MCP
// ---------------------------------------------------------------------------

/// One tool listed by a remote MCP server.
pub struct McpCapability {
    endpoint: JsonRpcEndpoint,
    name: String,
    remote_name: String,
    description: String,
    parameters: Value,
}

/// Mount every tool listed by the MCP server at `url`.
pub async fn mount_mcp_tools(
    url: &str,
    headers: &HashMap<String, String>,
    transport: McpTransport,
) -> EngineResult<Vec<Arc<dyn Capability>>> {
    let accept = match transport {
        McpTransport::Http => "application/json",
        McpTransport::Sse => "application/json, text/event-stream",
    };
    let endpoint = JsonRpcEndpoint::new(url, headers.clone(), accept);

    let listing = endpoint.call("tools/list", json!({})).await?;
    let tools = listing
        .get("tools")
        .and_then(|v| v.as_array())
        .ok_or_else(|| EngineError::tool("tools/list: response missing 'tools'"))?;

    let mut mounted: Vec<Arc<dyn Capability>> = Vec::new();
    for tool in tools {
        let Some(remote_name) = tool.get("name").and_then(|v| v.as_str()) else {
            warn!(url = %url, "Skipping MCP tool without a name");
            continue;
        };
        let description = tool
            .get("description")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();
        let parameters = tool
            .get("inputSchema")
            .cloned()
            .unwrap_or_else(|| json!({"type": "object"}));

        mounted.push(Arc::new(McpCapability {
            endpoint: endpoint.clone(),
            name: sanitize_tool_name(remote_name),
            remote_name: remote_name.to_string(),
            description,
            parameters,
        }));
    }

    debug!(url = %url, count = mounted.len(), "Mounted MCP tools");
    Ok(mounted)
}

#[async_trait]
impl Capability for McpCapability {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters(&self) -> Value {
        self.parameters.clone()
    }

    async fn invoke(&self, args: Value, cancel: &CancellationToken) -> EngineResult<Value> {
        let params = json!({
            "name": self.remote_name,
            "arguments": args,
        });

        let result = tokio::select! {
            _ = cancel.cancelled() => return Err(EngineError::canceled("mcp call")),
            result = self.endpoint.call("tools/call", params) => result?,
        };

        // MCP results carry a content list; flatten text blocks.
        if let Some(content) = result.get("content").and_then(|v| v.as_array()) {
            let text: Vec<&str> = content
                .iter()
                .filter(|block| block.get("type").and_then(|t| t.as_str()) == Some("text"))
                .filter_map(|block| block.get("text").and_then(|t| t.as_str()))
                .collect();
            if !text.is_empty() {
                return Ok(json!({"text": text.join("\n")}));
            }
        }
        Ok(result)
    }
}
