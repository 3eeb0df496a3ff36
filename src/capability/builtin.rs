//! Built-in capabilities: `exec`, `memory`, and `search`.

use std::collections::HashMap;
use std::process::Stdio;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{EngineError, EngineResult};
use crate::persistence::repositories::MessageRepository;
use crate::utils::get_message_text;

use super::Capability;

// ---------------------------------------------------------------------------
// exec
// ---------------------------------------------------------------------------

/// Runs a shell command and returns stdout/stderr/exit code.
pub struct ExecCapability;

impl ExecCapability {
    /// Create the capability.
    pub fn new() -> Self {
        Self
    }
}

impl Default for ExecCapability {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Capability for ExecCapability {
    fn name(&self) -> &str {
        "exec"
    }

    fn description(&self) -> &str {
        "Run a shell command and return its output"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The shell command to run"
                }
            },
            "required": ["command"]
        })
    }

    async fn invoke(&self, args: Value, cancel: &CancellationToken) -> EngineResult<Value> {
        let command = args
            .get("command")
            .and_then(|v| v.as_str())
            .ok_or_else(|| EngineError::tool("exec: missing 'command' argument"))?;

        debug!(command = %command, "Running exec capability");

        let child = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| EngineError::tool(format!("exec: failed to spawn: {}", e)))?;

        // kill_on_drop reaps the process if the cancel branch wins.
        let output = tokio::select! {
            _ = cancel.cancelled() => return Err(EngineError::canceled("exec command")),
            output = child.wait_with_output() => {
                output.map_err(|e| EngineError::tool(format!("exec: {}", e)))?
            }
        };

        Ok(json!({
            "stdout": String::from_utf8_lossy(&output.stdout),
            "stderr": String::from_utf8_lossy(&output.stderr),
            "exitCode": output.status.code(),
        }))
    }
}

// ---------------------------------------------------------------------------
// memory
// ---------------------------------------------------------------------------

/// In-process key/value note store. Notes live for the lifetime of the
/// engine process.
pub struct MemoryCapability {
    notes: RwLock<HashMap<String, String>>,
}

impl MemoryCapability {
    /// Create an empty note store.
    pub fn new() -> Self {
        Self {
            notes: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryCapability {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Capability for MemoryCapability {
    fn name(&self) -> &str {
        "memory"
    }

    fn description(&self) -> &str {
        "Store, recall, or list short notes by key"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": {
                    "type": "string",
                    "enum": ["store", "recall", "list"],
                    "description": "What to do"
                },
                "key": {"type": "string"},
                "value": {"type": "string"}
            },
            "required": ["action"]
        })
    }

    async fn invoke(&self, args: Value, _cancel: &CancellationToken) -> EngineResult<Value> {
        let action = args
            .get("action")
            .and_then(|v| v.as_str())
            .ok_or_else(|| EngineError::tool("memory: missing 'action' argument"))?;

        match action {
            "store" => {
                let key = args
                    .get("key")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| EngineError::tool("memory: store requires 'key'"))?;
                let value = args
                    .get("value")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| EngineError::tool("memory: store requires 'value'"))?;
                let mut notes = self.notes.write().await;
                notes.insert(key.to_string(), value.to_string());
                Ok(json!({"stored": key}))
            }
            "recall" => {
                let key = args
                    .get("key")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| EngineError::tool("memory: recall requires 'key'"))?;
                let notes = self.notes.read().await;
                Ok(json!({"key": key, "value": notes.get(key)}))
            }
            "list" => {
                let notes = self.notes.read().await;
                let mut keys: Vec<&String> = notes.keys().collect();
                keys.sort();
                Ok(json!({"keys": keys}))
            }
            other => Err(EngineError::tool(format!(
                "memory: unknown action '{}'",
                other
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// search
// ---------------------------------------------------------------------------

/// Searches the engine's own conversation history.
pub struct SearchCapability {
    messages: MessageRepository,
}

impl SearchCapability {
    /// Create the capability over the message store.
    pub fn new(messages: MessageRepository) -> Self {
        Self { messages }
    }
}

#[async_trait]
impl Capability for SearchCapability {
    fn name(&self) -> &str {
        "search"
    }

    fn description(&self) -> &str {
        "Search past conversation messages for a text fragment"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {"type": "string", "description": "Text to look for"},
                "limit": {"type": "integer", "description": "Max results (default 10)"}
            },
            "required": ["query"]
        })
    }

    async fn invoke(&self, args: Value, _cancel: &CancellationToken) -> EngineResult<Value> {
        let query = args
            .get("query")
            .and_then(|v| v.as_str())
            .ok_or_else(|| EngineError::tool("search: missing 'query' argument"))?;
        let limit = args
            .get("limit")
            .and_then(|v| v.as_u64())
            .unwrap_or(10)
            .min(50) as usize;

        let matches = self
            .messages
            .search_text(query, limit)
            .await
            .map_err(|e| EngineError::tool(format!("search: {}", e)))?;

        let results: Vec<Value> = matches
            .iter()
            .map(|m| {
                json!({
                    "messageId": m.message_id,
                    "contextId": m.context_id,
                    "taskId": m.task_id,
                    "role": m.role.to_string(),
                    "text": get_message_text(m, "\n"),
                })
            })
            .collect();

        Ok(json!({"matches": results}))
    }
}
