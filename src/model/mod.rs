//! The model provider seam.
//!
//! The engine treats the language model as an opaque streaming
//! completer with tool calling. Providers implement [`ModelClient`];
//! everything above this module works purely in terms of
//! [`ChatRequest`], [`ModelReply`], and the [`ModelEvent`] stream
//! alphabet.

pub mod runner;

use std::collections::HashMap;

use async_trait::async_trait;
use futures::stream::BoxStream;
use tokio_util::sync::CancellationToken;

use crate::error::EngineResult;
use crate::types::Message;

/// A tool made available to the model for one request.
#[derive(Debug, Clone)]
pub struct ToolDefinition {
    /// Wire name of the tool.
    pub name: String,

    /// What the tool does, shown to the model.
    pub description: String,

    /// JSON schema of the tool's arguments.
    pub parameters: serde_json::Value,
}

/// How the model may use the provided tools.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolChoice {
    /// The model decides whether to call a tool.
    Auto,
    /// The model MUST call the named tool.
    Required(String),
}

/// A single model invocation: conversation so far plus the tool set.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    /// System directive, if any.
    pub system: Option<String>,

    /// Conversation history, oldest first. Status messages are already
    /// filtered out by the caller.
    pub messages: Vec<Message>,

    /// Tools available for this call.
    pub tools: Vec<ToolDefinition>,

    /// Tool-choice constraint.
    pub tool_choice: ToolChoice,

    /// Provider-specific parameters, forwarded verbatim.
    pub parameters: HashMap<String, serde_json::Value>,
}

impl ChatRequest {
    /// A request with no tools and automatic tool choice.
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            system: None,
            messages,
            tools: Vec::new(),
            tool_choice: ToolChoice::Auto,
            parameters: HashMap::new(),
        }
    }
}

/// A completed (non-streaming) model reply.
#[derive(Debug, Clone, Default)]
pub struct ModelReply {
    /// Concatenated text output.
    pub text: String,

    /// Tool calls the model requested, in order.
    pub tool_calls: Vec<ToolCallRequest>,
}

/// A tool call requested by the model.
#[derive(Debug, Clone)]
pub struct ToolCallRequest {
    /// Provider-assigned correlation id.
    pub id: String,

    /// Tool name.
    pub name: String,

    /// Parsed arguments.
    pub arguments: serde_json::Value,
}

/// One event of a streaming model turn.
///
/// Providers emit the first four kinds; [`runner`] appends
/// `ToolCompleted` after it has invoked the tool, so a consumer sees a
/// call's deltas strictly before its completion.
#[derive(Debug, Clone)]
pub enum ModelEvent {
    /// A fragment of assistant text.
    TextDelta {
        /// The text fragment.
        delta: String,
    },

    /// The model began emitting a tool call.
    ToolInputStart {
        /// Correlation id of the call.
        tool_call_id: String,
        /// Tool name.
        name: String,
    },

    /// A fragment of the tool call's streamed input.
    ///
    /// For the artifact tool this is a fragment of the artifact
    /// content; `last` is set on the terminal fragment.
    ToolInputDelta {
        /// Correlation id of the call.
        tool_call_id: String,
        /// The input fragment.
        delta: String,
        /// Whether this is the final fragment of the call.
        last: bool,
    },

    /// The tool call is fully formed (arguments parsed).
    ToolCall {
        /// Correlation id of the call.
        tool_call_id: String,
        /// Tool name.
        name: String,
        /// Parsed arguments.
        arguments: serde_json::Value,
    },

    /// The engine finished invoking the tool (runner-emitted).
    ToolCompleted {
        /// Correlation id of the call.
        tool_call_id: String,
        /// Tool name.
        name: String,
        /// The result fed back to the model.
        result: serde_json::Value,
    },
}

/// A stream of model events.
pub type ModelEventStream = BoxStream<'static, EngineResult<ModelEvent>>;

/// The opaque provider interface.
///
/// `stream` must honor the cancellation token: when it fires, the
/// stream should end promptly (an `Err(Canceled)` item or simply
/// termination — the runner checks the token either way).
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// One-shot completion. Used by routing and by the status narrator.
    async fn complete(&self, request: ChatRequest) -> EngineResult<ModelReply>;

    /// Streaming completion with tool calling.
    async fn stream(
        &self,
        request: ChatRequest,
        cancel: CancellationToken,
    ) -> EngineResult<ModelEventStream>;
}
