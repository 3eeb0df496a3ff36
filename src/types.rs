//! Wire types for the engine's slice of the A2A protocol.
//!
//! Messages and their part union, tasks with lifecycle status,
//! artifacts, the four streaming event kinds, and the JSON-RPC error
//! object. Field names serialize in camelCase; unions carry a `kind`
//! discriminator and serialize flat (no wrapper keys).

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Enums
// ============================================================================

/// Lifecycle state of a task, serialized kebab-case.
///
/// `submitted → working → {completed, failed, canceled, input-required}`.
/// The first three outcomes are sticky; `input-required` can resume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskState {
    /// Accepted, not yet started.
    Submitted,
    /// The model loop is running.
    Working,
    /// Finished successfully.
    Completed,
    /// Finished with an error.
    Failed,
    /// Aborted by the caller.
    Canceled,
    /// Paused until the user sends another message.
    InputRequired,
}

impl TaskState {
    /// Whether this state is terminal. Terminal states are sticky:
    /// no further transition is accepted.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Failed | TaskState::Canceled
        )
    }

    /// The kebab-case wire spelling.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Submitted => "submitted",
            TaskState::Working => "working",
            TaskState::Completed => "completed",
            TaskState::Failed => "failed",
            TaskState::Canceled => "canceled",
            TaskState::InputRequired => "input-required",
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which side of the conversation produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The human (or calling client).
    User,
    /// The engine.
    Agent,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Role::User => "user",
            Role::Agent => "agent",
        })
    }
}

// ============================================================================
// Message & Parts
// ============================================================================

/// File content carried inline as base64 bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileWithBytes {
    /// Base64-encoded content.
    pub bytes: String,
    /// MIME type, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// File name, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// File content referenced by URI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileWithUri {
    /// Where the content lives.
    pub uri: String,
    /// MIME type, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// File name, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// File content: inline bytes or a URI reference. Untagged on the
/// wire; the `bytes` / `uri` key decides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FileContent {
    /// Inline base64 bytes.
    Bytes(FileWithBytes),
    /// URI reference.
    Uri(FileWithUri),
}

/// One piece of message or artifact content, tagged by `kind`.
///
/// Tool traffic is first-class: `function-call` and `function-response`
/// parts make a task's history a complete transcript of the model
/// loop. `data` and `file` are passthrough kinds the engine stores and
/// replays without interpreting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Part {
    /// Plain text (`kind: "text"`).
    #[serde(rename = "text")]
    Text {
        /// The text itself.
        text: String,
        /// Per-part metadata, if any.
        #[serde(skip_serializing_if = "Option::is_none")]
        metadata: Option<serde_json::Value>,
    },
    /// A tool invocation the model issued (`kind: "function-call"`).
    #[serde(rename = "function-call")]
    FunctionCall {
        /// Correlates the call with its response.
        id: String,
        /// Which tool was called.
        name: String,
        /// The parsed argument object.
        args: serde_json::Value,
    },
    /// What the tool returned (`kind: "function-response"`).
    #[serde(rename = "function-response")]
    FunctionResponse {
        /// Correlation id of the originating call.
        id: String,
        /// The result payload handed back to the model.
        response: serde_json::Value,
    },
    /// Opaque structured payload (`kind: "data"`).
    #[serde(rename = "data")]
    Data {
        /// The payload, passed through untouched.
        data: serde_json::Value,
        /// Per-part metadata, if any.
        #[serde(skip_serializing_if = "Option::is_none")]
        metadata: Option<serde_json::Value>,
    },
    /// File reference or inline file bytes (`kind: "file"`).
    #[serde(rename = "file")]
    File {
        /// The file content, passed through untouched.
        file: FileContent,
        /// Per-part metadata, if any.
        #[serde(skip_serializing_if = "Option::is_none")]
        metadata: Option<serde_json::Value>,
    },
}

impl Part {
    /// A text part without metadata.
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text {
            text: text.into(),
            metadata: None,
        }
    }

    /// A function-call part.
    pub fn function_call(
        id: impl Into<String>,
        name: impl Into<String>,
        args: serde_json::Value,
    ) -> Self {
        Part::FunctionCall {
            id: id.into(),
            name: name.into(),
            args,
        }
    }

    /// A function-response part.
    pub fn function_response(id: impl Into<String>, response: serde_json::Value) -> Self {
        Part::FunctionResponse {
            id: id.into(),
            response,
        }
    }
}

/// One turn (or sub-turn) of conversation.
///
/// A context-level message has no task id; everything emitted inside a
/// task carries both the task id and the task's context id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Opaque id; the engine assigns one when the caller omits it.
    pub message_id: String,

    /// Sender side.
    pub role: Role,

    /// Always `"message"`.
    #[serde(default = "kind_message")]
    pub kind: String,

    /// Ordered content parts.
    pub parts: Vec<Part>,

    /// Owning context.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_id: Option<String>,

    /// Owning task, when emitted within one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,

    /// Free-form metadata. `{"kind": "status-message"}` marks narrator
    /// output, which history views and prompt assembly filter.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl Message {
    fn text_message(message_id: String, role: Role, text: String) -> Self {
        Message {
            message_id,
            role,
            kind: kind_message(),
            parts: vec![Part::text(text)],
            context_id: None,
            task_id: None,
            metadata: None,
        }
    }

    /// A user message holding one text part.
    pub fn user(message_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::text_message(message_id.into(), Role::User, text.into())
    }

    /// An agent message holding one text part.
    pub fn agent(message_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::text_message(message_id.into(), Role::Agent, text.into())
    }

    /// Whether `metadata.kind` marks this as narrator output.
    pub fn is_status_message(&self) -> bool {
        self.metadata
            .as_ref()
            .and_then(|m| m.get(crate::utils::METADATA_KIND_KEY))
            .and_then(|v| v.as_str())
            .map(|k| k == crate::utils::STATUS_MESSAGE_KIND)
            .unwrap_or(false)
    }
}

// ============================================================================
// Context, Task & Artifact
// ============================================================================

/// The durable envelope around a conversation: groups messages and
/// tasks, created implicitly by the first message that names no
/// context.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Context {
    /// Server-assigned opaque id.
    pub id: String,

    /// Caller-supplied title, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Free-form metadata.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,

    /// Unix seconds at creation.
    pub created_at: i64,

    /// Unix seconds of last activity.
    pub updated_at: i64,
}

/// A task's current state plus an optional embedded message and the
/// time the state was entered.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatus {
    /// The state.
    pub state: TaskState,

    /// Message riding along with this status (narration, error detail).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,

    /// ISO-8601 moment the state was set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl TaskStatus {
    /// A status stamped with the current time.
    pub fn now(state: TaskState) -> Self {
        TaskStatus {
            state,
            message: None,
            timestamp: Some(chrono::Utc::now().to_rfc3339()),
        }
    }

    /// Embed a message in this status.
    pub fn with_message(mut self, message: Message) -> Self {
        self.message = Some(message);
        self
    }
}

/// One unit of goal-directed agent work.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Stable opaque id.
    pub id: String,

    /// Owning context.
    pub context_id: String,

    /// Always `"task"`.
    #[serde(default = "kind_task")]
    pub kind: String,

    /// Where the task is in its lifecycle.
    pub status: TaskStatus,

    /// Outputs the task has produced.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifacts: Option<Vec<Artifact>>,

    /// Messages attached to this task (narrations included), ordered
    /// by timestamp with insertion order breaking ties.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history: Option<Vec<Message>>,

    /// Free-form metadata.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// A named, file-like output of a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    /// Id, unique within the owning task.
    pub artifact_id: String,

    /// Producer-chosen stable name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// What the artifact is.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Content parts (currently a single text part).
    pub parts: Vec<Part>,

    /// Mime type, producer timestamp, and similar.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

// ============================================================================
// Streaming Events
// ============================================================================

/// A task changed state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatusUpdateEvent {
    /// The task in question.
    pub task_id: String,

    /// Its context.
    pub context_id: String,

    /// Always `"status-update"`.
    #[serde(default = "kind_status_update")]
    pub kind: String,

    /// The status just entered.
    pub status: TaskStatus,

    /// Set on the last event of a stream; the state is then terminal.
    #[serde(rename = "final")]
    pub r#final: bool,

    /// Free-form metadata.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// A chunk of an artifact reached subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskArtifactUpdateEvent {
    /// The producing task.
    pub task_id: String,

    /// Its context.
    pub context_id: String,

    /// Always `"artifact-update"`.
    #[serde(default = "kind_artifact_update")]
    pub kind: String,

    /// Snapshot of the artifact with the content grown so far.
    pub artifact: Artifact,

    /// True only on the terminal chunk of an emission.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_chunk: Option<bool>,

    /// Free-form metadata.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

const KIND_TASK: &str = "task";
const KIND_MESSAGE: &str = "message";
const KIND_STATUS_UPDATE: &str = "status-update";
const KIND_ARTIFACT_UPDATE: &str = "artifact-update";

fn kind_task() -> String {
    KIND_TASK.to_owned()
}

fn kind_message() -> String {
    KIND_MESSAGE.to_owned()
}

fn kind_status_update() -> String {
    KIND_STATUS_UPDATE.to_owned()
}

fn kind_artifact_update() -> String {
    KIND_ARTIFACT_UPDATE.to_owned()
}

/// Pull the `kind` discriminator out of a raw JSON value.
fn kind_of(value: &serde_json::Value) -> Result<&str, &'static str> {
    value
        .get("kind")
        .and_then(|v| v.as_str())
        .ok_or("missing 'kind' field")
}

fn from_value<T, E>(value: serde_json::Value) -> Result<T, E>
where
    T: serde::de::DeserializeOwned,
    E: serde::de::Error,
{
    serde_json::from_value(value).map_err(E::custom)
}

/// One event of a `message/stream` subscription, discriminated by the
/// inner `kind` field and serialized flat.
#[derive(Debug, Clone)]
pub enum StreamResponse {
    /// Task snapshot; always the first event of a task stream.
    Task(Task),

    /// Direct agent reply; the only event when no task was created.
    Message(Message),

    /// State change (working, narration, terminal).
    StatusUpdate(TaskStatusUpdateEvent),

    /// Progressive artifact chunk.
    ArtifactUpdate(TaskArtifactUpdateEvent),
}

impl StreamResponse {
    /// Whether this event ends the stream.
    pub fn is_final(&self) -> bool {
        match self {
            Self::StatusUpdate(update) => update.r#final,
            Self::Message(_) => true,
            Self::Task(_) | Self::ArtifactUpdate(_) => false,
        }
    }
}

impl Serialize for StreamResponse {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Task(inner) => inner.serialize(serializer),
            Self::Message(inner) => inner.serialize(serializer),
            Self::StatusUpdate(inner) => inner.serialize(serializer),
            Self::ArtifactUpdate(inner) => inner.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for StreamResponse {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        use serde::de::Error;
        let raw = serde_json::Value::deserialize(deserializer)?;
        match kind_of(&raw).map_err(D::Error::custom)? {
            KIND_TASK => from_value(raw).map(Self::Task),
            KIND_MESSAGE => from_value(raw).map(Self::Message),
            KIND_STATUS_UPDATE => from_value(raw).map(Self::StatusUpdate),
            KIND_ARTIFACT_UPDATE => from_value(raw).map(Self::ArtifactUpdate),
            other => Err(D::Error::custom(format!(
                "unexpected kind '{}' (want task | message | status-update | artifact-update)",
                other
            ))),
        }
    }
}

/// Outcome of `message/send`: a terminal task or a direct reply.
/// Discriminated by `kind`, serialized flat.
#[derive(Debug, Clone)]
pub enum SendMessageResponse {
    /// The request became a task and ran to a terminal state.
    Task(Task),

    /// The request was answered directly.
    Message(Message),
}

impl Serialize for SendMessageResponse {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Task(inner) => inner.serialize(serializer),
            Self::Message(inner) => inner.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for SendMessageResponse {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        use serde::de::Error;
        let raw = serde_json::Value::deserialize(deserializer)?;
        match kind_of(&raw).map_err(D::Error::custom)? {
            KIND_TASK => from_value(raw).map(Self::Task),
            KIND_MESSAGE => from_value(raw).map(Self::Message),
            other => Err(D::Error::custom(format!(
                "unexpected kind '{}' (want task | message)",
                other
            ))),
        }
    }
}

// ============================================================================
// Agent Card
// ============================================================================

/// The manifest served at `/.well-known/agent.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentCard {
    /// Display name.
    pub name: String,

    /// What the agent does.
    pub description: String,

    /// Version string of the serving agent.
    pub version: String,

    /// Where to reach it.
    pub url: String,

    /// Feature declarations.
    pub capabilities: AgentCapabilities,

    /// MIME types accepted by default.
    #[serde(default)]
    pub default_input_modes: Vec<String>,

    /// MIME types produced by default.
    #[serde(default)]
    pub default_output_modes: Vec<String>,
}

/// Feature declarations inside the card.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentCapabilities {
    /// Whether `message/stream` is offered.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub streaming: Option<bool>,
}

// ============================================================================
// JSON-RPC error object
// ============================================================================

/// The `error` member of a JSON-RPC 2.0 response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JsonRpcError {
    /// Numeric code.
    pub code: i64,

    /// Short description.
    pub message: String,

    /// Structured details, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

// ============================================================================
// Request parameters
// ============================================================================

/// Input of `message/send` and `message/stream`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageParams {
    /// The user message.
    pub message: Message,

    /// Request-level metadata.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// Input of `tasks/get`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetTaskParams {
    /// Which task.
    pub id: String,

    /// Keep only the most recent N history messages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history_length: Option<usize>,
}

/// Input of `tasks/cancel`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelTaskParams {
    /// Which task.
    pub id: String,
}
