//! Shared test fixtures: a deterministic scripted model and engine
//! wiring over a temp-file database.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::json;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use a2a_engine::capability::CapabilitySet;
use a2a_engine::config::EngineConfig;
use a2a_engine::error::{EngineError, EngineResult};
use a2a_engine::model::{
    ChatRequest, ModelClient, ModelEvent, ModelEventStream, ModelReply, ToolCallRequest,
};
use a2a_engine::persistence::Database;
use a2a_engine::server::RequestHandler;
use a2a_engine::types::{Message, SendMessageParams, StreamResponse};
use a2a_engine::utils::{CREATE_ARTIFACT_TOOL, CREATE_TASK_TOOL};

/// One scripted step of a streaming call.
#[derive(Debug, Clone)]
pub enum StreamItem {
    /// Emit a model event.
    Event(ModelEvent),
    /// Sleep before the next item (milliseconds).
    Delay(u64),
    /// Fail the stream with a model error.
    Error(String),
}

/// Deterministic [`ModelClient`]: `complete` pops scripted replies,
/// `stream` pops scripted event sequences. Narrator calls are detected
/// by their directive and answered with a counter-stamped status line,
/// so they never consume the scripted queues.
pub struct ScriptedModel {
    completes: std::sync::Mutex<VecDeque<ModelReply>>,
    streams: std::sync::Mutex<VecDeque<Vec<StreamItem>>>,
    narration_count: AtomicUsize,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self {
            completes: std::sync::Mutex::new(VecDeque::new()),
            streams: std::sync::Mutex::new(VecDeque::new()),
            narration_count: AtomicUsize::new(0),
        }
    }

    /// Queue a non-streaming reply (used by the routing stage).
    pub fn push_complete(&self, reply: ModelReply) {
        self.completes.lock().unwrap().push_back(reply);
    }

    /// Queue a streaming script (used by execution stages, in order).
    pub fn push_stream(&self, items: Vec<StreamItem>) {
        self.streams.lock().unwrap().push_back(items);
    }

    /// How many narrations have been generated so far.
    pub fn narrations(&self) -> usize {
        self.narration_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    async fn complete(&self, request: ChatRequest) -> EngineResult<ModelReply> {
        // Narrator calls carry the narration directive.
        if request
            .system
            .as_deref()
            .is_some_and(|s| s.contains("narrating the progress"))
        {
            let n = self.narration_count.fetch_add(1, Ordering::SeqCst) + 1;
            return Ok(ModelReply {
                text: format!("Working on step {}", n),
                tool_calls: vec![],
            });
        }

        self.completes
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| EngineError::model("no scripted completion"))
    }

    async fn stream(
        &self,
        _request: ChatRequest,
        _cancel: CancellationToken,
    ) -> EngineResult<ModelEventStream> {
        let items = self
            .streams
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| EngineError::model("no scripted stream"))?;

        let stream = async_stream::stream! {
            for item in items {
                match item {
                    StreamItem::Event(event) => yield Ok(event),
                    StreamItem::Delay(ms) => {
                        tokio::time::sleep(std::time::Duration::from_millis(ms)).await;
                    }
                    StreamItem::Error(message) => {
                        yield Err(EngineError::model(message));
                        return;
                    }
                }
            }
        };
        Ok(stream.boxed())
    }
}

// ---------------------------------------------------------------------------
// Script builders
// ---------------------------------------------------------------------------

/// A routing reply that answers directly with text.
pub fn direct_reply(text: &str) -> ModelReply {
    ModelReply {
        text: text.to_string(),
        tool_calls: vec![],
    }
}

/// A routing reply that escalates into a task.
pub fn task_reply() -> ModelReply {
    ModelReply {
        text: String::new(),
        tool_calls: vec![ToolCallRequest {
            id: "route-1".to_string(),
            name: CREATE_TASK_TOOL.to_string(),
            arguments: json!({}),
        }],
    }
}

/// Streaming script that produces an artifact named `name` across the
/// given content chunks (the last chunk is flagged), optionally
/// preceded by a delay.
pub fn artifact_script(
    call_id: &str,
    name: &str,
    chunks: &[&str],
    lead_delay_ms: u64,
) -> Vec<StreamItem> {
    let mut items = Vec::new();
    if lead_delay_ms > 0 {
        items.push(StreamItem::Delay(lead_delay_ms));
    }
    items.push(StreamItem::Event(ModelEvent::ToolInputStart {
        tool_call_id: call_id.to_string(),
        name: CREATE_ARTIFACT_TOOL.to_string(),
    }));
    items.push(StreamItem::Event(ModelEvent::ToolCall {
        tool_call_id: call_id.to_string(),
        name: CREATE_ARTIFACT_TOOL.to_string(),
        arguments: json!({"name": name, "description": "test output"}),
    }));
    for (i, chunk) in chunks.iter().enumerate() {
        items.push(StreamItem::Event(ModelEvent::ToolInputDelta {
            tool_call_id: call_id.to_string(),
            delta: chunk.to_string(),
            last: i == chunks.len() - 1,
        }));
    }
    items
}

/// Streaming script with plain text and no tool calls (ends the turn).
pub fn text_script(text: &str) -> Vec<StreamItem> {
    vec![StreamItem::Event(ModelEvent::TextDelta {
        delta: text.to_string(),
    })]
}

// ---------------------------------------------------------------------------
// Engine wiring
// ---------------------------------------------------------------------------

/// A handler over a scripted model and a temp-file database.
pub struct TestEngine {
    pub handler: Arc<RequestHandler>,
    pub model: Arc<ScriptedModel>,
    _tmp: tempfile::TempDir,
}

/// Build an engine with the given narrator interval.
pub async fn engine(model: ScriptedModel, narrator_interval_ms: u64) -> TestEngine {
    let mut config = EngineConfig::default();
    config.narrator.interval_ms = narrator_interval_ms;
    engine_with_config(model, config).await
}

/// Build an engine with full control over the configuration.
pub async fn engine_with_config(model: ScriptedModel, config: EngineConfig) -> TestEngine {
    let tmp = tempfile::tempdir().expect("tempdir");
    let db = Database::open(tmp.path().join("engine.db"))
        .await
        .expect("open database");

    let model = Arc::new(model);
    let handler = Arc::new(RequestHandler::new(
        model.clone(),
        db,
        CapabilitySet::empty(),
        &config,
    ));

    TestEngine {
        handler,
        model,
        _tmp: tmp,
    }
}

/// `message/send` params wrapping a single text message.
pub fn send_params(text: &str) -> SendMessageParams {
    SendMessageParams {
        message: Message::user(uuid::Uuid::new_v4().to_string(), text),
        metadata: None,
    }
}

/// Collect events from a subscription until the final event (or close).
pub async fn collect_events(
    mut rx: broadcast::Receiver<StreamResponse>,
) -> Vec<StreamResponse> {
    let mut events = Vec::new();
    loop {
        match rx.recv().await {
            Ok(event) => {
                let is_final = event.is_final();
                events.push(event);
                if is_final {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Closed) => break,
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
        }
    }
    events
}

/// True if the event is a narrator status update (a non-final
/// status-update carrying a status-message).
pub fn is_narration(event: &StreamResponse) -> bool {
    match event {
        StreamResponse::StatusUpdate(update) => {
            !update.r#final
                && update
                    .status
                    .message
                    .as_ref()
                    .is_some_and(|m| m.is_status_message())
        }
        _ => false,
    }
}
