//! Request handler — the engine's public surface and orchestrating
//! state machine.
//!
//! A request flows through three stages:
//!
//! 1. **Routing** — one non-streaming model call with only the sentinel
//!    `create_task` tool. No tool call means the reply is a direct
//!    agent message and no task bookkeeping happens at all.
//! 2. **Execution** — a task is created and driven through a streaming
//!    model loop with the configured capabilities plus the well-known
//!    `create_artifact` tool, while the status narrator periodically
//!    queues short progress updates.
//! 3. **Finalization** — a naturally streamed artifact is persisted
//!    (never re-emitted); if none was produced, a second streaming call
//!    forces `create_artifact` through the identical pipeline. The task
//!    then completes.
//!
//! Every emitted event is also written through to the store, so
//! `tasks/get` after termination reconstructs exactly what a streaming
//! subscriber saw.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::capability::CapabilitySet;
use crate::config::{EngineConfig, NarratorConfig, RoutingConfig};
use crate::error::{EngineError, EngineResult};
use crate::model::{runner, ChatRequest, ModelClient, ToolChoice, ToolDefinition};
use crate::persistence::Database;
use crate::types::{
    Artifact, CancelTaskParams, GetTaskParams, Message, Part, SendMessageParams,
    SendMessageResponse, StreamResponse, Task, TaskState, TaskStatus, TaskStatusUpdateEvent,
};
use crate::utils::{new_agent_text_message, CREATE_ARTIFACT_TOOL, CREATE_TASK_TOOL};

use super::artifact_stream::ArtifactPipeline;
use super::event_queue::EventQueue;
use super::narrator::{self, NarratorHandle};
use super::orchestrator;
use super::task_service::TaskService;

/// Poll interval while waiting for a cancellation to take effect.
const CANCEL_POLL: Duration = Duration::from_millis(200);

const ROUTING_DIRECTIVE: &str = "You route incoming user requests. If the request is trivial \
     and can be answered in one short reply, answer it directly. If it requires multiple \
     steps, tools, or produces a document or file, call the create_task tool instead.";

const EXECUTION_DIRECTIVE: &str = "You are executing a task for the user. Work through it \
     step by step with the available tools. When the result is ready, call create_artifact \
     with a file name and stream the complete output as its content.";

const FORCED_ARTIFACT_DIRECTIVE: &str = "The task is finished but no artifact was produced. \
     Call create_artifact now, summarizing the result of the work above as its content.";

/// The engine's public surface: `send`, `send_stream`, `get_task`,
/// `cancel_task`.
pub struct RequestHandler {
    model: Arc<dyn ModelClient>,
    db: Database,
    tasks: Arc<TaskService>,
    capabilities: CapabilitySet,
    narrator_config: NarratorConfig,
    routing: RoutingConfig,
    model_parameters: HashMap<String, serde_json::Value>,
    /// Event queues of currently running task drivers.
    running: Arc<Mutex<HashMap<String, EventQueue>>>,
}

impl RequestHandler {
    /// Create a handler over an already-opened database and mounted
    /// capability set.
    pub fn new(
        model: Arc<dyn ModelClient>,
        db: Database,
        capabilities: CapabilitySet,
        config: &EngineConfig,
    ) -> Self {
        Self {
            model,
            tasks: Arc::new(TaskService::new(db.clone())),
            db,
            capabilities,
            narrator_config: config.narrator.clone(),
            routing: config.routing.clone(),
            model_parameters: config.model.parameters.clone(),
            running: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Open the configured database, mount the configured capabilities,
    /// and create a handler.
    pub async fn from_config(
        model: Arc<dyn ModelClient>,
        config: &EngineConfig,
    ) -> EngineResult<Self> {
        let db = Database::open(&config.database.path).await?;
        let capabilities = crate::capability::mount_capabilities(&config.capabilities, &db).await?;
        Ok(Self::new(model, db, capabilities, config))
    }

    /// The task service (exposed for embedding hosts and tests).
    pub fn tasks(&self) -> &Arc<TaskService> {
        &self.tasks
    }

    /// The database handle.
    pub fn db(&self) -> &Database {
        &self.db
    }

    // ------------------------------------------------------------------
    // send / send_stream
    // ------------------------------------------------------------------

    /// Handle `message/send`: run the pipeline to completion and return
    /// either the direct reply or the terminal task snapshot.
    ///
    /// A model failure during execution surfaces as `Model`; a canceled
    /// task is returned as a task in `canceled` state, not an error.
    pub async fn send(&self, params: SendMessageParams) -> EngineResult<SendMessageResponse> {
        let mut rx = self.send_stream(params).await?;

        let mut task_id: Option<String> = None;
        let mut direct: Option<Message> = None;
        let mut final_status: Option<TaskStatus> = None;

        loop {
            match rx.recv().await {
                Ok(event) => {
                    let is_final = event.is_final();
                    match event {
                        StreamResponse::Task(task) => task_id = Some(task.id),
                        StreamResponse::Message(message) => direct = Some(message),
                        StreamResponse::StatusUpdate(update) if is_final => {
                            final_status = Some(update.status);
                        }
                        _ => {}
                    }
                    if is_final {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Closed) => break,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(missed = n, "send consumer lagged");
                }
            }
        }

        if let Some(message) = direct {
            return Ok(SendMessageResponse::Message(message));
        }

        let task_id =
            task_id.ok_or_else(|| EngineError::internal("stream ended without task or message"))?;

        if let Some(status) = &final_status {
            if status.state == TaskState::Failed {
                let detail = status
                    .message
                    .as_ref()
                    .map(|m| crate::utils::get_message_text(m, " "))
                    .unwrap_or_else(|| "task failed".to_string());
                return Err(EngineError::model(detail));
            }
        }

        let task = self.tasks.get_task(&task_id, None).await?;
        Ok(SendMessageResponse::Task(task))
    }

    /// Handle `message/stream`: validate, persist the user message, run
    /// routing, and — for tasks — spawn the driver. Returns the event
    /// subscription; events published before the first poll are
    /// buffered.
    pub async fn send_stream(
        &self,
        params: SendMessageParams,
    ) -> EngineResult<broadcast::Receiver<StreamResponse>> {
        let mut message = params.message;
        validate_message(&message)?;

        if message.message_id.is_empty() {
            message.message_id = Uuid::new_v4().to_string();
        }

        let context_id = message
            .context_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        message.context_id = Some(context_id.clone());

        let context = self.db.contexts().ensure(&context_id).await?;
        if context.title.is_none() {
            let title = derive_title(&message);
            if !title.is_empty() {
                self.db.contexts().set_title(&context_id, &title).await?;
            }
        }

        // A message addressed to an existing task resumes it (the
        // input-required path). Terminal and still-running tasks are
        // rejected.
        if let Some(task_id) = message.task_id.clone() {
            let task = self.tasks.get_task(&task_id, Some(0)).await?;
            if task.status.state.is_terminal() {
                return Err(EngineError::invalid_state(format!(
                    "task {} is {} — send a new message without a task id",
                    task_id, task.status.state
                )));
            }
            if self.running.lock().await.contains_key(&task_id) {
                return Err(EngineError::invalid_state(format!(
                    "task {} is still running",
                    task_id
                )));
            }

            self.db.messages().upsert(&message).await?;
            return self.spawn_driver(task, &context_id).await;
        }

        self.db.messages().upsert(&message).await?;

        // Stage 1 — routing. Skipped when every request is a task.
        if !self.routing.always_task {
            let history = self.db.messages().list_by_context(&context_id, false).await?;
            if let Some(text) = self.route(history).await? {
                let reply = new_agent_text_message(text, Some(context_id.clone()), None::<String>);
                self.db.messages().upsert(&reply).await?;
                self.db.contexts().touch(&context_id).await?;

                let queue = EventQueue::with_default_capacity();
                let rx = queue.subscribe();
                queue.publish(StreamResponse::Message(reply));
                queue.close();
                debug!(context_id = %context_id, "Direct reply");
                return Ok(rx);
            }
        }

        // Stage 2 begins: create the task and hand off to the driver.
        let task = self.tasks.create(&context_id, &message).await?;
        self.spawn_driver(task, &context_id).await
    }

    /// Handle `tasks/get`.
    pub async fn get_task(&self, params: GetTaskParams) -> EngineResult<Task> {
        self.tasks.get_task(&params.id, params.history_length).await
    }

    /// Handle `tasks/cancel`: fire the task's abort signal and wait for
    /// the driver's terminal `canceled` event.
    pub async fn cancel_task(&self, params: CancelTaskParams) -> EngineResult<Task> {
        let task = self.tasks.get_task(&params.id, Some(0)).await?;
        if task.status.state.is_terminal() {
            return Err(EngineError::invalid_state(format!(
                "task {} is already {}",
                params.id, task.status.state
            )));
        }

        let queue = self.running.lock().await.get(&params.id).cloned();

        match queue {
            Some(queue) => {
                // Subscribe before firing the signal so the terminal
                // event cannot be missed.
                let mut rx = queue.subscribe();
                self.tasks.abort(&params.id).await;

                loop {
                    match tokio::time::timeout(CANCEL_POLL, rx.recv()).await {
                        Ok(Ok(event)) if event.is_final() => break,
                        Ok(Ok(_)) => {}
                        Ok(Err(broadcast::error::RecvError::Closed)) => break,
                        Ok(Err(broadcast::error::RecvError::Lagged(n))) => {
                            warn!(task_id = %params.id, missed = n, "cancel consumer lagged");
                        }
                        Err(_) => {
                            // Timed out — re-check the persisted state in
                            // case the terminal event was published before
                            // we subscribed.
                            let current = self.tasks.get_task(&params.id, Some(0)).await?;
                            if current.status.state.is_terminal() {
                                break;
                            }
                        }
                    }
                }
            }
            None => {
                // No live driver (e.g. a task parked in input-required):
                // transition directly.
                self.tasks
                    .transition(&params.id, TaskState::Canceled, None)
                    .await?;
            }
        }

        let final_task = self.tasks.get_task(&params.id, None).await?;
        if final_task.status.state != TaskState::Canceled {
            return Err(EngineError::invalid_state(format!(
                "task {} reached {} before the cancellation took effect",
                params.id, final_task.status.state
            )));
        }
        Ok(final_task)
    }

    // ------------------------------------------------------------------
    // Stage 1 — routing
    // ------------------------------------------------------------------

    /// One non-streaming model call with only the `create_task` tool.
    /// Returns the direct reply text, or `None` when the model chose to
    /// create a task. A reply carrying both text and the tool call
    /// takes the task branch.
    async fn route(&self, history: Vec<Message>) -> EngineResult<Option<String>> {
        let mut request = ChatRequest::new(history);
        request.system = Some(ROUTING_DIRECTIVE.to_string());
        request.tools = vec![create_task_tool()];
        request.parameters = self.model_parameters.clone();

        let reply = self.model.complete(request).await?;
        let wants_task = reply.tool_calls.iter().any(|c| c.name == CREATE_TASK_TOOL);
        if wants_task {
            Ok(None)
        } else {
            Ok(Some(reply.text))
        }
    }

    // ------------------------------------------------------------------
    // Stages 2 & 3 — the spawned driver
    // ------------------------------------------------------------------

    async fn spawn_driver(
        &self,
        task: Task,
        context_id: &str,
    ) -> EngineResult<broadcast::Receiver<StreamResponse>> {
        let queue = EventQueue::with_default_capacity();
        let rx = queue.subscribe();

        let cancel = self.tasks.register_abort(&task.id).await;
        self.running
            .lock()
            .await
            .insert(task.id.clone(), queue.clone());

        let driver = TaskDriver {
            model: self.model.clone(),
            db: self.db.clone(),
            tasks: self.tasks.clone(),
            capabilities: self.capabilities.clone(),
            narrator_config: self.narrator_config.clone(),
            model_parameters: self.model_parameters.clone(),
            running: self.running.clone(),
            task_id: task.id.clone(),
            context_id: context_id.to_string(),
            queue,
            cancel,
        };
        tokio::spawn(driver.run());

        Ok(rx)
    }
}

/// Everything one task execution owns. The driver itself is shared
/// (`&self`) across the stage methods; mutable per-call scratch state
/// (the artifact pipeline, the narrator's status receiver) is passed
/// down as explicit `&mut` arguments instead. Nothing here is shared
/// with other requests except the store, the task service, and the
/// running-queue map.
struct TaskDriver {
    model: Arc<dyn ModelClient>,
    db: Database,
    tasks: Arc<TaskService>,
    capabilities: CapabilitySet,
    narrator_config: NarratorConfig,
    model_parameters: HashMap<String, serde_json::Value>,
    running: Arc<Mutex<HashMap<String, EventQueue>>>,
    task_id: String,
    context_id: String,
    queue: EventQueue,
    cancel: CancellationToken,
}

impl TaskDriver {
    async fn run(self) {
        let result = self.execute().await;

        // A cancellation that raced a failure still counts as a
        // cancellation: the signal fired while the task was live.
        let result = match result {
            Err(e)
                if self.cancel.is_cancelled()
                    && !matches!(e, EngineError::Canceled { .. }) =>
            {
                debug!(task_id = %self.task_id, error = %e, "Error after abort, treating as canceled");
                Err(EngineError::canceled(format!("task {}", self.task_id)))
            }
            other => other,
        };

        match result {
            Ok(()) => {}
            Err(EngineError::Canceled { .. }) => {
                self.finish_with(TaskState::Canceled, None).await;
            }
            Err(e) => {
                error!(task_id = %self.task_id, error = %e, "Task execution failed");
                let embedded = new_agent_text_message(
                    e.user_message(),
                    Some(self.context_id.clone()),
                    Some(self.task_id.clone()),
                );
                self.finish_with(TaskState::Failed, Some(embedded)).await;
            }
        }

        self.tasks.unregister(&self.task_id).await;
        self.running.lock().await.remove(&self.task_id);
        self.queue.close();
    }

    /// Terminal transition + final event. A rejection here means the
    /// task already reached a terminal state; the persisted status is
    /// authoritative and is left alone.
    async fn finish_with(&self, state: TaskState, message: Option<Message>) {
        match self.tasks.transition(&self.task_id, state, message).await {
            Ok(status) => self.publish_status(status, true),
            Err(e) => warn!(
                task_id = %self.task_id,
                state = %state,
                error = %e,
                "Terminal transition rejected"
            ),
        }
    }

    fn publish_status(&self, status: TaskStatus, r#final: bool) {
        self.queue
            .publish(StreamResponse::StatusUpdate(TaskStatusUpdateEvent {
                task_id: self.task_id.clone(),
                context_id: self.context_id.clone(),
                kind: "status-update".to_string(),
                status,
                r#final,
                metadata: None,
            }));
    }

    async fn execute(&self) -> EngineResult<()> {
        // Initial snapshot: submitted, with the user message attached.
        let snapshot = self.tasks.get_task(&self.task_id, None).await?;
        self.queue.publish(StreamResponse::Task(snapshot));

        let status = self
            .tasks
            .transition(&self.task_id, TaskState::Working, None)
            .await?;
        self.publish_status(status, false);

        // Narrator lives until an artifact is detected or the task
        // reaches a terminal state.
        let (status_tx, mut status_rx) = mpsc::unbounded_channel();
        let narrator = narrator::spawn(
            self.model.clone(),
            self.db.messages(),
            self.task_id.clone(),
            self.context_id.clone(),
            self.narrator_config.clone(),
            self.cancel.clone(),
            status_tx,
        );

        let outcome = self.execute_stages(&mut status_rx, &narrator).await;
        narrator.shutdown().await;
        let artifact = outcome?;

        self.tasks.create_artifact(&self.task_id, &artifact).await?;

        if self.cancel.is_cancelled() {
            return Err(EngineError::canceled(format!("task {}", self.task_id)));
        }

        let status = self
            .tasks
            .transition(&self.task_id, TaskState::Completed, None)
            .await?;
        self.publish_status(status, true);
        Ok(())
    }

    /// Stage 2 (free-running) and, if it yields no artifact, stage 3
    /// (forced artifact). Both share the artifact pipeline so a forced
    /// artifact is indistinguishable to subscribers.
    async fn execute_stages(
        &self,
        status_rx: &mut mpsc::UnboundedReceiver<TaskStatusUpdateEvent>,
        narrator: &NarratorHandle,
    ) -> EngineResult<Artifact> {
        let mut pipeline = ArtifactPipeline::new(&self.task_id, &self.context_id);

        // Stage 2 — full tool set, model decides.
        let history = self
            .db
            .messages()
            .list_by_context(&self.context_id, false)
            .await?;
        let mut request = ChatRequest::new(history);
        request.system = Some(EXECUTION_DIRECTIVE.to_string());
        request.tools = self.capabilities.tool_definitions();
        request.tools.push(create_artifact_tool());
        request.parameters = self.model_parameters.clone();

        let natural = self
            .run_model_stage(request, &mut pipeline, status_rx, narrator)
            .await?;

        if let Some(artifact) = natural {
            return Ok(artifact);
        }

        // Stage 3 — second streaming call forcing the artifact tool,
        // through the identical pipeline machinery.
        debug!(task_id = %self.task_id, "No natural artifact, forcing one");
        let history = self
            .db
            .messages()
            .list_by_context(&self.context_id, false)
            .await?;
        let mut request = ChatRequest::new(history);
        request.system = Some(FORCED_ARTIFACT_DIRECTIVE.to_string());
        request.tools = vec![create_artifact_tool()];
        request.tool_choice = ToolChoice::Required(CREATE_ARTIFACT_TOOL.to_string());
        request.parameters = self.model_parameters.clone();

        let forced = self
            .run_model_stage(request, &mut pipeline, status_rx, narrator)
            .await?;

        forced.ok_or_else(|| {
            EngineError::model("model did not produce an artifact despite forced tool choice")
        })
    }

    /// One streaming model call: the runner produces raw events, the
    /// orchestrator interleaves artifact updates with queued narrator
    /// statuses, and every model-produced message is written through to
    /// the store afterwards (keyed by message id).
    async fn run_model_stage(
        &self,
        request: ChatRequest,
        pipeline: &mut ArtifactPipeline,
        status_rx: &mut mpsc::UnboundedReceiver<TaskStatusUpdateEvent>,
        narrator: &NarratorHandle,
    ) -> EngineResult<Option<Artifact>> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let runner_handle = tokio::spawn(runner::run_streaming_turn(
            self.model.clone(),
            request,
            self.capabilities.clone(),
            self.cancel.clone(),
            events_tx,
            self.task_id.clone(),
            self.context_id.clone(),
        ));

        let artifact = orchestrator::run(
            events_rx,
            pipeline,
            status_rx,
            &self.queue,
            &narrator.stop_token(),
            true,
        )
        .await?;

        let messages = match runner_handle.await {
            Ok(result) => result?,
            Err(e) => return Err(EngineError::internal(format!("runner task panicked: {}", e))),
        };

        // Write through everything the stream produced, keyed by id.
        for message in &messages {
            if !self.db.messages().exists(&message.message_id).await? {
                self.db.messages().upsert(message).await?;
            }
        }

        Ok(artifact)
    }
}

// ---------------------------------------------------------------------------
// Sentinel tools & validation
// ---------------------------------------------------------------------------

fn create_task_tool() -> ToolDefinition {
    ToolDefinition {
        name: CREATE_TASK_TOOL.to_string(),
        description: "Escalate this request into a multi-step task with tools and a produced \
                      artifact"
            .to_string(),
        parameters: json!({"type": "object", "properties": {}}),
    }
}

fn create_artifact_tool() -> ToolDefinition {
    ToolDefinition {
        name: CREATE_ARTIFACT_TOOL.to_string(),
        description: "Produce the final named output of the task. Stream the complete content."
            .to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "name": {"type": "string", "description": "File-like name for the output"},
                "description": {"type": "string"},
                "mimeType": {"type": "string"},
                "content": {"type": "string", "description": "The full output content"}
            },
            "required": ["name", "content"]
        }),
    }
}

fn validate_message(message: &Message) -> EngineResult<()> {
    if message.parts.is_empty() {
        return Err(EngineError::invalid_request("message parts cannot be empty"));
    }
    for part in &message.parts {
        if let Part::Text { text, .. } = part {
            if text.is_empty() {
                return Err(EngineError::invalid_request(
                    "text part content cannot be empty",
                ));
            }
        }
    }
    Ok(())
}

/// First ~60 characters of the message text, used as an implicit
/// context title.
fn derive_title(message: &Message) -> String {
    let text = crate::utils::get_message_text(message, " ");
    text.chars().take(60).collect::<String>().trim().to_string()
}
