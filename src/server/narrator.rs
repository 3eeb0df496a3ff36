//! Status narrator — periodic short progress messages for a working task.
//!
//! A cooperative background task that, roughly every
//! `narrator.interval_ms`, asks the model for a fresh one-line status,
//! persists it as a `status-message`, and queues a non-final
//! status-update for the orchestrator to emit. It never calls tools and
//! never blocks the main pipeline; a failed tick is logged and skipped.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::NarratorConfig;
use crate::error::EngineResult;
use crate::model::{ChatRequest, ModelClient, ToolChoice};
use crate::persistence::repositories::MessageRepository;
use crate::types::{TaskState, TaskStatus, TaskStatusUpdateEvent};
use crate::utils::{get_message_text, new_status_message};

/// Handle to a running narrator.
pub struct NarratorHandle {
    stop: CancellationToken,
    handle: JoinHandle<()>,
}

impl NarratorHandle {
    /// The narrator's stop token, for wiring into the orchestrator.
    /// Cancelling it stops the narrator: already-queued status updates
    /// still flush, no new narrations are produced.
    pub fn stop_token(&self) -> CancellationToken {
        self.stop.clone()
    }

    /// Stop and wait for the narrator task to finish.
    pub async fn shutdown(self) {
        self.stop.cancel();
        let _ = self.handle.await;
    }
}

/// Spawn the narrator for a working task.
///
/// Stops when `stop` is signaled (artifact detected, explicit stop) or
/// when the task's `abort` token fires.
pub fn spawn(
    model: Arc<dyn ModelClient>,
    messages: MessageRepository,
    task_id: String,
    context_id: String,
    config: NarratorConfig,
    abort: CancellationToken,
    status_tx: mpsc::UnboundedSender<TaskStatusUpdateEvent>,
) -> NarratorHandle {
    let stop = CancellationToken::new();
    let stop_inner = stop.clone();

    let handle = tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(std::time::Duration::from_millis(config.interval_ms.max(1)));
        // The first tick fires immediately; the narrator waits a full
        // period before the first narration.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = stop_inner.cancelled() => break,
                _ = abort.cancelled() => break,
                _ = interval.tick() => {}
            }

            let narrate = narrate_once(
                &model,
                &messages,
                &task_id,
                &context_id,
                &config,
                &status_tx,
            );
            // A stop mid-generation abandons the narration.
            tokio::select! {
                _ = stop_inner.cancelled() => break,
                _ = abort.cancelled() => break,
                result = narrate => {
                    if let Err(e) = result {
                        warn!(task_id = %task_id, error = %e, "Narration tick skipped");
                    }
                }
            }
        }
        debug!(task_id = %task_id, "Narrator stopped");
    });

    NarratorHandle { stop, handle }
}

/// One narration tick: load recents, prompt the model, persist, enqueue.
async fn narrate_once(
    model: &Arc<dyn ModelClient>,
    messages: &MessageRepository,
    task_id: &str,
    context_id: &str,
    config: &NarratorConfig,
    status_tx: &mpsc::UnboundedSender<TaskStatusUpdateEvent>,
) -> EngineResult<()> {
    let recents = messages
        .recent_status_messages(task_id, config.recent_window)
        .await?;
    let recent_texts: Vec<String> = recents
        .iter()
        .map(|m| get_message_text(m, " "))
        .collect();

    let history: Vec<_> = messages
        .list_by_task(task_id)
        .await?
        .into_iter()
        .filter(|m| !m.is_status_message())
        .collect();

    let mut request = ChatRequest::new(history);
    request.tool_choice = ToolChoice::Auto;
    request.system = Some(build_directive(config.max_chars, &recent_texts));

    let reply = model.complete(request).await?;
    let text = truncate_chars(reply.text.trim(), config.max_chars);
    if text.is_empty() {
        debug!(task_id = %task_id, "Narrator produced empty text, skipping");
        return Ok(());
    }

    let message = new_status_message(text, context_id, task_id);
    messages.upsert(&message).await?;

    let event = TaskStatusUpdateEvent {
        task_id: task_id.to_string(),
        context_id: context_id.to_string(),
        kind: "status-update".to_string(),
        status: TaskStatus::now(TaskState::Working).with_message(message),
        r#final: false,
        metadata: None,
    };
    // Receiver gone means the request is finishing; nothing to do.
    let _ = status_tx.send(event);

    Ok(())
}

fn build_directive(max_chars: usize, recents: &[String]) -> String {
    let mut directive = format!(
        "You are narrating the progress of an ongoing task. Write one fresh status \
         line of at most {} characters describing what is happening right now. \
         Reply with the status text only.",
        max_chars
    );
    if !recents.is_empty() {
        directive.push_str("\nDo not repeat any of these recent statuses:\n");
        for text in recents {
            directive.push_str("- ");
            directive.push_str(text);
            directive.push('\n');
        }
    }
    directive
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
