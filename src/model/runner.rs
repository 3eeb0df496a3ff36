//! The multi-step streaming tool loop.
//!
//! Drives one model "turn" that may span several streaming steps: the
//! model emits text and tool calls, the engine invokes the tools, feeds
//! the results back, and calls the model again until a step produces no
//! tool calls. Every raw stream event — plus a `ToolCompleted` marker
//! after each invocation — is forwarded to the orchestrator's channel.

use std::sync::Arc;

use futures::StreamExt;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::capability::CapabilitySet;
use crate::error::{EngineError, EngineResult};
use crate::model::{ChatRequest, ModelClient, ModelEvent, ToolCallRequest};
use crate::types::{Message, Part, Role};
use crate::utils::CREATE_ARTIFACT_TOOL;

/// Upper bound on model steps within one turn. A step with no tool
/// calls always ends the turn before the bound is reached.
const MAX_STEPS: usize = 20;

/// Run a streaming model turn for a task.
///
/// Forwards every [`ModelEvent`] to `events` and returns the messages
/// produced during the turn (assistant text + tool traffic), with ids
/// and task/context attribution already set. Returns
/// [`EngineError::Canceled`] if the token fires mid-turn.
///
/// Tool failures are not fatal: the error is serialized into the tool
/// result so the model can adapt.
pub async fn run_streaming_turn(
    model: Arc<dyn ModelClient>,
    mut request: ChatRequest,
    capabilities: CapabilitySet,
    cancel: CancellationToken,
    events: mpsc::UnboundedSender<ModelEvent>,
    task_id: String,
    context_id: String,
) -> EngineResult<Vec<Message>> {
    let mut produced: Vec<Message> = Vec::new();

    for step in 0..MAX_STEPS {
        let mut stream = model.stream(request.clone(), cancel.clone()).await?;

        let mut text = String::new();
        let mut tool_calls: Vec<ToolCallRequest> = Vec::new();

        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(EngineError::canceled(format!("task {}", task_id)));
                }
                event = stream.next() => event,
            };

            let Some(event) = event else { break };
            let event = event?;

            match &event {
                ModelEvent::TextDelta { delta } => text.push_str(delta),
                ModelEvent::ToolCall {
                    tool_call_id,
                    name,
                    arguments,
                } => {
                    tool_calls.push(ToolCallRequest {
                        id: tool_call_id.clone(),
                        name: name.clone(),
                        arguments: arguments.clone(),
                    });
                }
                _ => {}
            }

            // Receiver gone means the subscriber side shut down.
            if events.send(event).is_err() {
                return Err(EngineError::canceled(format!("task {}", task_id)));
            }
        }

        if cancel.is_cancelled() {
            return Err(EngineError::canceled(format!("task {}", task_id)));
        }

        // Record the assistant step as a message.
        let mut parts: Vec<Part> = Vec::new();
        if !text.is_empty() {
            parts.push(Part::text(text.clone()));
        }
        for call in &tool_calls {
            parts.push(Part::function_call(
                call.id.clone(),
                call.name.clone(),
                call.arguments.clone(),
            ));
        }
        if !parts.is_empty() {
            let message = step_message(Role::Agent, parts, &task_id, &context_id);
            request.messages.push(message.clone());
            produced.push(message);
        }

        if tool_calls.is_empty() {
            debug!(task_id = %task_id, step, "Turn finished — no tool calls");
            return Ok(produced);
        }

        // Invoke each completed tool call and feed the results back.
        let mut response_parts: Vec<Part> = Vec::new();
        for call in &tool_calls {
            let result = invoke_tool(&capabilities, call, &cancel).await;

            if events
                .send(ModelEvent::ToolCompleted {
                    tool_call_id: call.id.clone(),
                    name: call.name.clone(),
                    result: result.clone(),
                })
                .is_err()
            {
                return Err(EngineError::canceled(format!("task {}", task_id)));
            }

            response_parts.push(Part::function_response(call.id.clone(), result));
        }

        let response_message = step_message(Role::Agent, response_parts, &task_id, &context_id);
        request.messages.push(response_message.clone());
        produced.push(response_message);

        // A forced tool choice is satisfied by this step; looping would
        // force the same call again.
        if matches!(request.tool_choice, crate::model::ToolChoice::Required(_)) {
            debug!(task_id = %task_id, step, "Forced tool call satisfied");
            return Ok(produced);
        }
    }

    warn!(task_id = %task_id, max_steps = MAX_STEPS, "Turn hit the step bound");
    Ok(produced)
}

/// Invoke a single tool call, mapping every failure into a result value
/// the model can read.
async fn invoke_tool(
    capabilities: &CapabilitySet,
    call: &ToolCallRequest,
    cancel: &CancellationToken,
) -> serde_json::Value {
    // The artifact tool is answered by the engine itself; its payload
    // already flowed to subscribers as input deltas.
    if call.name == CREATE_ARTIFACT_TOOL {
        return json!({"ok": true});
    }

    match capabilities.get(&call.name) {
        Some(capability) => match capability.invoke(call.arguments.clone(), cancel).await {
            Ok(value) => value,
            Err(e) => {
                warn!(tool = %call.name, error = %e, "Tool invocation failed");
                json!({"error": e.to_string()})
            }
        },
        None => {
            warn!(tool = %call.name, "Model called an unknown tool");
            json!({"error": format!("unknown tool: {}", call.name)})
        }
    }
}

fn step_message(role: Role, parts: Vec<Part>, task_id: &str, context_id: &str) -> Message {
    Message {
        message_id: Uuid::new_v4().to_string(),
        role,
        kind: "message".to_string(),
        parts,
        context_id: Some(context_id.to_string()),
        task_id: Some(task_id.to_string()),
        metadata: None,
    }
}
