//! Event orchestrator — the single serialized emission point.
//!
//! Consumes the model-event channel and interleaves, in causal order,
//! progressive artifact updates with the narrator's queued status
//! updates. Serializing all emission through one consumer removes any
//! ordering race between the narrator's asynchronous writes and the
//! artifact deltas.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::EngineResult;
use crate::model::ModelEvent;
use crate::types::{Artifact, StreamResponse, TaskStatusUpdateEvent};
use crate::utils::CREATE_ARTIFACT_TOOL;

use super::artifact_stream::ArtifactPipeline;
use super::event_queue::EventQueue;

/// Run the orchestrator until the model-event channel closes.
///
/// When `expect_artifacts` is set, artifact tool events flow through
/// `pipeline` and each resulting `artifact-update` is emitted; other
/// events are consumed solely to drive the status drain. After every
/// model event the narrator queue is drained FIFO, and once the stream
/// ends a final drain runs.
///
/// On completion of an artifact tool call the narrator is stopped and
/// the finalized artifact is returned; per request at most one
/// finalized artifact is recorded (the last one wins on re-emission).
pub async fn run(
    mut events: mpsc::UnboundedReceiver<ModelEvent>,
    pipeline: &mut ArtifactPipeline,
    status_rx: &mut mpsc::UnboundedReceiver<TaskStatusUpdateEvent>,
    queue: &EventQueue,
    narrator_stop: &CancellationToken,
    expect_artifacts: bool,
) -> EngineResult<Option<Artifact>> {
    let mut finalized: Option<Artifact> = None;

    while let Some(event) = events.recv().await {
        if expect_artifacts {
            match &event {
                ModelEvent::ToolInputStart { tool_call_id, name }
                    if name.as_str() == CREATE_ARTIFACT_TOOL =>
                {
                    pipeline.handle_start(tool_call_id);
                }
                ModelEvent::ToolCall {
                    tool_call_id,
                    name,
                    arguments,
                } if name.as_str() == CREATE_ARTIFACT_TOOL => {
                    pipeline.handle_tool_call(tool_call_id, arguments);
                }
                ModelEvent::ToolInputDelta {
                    tool_call_id,
                    delta,
                    last,
                } => {
                    if let Some(update) = pipeline.handle_delta(tool_call_id, delta, *last) {
                        queue.publish(StreamResponse::ArtifactUpdate(update));
                    }
                }
                ModelEvent::ToolCompleted { tool_call_id, name, .. }
                    if name.as_str() == CREATE_ARTIFACT_TOOL =>
                {
                    // The channel delivered all of this call's deltas
                    // before the completion marker, so the buffer is
                    // complete. Stop the narrator: no narrations after
                    // the artifact, queued ones still flush below.
                    narrator_stop.cancel();
                    if let Some(artifact) = pipeline.finalize(tool_call_id) {
                        debug!(artifact_id = %artifact.artifact_id, "Artifact detected");
                        finalized = Some(artifact);
                    }
                }
                _ => {}
            }
        }

        drain_status(status_rx, queue);
    }

    // Final drain after the stream ends.
    drain_status(status_rx, queue);

    Ok(finalized)
}

/// Flush every queued narrator status update, FIFO.
fn drain_status(
    status_rx: &mut mpsc::UnboundedReceiver<TaskStatusUpdateEvent>,
    queue: &EventQueue,
) {
    while let Ok(update) = status_rx.try_recv() {
        queue.publish(StreamResponse::StatusUpdate(update));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{TaskState, TaskStatus};
    use serde_json::json;

    fn status_event(task_id: &str) -> TaskStatusUpdateEvent {
        TaskStatusUpdateEvent {
            task_id: task_id.to_string(),
            context_id: "c1".to_string(),
            kind: "status-update".to_string(),
            status: TaskStatus::now(TaskState::Working),
            r#final: false,
            metadata: None,
        }
    }

    #[tokio::test]
    async fn artifact_deltas_become_update_events() {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (_status_tx, mut status_rx) = mpsc::unbounded_channel();
        let queue = EventQueue::with_default_capacity();
        let mut rx = queue.subscribe();
        let mut pipeline = ArtifactPipeline::new("t1", "c1");
        let stop = CancellationToken::new();

        events_tx
            .send(ModelEvent::ToolInputStart {
                tool_call_id: "call-1".to_string(),
                name: CREATE_ARTIFACT_TOOL.to_string(),
            })
            .unwrap();
        events_tx
            .send(ModelEvent::ToolCall {
                tool_call_id: "call-1".to_string(),
                name: CREATE_ARTIFACT_TOOL.to_string(),
                arguments: json!({"name": "out.txt"}),
            })
            .unwrap();
        events_tx
            .send(ModelEvent::ToolInputDelta {
                tool_call_id: "call-1".to_string(),
                delta: "hello".to_string(),
                last: true,
            })
            .unwrap();
        events_tx
            .send(ModelEvent::ToolCompleted {
                tool_call_id: "call-1".to_string(),
                name: CREATE_ARTIFACT_TOOL.to_string(),
                result: json!({"ok": true}),
            })
            .unwrap();
        drop(events_tx);

        let finalized = run(events_rx, &mut pipeline, &mut status_rx, &queue, &stop, true)
            .await
            .unwrap();

        let artifact = finalized.expect("artifact should finalize");
        assert_eq!(artifact.name.as_deref(), Some("out.txt"));
        assert!(stop.is_cancelled(), "narrator must stop on artifact");

        match rx.try_recv().unwrap() {
            StreamResponse::ArtifactUpdate(update) => {
                assert_eq!(update.last_chunk, Some(true));
            }
            other => panic!("expected artifact-update, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn queued_statuses_flush_in_fifo_order() {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (status_tx, mut status_rx) = mpsc::unbounded_channel();
        let queue = EventQueue::with_default_capacity();
        let mut rx = queue.subscribe();
        let mut pipeline = ArtifactPipeline::new("t1", "c1");
        let stop = CancellationToken::new();

        status_tx.send(status_event("first")).unwrap();
        status_tx.send(status_event("second")).unwrap();
        // Text deltas are consumed silently but still drive the drain.
        events_tx
            .send(ModelEvent::TextDelta {
                delta: "thinking".to_string(),
            })
            .unwrap();
        drop(events_tx);

        run(events_rx, &mut pipeline, &mut status_rx, &queue, &stop, false)
            .await
            .unwrap();

        match rx.try_recv().unwrap() {
            StreamResponse::StatusUpdate(update) => assert_eq!(update.task_id, "first"),
            other => panic!("expected status-update, got {:?}", other),
        }
        match rx.try_recv().unwrap() {
            StreamResponse::StatusUpdate(update) => assert_eq!(update.task_id, "second"),
            other => panic!("expected status-update, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn final_drain_flushes_late_statuses() {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (status_tx, mut status_rx) = mpsc::unbounded_channel();
        let queue = EventQueue::with_default_capacity();
        let mut rx = queue.subscribe();
        let mut pipeline = ArtifactPipeline::new("t1", "c1");
        let stop = CancellationToken::new();

        drop(events_tx);
        status_tx.send(status_event("late")).unwrap();

        run(events_rx, &mut pipeline, &mut status_rx, &queue, &stop, true)
            .await
            .unwrap();

        match rx.try_recv().unwrap() {
            StreamResponse::StatusUpdate(update) => assert_eq!(update.task_id, "late"),
            other => panic!("expected status-update, got {:?}", other),
        }
    }
}
