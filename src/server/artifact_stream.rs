//! Artifact pipeline — turns streamed artifact-tool input into
//! progressive `artifact-update` events and a finalized artifact.
//!
//! The model may interleave input deltas for several concurrent tool
//! calls, so in-flight buffers are keyed by `tool_call_id`. Only the
//! artifact tool feeds this pipeline; it is the sole producer of
//! `artifact-update` events in the engine.

use std::collections::HashMap;

use serde_json::json;
use tracing::debug;

use crate::types::{Artifact, Part, TaskArtifactUpdateEvent};
use crate::utils::{guess_mime_type, iso_timestamp};

/// In-flight buffer for one artifact tool call.
#[derive(Debug, Clone, Default)]
pub struct ArtifactStreamState {
    /// Artifact id assigned when the call started.
    pub artifact_id: String,
    /// Producer-chosen name, filled in when arguments parse.
    pub name: String,
    /// Description, filled in when arguments parse.
    pub description: String,
    /// Optional producer-supplied mime type.
    pub mime_type: Option<String>,
    /// Content accumulated from input deltas.
    pub content: String,
    /// Whether the terminal delta has been seen.
    pub last_chunk: bool,
}

/// Per-request artifact stream machinery.
pub struct ArtifactPipeline {
    task_id: String,
    context_id: String,
    states: HashMap<String, ArtifactStreamState>,
}

impl ArtifactPipeline {
    /// Create the pipeline for one task.
    pub fn new(task_id: impl Into<String>, context_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            context_id: context_id.into(),
            states: HashMap::new(),
        }
    }

    /// The model began an artifact tool call: allocate a buffer with a
    /// fresh artifact id.
    pub fn handle_start(&mut self, tool_call_id: &str) {
        let state = ArtifactStreamState {
            artifact_id: uuid::Uuid::new_v4().to_string(),
            ..Default::default()
        };
        debug!(
            tool_call_id = %tool_call_id,
            artifact_id = %state.artifact_id,
            "Artifact stream opened"
        );
        self.states.insert(tool_call_id.to_string(), state);
    }

    /// The call's arguments are fully parsed: record name, description,
    /// and mime type.
    pub fn handle_tool_call(&mut self, tool_call_id: &str, args: &serde_json::Value) {
        let Some(state) = self.states.get_mut(tool_call_id) else {
            return;
        };
        if let Some(name) = args.get("name").and_then(|v| v.as_str()) {
            state.name = name.to_string();
        }
        if let Some(description) = args.get("description").and_then(|v| v.as_str()) {
            state.description = description.to_string();
        }
        if let Some(mime) = args.get("mimeType").and_then(|v| v.as_str()) {
            state.mime_type = Some(mime.to_string());
        }
    }

    /// Append a content delta and produce the progressive update event.
    ///
    /// Returns `None` for deltas of unknown calls (never started).
    pub fn handle_delta(
        &mut self,
        tool_call_id: &str,
        delta: &str,
        last: bool,
    ) -> Option<TaskArtifactUpdateEvent> {
        let state = self.states.get_mut(tool_call_id)?;
        state.content.push_str(delta);
        if last {
            state.last_chunk = true;
        }

        let snapshot = snapshot_artifact(state);
        Some(TaskArtifactUpdateEvent {
            task_id: self.task_id.clone(),
            context_id: self.context_id.clone(),
            kind: "artifact-update".to_string(),
            artifact: snapshot,
            last_chunk: Some(last),
            metadata: None,
        })
    }

    /// Finalize the call's buffer into a persistable artifact:
    /// normalize metadata (mime guessed from content when the producer
    /// supplied none, ISO-8601 timestamp).
    pub fn finalize(&mut self, tool_call_id: &str) -> Option<Artifact> {
        let state = self.states.get_mut(tool_call_id)?;
        state.last_chunk = true;

        let mime = state
            .mime_type
            .clone()
            .unwrap_or_else(|| guess_mime_type(&state.content).to_string());

        let mut artifact = snapshot_artifact(state);
        artifact.metadata = Some(json!({
            "mimeType": mime,
            "createdAt": iso_timestamp(),
        }));

        debug!(
            tool_call_id = %tool_call_id,
            artifact_id = %artifact.artifact_id,
            bytes = state.content.len(),
            "Artifact finalized"
        );
        Some(artifact)
    }

    /// Read access to an in-flight buffer (tests and diagnostics).
    pub fn state(&self, tool_call_id: &str) -> Option<&ArtifactStreamState> {
        self.states.get(tool_call_id)
    }
}

fn snapshot_artifact(state: &ArtifactStreamState) -> Artifact {
    Artifact {
        artifact_id: state.artifact_id.clone(),
        name: (!state.name.is_empty()).then(|| state.name.clone()),
        description: (!state.description.is_empty()).then(|| state.description.clone()),
        parts: vec![Part::text(state.content.clone())],
        metadata: None,
    }
}
