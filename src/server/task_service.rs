//! Task lifecycle service.
//!
//! Owns task CRUD, the state-transition guard, and the process-wide
//! abort-signal registry. Transitions are serialized per task id and
//! terminal states are sticky: once a task is `completed`, `failed`, or
//! `canceled`, any further transition is rejected without touching the
//! persisted row.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::persistence::Database;
use crate::types::{Artifact, Message, Task, TaskState, TaskStatus};

/// Task CRUD, transition guard, and abort registry.
pub struct TaskService {
    db: Database,
    /// Abort handles for live (`submitted`/`working`) tasks.
    aborts: Mutex<HashMap<String, CancellationToken>>,
    /// Per-task transition locks.
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl TaskService {
    /// Create the service over the given database.
    pub fn new(db: Database) -> Self {
        Self {
            db,
            aborts: Mutex::new(HashMap::new()),
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Create a task in `submitted` state and attach the initial
    /// message to it.
    pub async fn create(&self, context_id: &str, initial_message: &Message) -> EngineResult<Task> {
        let task = Task {
            id: Uuid::new_v4().to_string(),
            context_id: context_id.to_string(),
            kind: "task".to_string(),
            status: TaskStatus::now(TaskState::Submitted),
            artifacts: None,
            history: None,
            metadata: None,
        };
        self.db.tasks().insert(&task).await?;

        let mut message = initial_message.clone();
        message.task_id = Some(task.id.clone());
        message.context_id = Some(context_id.to_string());
        self.db.messages().upsert(&message).await?;

        debug!(task_id = %task.id, context_id = %context_id, "Task created");
        Ok(task)
    }

    /// Transition a task to `next`, optionally embedding a message in
    /// the new status.
    ///
    /// Serialized per task id. Returns `InvalidState` if the task is
    /// already terminal; the persisted status is left untouched.
    pub async fn transition(
        &self,
        task_id: &str,
        next: TaskState,
        message: Option<Message>,
    ) -> EngineResult<TaskStatus> {
        let lock = self.transition_lock(task_id).await;
        let _guard = lock.lock().await;

        let current = self
            .db
            .tasks()
            .get(task_id)
            .await?
            .ok_or_else(|| EngineError::not_found(format!("task {}", task_id)))?;

        if current.status.state.is_terminal() {
            warn!(
                task_id = %task_id,
                current = %current.status.state,
                requested = %next,
                "Rejected transition on terminal task"
            );
            return Err(EngineError::InvalidState {
                message: format!(
                    "task {} is {} — cannot transition to {}",
                    task_id, current.status.state, next
                ),
                data: Some(serde_json::json!({"state": current.status.state.to_string()})),
            });
        }

        let mut status = TaskStatus::now(next);
        status.message = message;
        self.db.tasks().update_status(task_id, &status).await?;
        self.db.contexts().touch(&current.context_id).await?;

        if next.is_terminal() {
            self.unregister(task_id).await;
        }

        debug!(task_id = %task_id, state = %next, "Task transitioned");
        Ok(status)
    }

    /// Append a message to a task's history.
    pub async fn attach_message(&self, task_id: &str, message: &Message) -> EngineResult<()> {
        let task = self
            .db
            .tasks()
            .get(task_id)
            .await?
            .ok_or_else(|| EngineError::not_found(format!("task {}", task_id)))?;

        let mut message = message.clone();
        message.task_id = Some(task_id.to_string());
        message.context_id = Some(task.context_id.clone());
        self.db.messages().upsert(&message).await
    }

    /// Persist an artifact for a task. Idempotent on
    /// `(task_id, artifact_id)`; a re-emission with new content wins.
    pub async fn create_artifact(&self, task_id: &str, artifact: &Artifact) -> EngineResult<()> {
        self.db.artifacts().upsert(task_id, artifact).await
    }

    /// Full task snapshot: status, history (narrations included, ordered
    /// by timestamp with insertion order breaking ties), and artifacts.
    /// `history_length` keeps only the most recent N messages.
    pub async fn get_task(
        &self,
        task_id: &str,
        history_length: Option<usize>,
    ) -> EngineResult<Task> {
        let mut task = self
            .db
            .tasks()
            .get(task_id)
            .await?
            .ok_or_else(|| EngineError::not_found(format!("task {}", task_id)))?;

        let mut history = self.db.messages().list_by_task(task_id).await?;
        if let Some(max) = history_length {
            if max > 0 && history.len() > max {
                let start = history.len() - max;
                history = history.split_off(start);
            }
        }
        task.history = Some(history);

        let artifacts = self.db.artifacts().list_by_task(task_id).await?;
        task.artifacts = Some(artifacts);

        Ok(task)
    }

    // ---- Abort registry ----

    /// Register a fresh abort handle for a task. Replaces any previous
    /// handle for the same id.
    pub async fn register_abort(&self, task_id: &str) -> CancellationToken {
        let token = CancellationToken::new();
        let mut aborts = self.aborts.lock().await;
        aborts.insert(task_id.to_string(), token.clone());
        token
    }

    /// Fire a task's abort handle. Returns whether a handle existed.
    pub async fn abort(&self, task_id: &str) -> bool {
        let aborts = self.aborts.lock().await;
        match aborts.get(task_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Remove a task's abort handle. Called at terminal transition.
    pub async fn unregister(&self, task_id: &str) {
        let mut aborts = self.aborts.lock().await;
        aborts.remove(task_id);
    }

    /// Whether a task currently has a registered abort handle.
    pub async fn has_abort(&self, task_id: &str) -> bool {
        let aborts = self.aborts.lock().await;
        aborts.contains_key(task_id)
    }

    async fn transition_lock(&self, task_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(task_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}
