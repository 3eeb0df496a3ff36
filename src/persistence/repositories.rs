//! Repositories over the four engine tables.
//!
//! Each repository is a thin, cloneable wrapper around the pool. Rows
//! store parts, metadata, and task status as JSON text; decoding
//! failures surface as `Persistence` errors rather than panics.

use sqlx::sqlite::SqlitePool;
use sqlx::Row;
use tracing::debug;

use crate::error::{EngineError, EngineResult};
use crate::types::{Artifact, Context, Message, Part, Role, Task, TaskStatus};
use crate::utils::{unix_timestamp, STATUS_MESSAGE_KIND};

// ---------------------------------------------------------------------------
// Row decoding helpers
// ---------------------------------------------------------------------------

fn decode_json<T: serde::de::DeserializeOwned>(
    raw: &str,
    what: &str,
) -> EngineResult<T> {
    serde_json::from_str(raw)
        .map_err(|e| EngineError::persistence(format!("corrupt {} column: {}", what, e)))
}

fn decode_opt_json(raw: Option<String>) -> EngineResult<Option<serde_json::Value>> {
    match raw {
        Some(s) => Ok(Some(decode_json(&s, "metadata")?)),
        None => Ok(None),
    }
}

fn decode_role(raw: &str) -> EngineResult<Role> {
    match raw {
        "user" => Ok(Role::User),
        "agent" => Ok(Role::Agent),
        other => Err(EngineError::persistence(format!(
            "corrupt role column: {}",
            other
        ))),
    }
}

fn row_to_message(row: &sqlx::sqlite::SqliteRow) -> EngineResult<Message> {
    let parts_raw: String = row.get("parts");
    let parts: Vec<Part> = decode_json(&parts_raw, "parts")?;
    let role_raw: String = row.get("role");
    Ok(Message {
        message_id: row.get("id"),
        role: decode_role(&role_raw)?,
        kind: "message".to_string(),
        parts,
        context_id: Some(row.get("context_id")),
        task_id: row.get("task_id"),
        metadata: decode_opt_json(row.get("metadata"))?,
    })
}

fn row_to_artifact(row: &sqlx::sqlite::SqliteRow) -> EngineResult<Artifact> {
    let parts_raw: String = row.get("parts");
    Ok(Artifact {
        artifact_id: row.get("artifact_id"),
        name: row.get("name"),
        description: row.get("description"),
        parts: decode_json(&parts_raw, "parts")?,
        metadata: decode_opt_json(row.get("metadata"))?,
    })
}

// ---------------------------------------------------------------------------
// Contexts
// ---------------------------------------------------------------------------

/// Repository for conversation contexts.
#[derive(Debug, Clone)]
pub struct ContextRepository {
    pool: SqlitePool,
}

impl ContextRepository {
    pub(crate) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a context row if it does not exist yet; bump its activity
    /// timestamp either way. Returns the context.
    pub async fn ensure(&self, id: &str) -> EngineResult<Context> {
        let ts = unix_timestamp();
        sqlx::query(
            "INSERT INTO contexts (id, title, metadata, created_at, updated_at)
             VALUES (?, NULL, NULL, ?, ?)
             ON CONFLICT(id) DO UPDATE SET updated_at = excluded.updated_at",
        )
        .bind(id)
        .bind(ts)
        .bind(ts)
        .execute(&self.pool)
        .await?;

        self.get(id)
            .await?
            .ok_or_else(|| EngineError::persistence(format!("failed to ensure context {}", id)))
    }

    /// Look up a context by id.
    pub async fn get(&self, id: &str) -> EngineResult<Option<Context>> {
        let row = sqlx::query(
            "SELECT id, title, metadata, created_at, updated_at FROM contexts WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| {
            Ok(Context {
                id: r.get("id"),
                title: r.get("title"),
                metadata: decode_opt_json(r.get("metadata"))?,
                created_at: r.get("created_at"),
                updated_at: r.get("updated_at"),
            })
        })
        .transpose()
    }

    /// Set the user-supplied title.
    pub async fn set_title(&self, id: &str, title: &str) -> EngineResult<()> {
        sqlx::query("UPDATE contexts SET title = ?, updated_at = ? WHERE id = ?")
            .bind(title)
            .bind(unix_timestamp())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Bump the activity timestamp.
    pub async fn touch(&self, id: &str) -> EngineResult<()> {
        sqlx::query("UPDATE contexts SET updated_at = ? WHERE id = ?")
            .bind(unix_timestamp())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Delete a context. Messages, tasks, and artifacts cascade.
    pub async fn delete(&self, id: &str) -> EngineResult<()> {
        sqlx::query("DELETE FROM contexts WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        debug!(context_id = %id, "Context deleted");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// Repository for messages. Messages are append-only: the upsert
/// rewrites only columns that are still NULL.
#[derive(Debug, Clone)]
pub struct MessageRepository {
    pool: SqlitePool,
}

impl MessageRepository {
    pub(crate) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a message, or fill in unset columns of an existing row
    /// with the same id.
    pub async fn upsert(&self, message: &Message) -> EngineResult<()> {
        let context_id = message.context_id.as_deref().ok_or_else(|| {
            EngineError::invalid_request("message is missing a context id")
        })?;
        let parts = serde_json::to_string(&message.parts)?;
        let metadata = message
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        sqlx::query(
            "INSERT INTO messages (id, context_id, task_id, role, parts, metadata, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                task_id  = COALESCE(messages.task_id,  excluded.task_id),
                metadata = COALESCE(messages.metadata, excluded.metadata)",
        )
        .bind(&message.message_id)
        .bind(context_id)
        .bind(message.task_id.as_deref())
        .bind(message.role.to_string())
        .bind(parts)
        .bind(metadata)
        .bind(unix_timestamp())
        .execute(&self.pool)
        .await?;

        debug!(message_id = %message.message_id, task_id = ?message.task_id, "Message saved");
        Ok(())
    }

    /// Look up a message by id.
    pub async fn get(&self, id: &str) -> EngineResult<Option<Message>> {
        let row = sqlx::query("SELECT * FROM messages WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| row_to_message(&r)).transpose()
    }

    /// Whether a message with this id already exists.
    pub async fn exists(&self, id: &str) -> EngineResult<bool> {
        let row = sqlx::query("SELECT 1 FROM messages WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    /// All messages of a context in chronological order. Status
    /// messages are filtered out unless `include_status` is set — this
    /// is the view used for prompt assembly and the normal history UI.
    pub async fn list_by_context(
        &self,
        context_id: &str,
        include_status: bool,
    ) -> EngineResult<Vec<Message>> {
        let sql = if include_status {
            "SELECT * FROM messages WHERE context_id = ? ORDER BY created_at, rowid"
        } else {
            "SELECT * FROM messages WHERE context_id = ?
             AND COALESCE(json_extract(metadata, '$.kind'), '') != 'status-message'
             ORDER BY created_at, rowid"
        };
        let rows = sqlx::query(sql)
            .bind(context_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_message).collect()
    }

    /// All messages attached to a task (narrations included), ordered
    /// by timestamp with insertion order breaking ties.
    pub async fn list_by_task(&self, task_id: &str) -> EngineResult<Vec<Message>> {
        let rows =
            sqlx::query("SELECT * FROM messages WHERE task_id = ? ORDER BY created_at, rowid")
                .bind(task_id)
                .fetch_all(&self.pool)
                .await?;
        rows.iter().map(row_to_message).collect()
    }

    /// The `limit` most recent status messages of a task, newest first.
    /// Used by the narrator to avoid repeating itself.
    pub async fn recent_status_messages(
        &self,
        task_id: &str,
        limit: usize,
    ) -> EngineResult<Vec<Message>> {
        let rows = sqlx::query(
            "SELECT * FROM messages
             WHERE task_id = ? AND json_extract(metadata, '$.kind') = ?
             ORDER BY created_at DESC, rowid DESC LIMIT ?",
        )
        .bind(task_id)
        .bind(STATUS_MESSAGE_KIND)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_message).collect()
    }

    /// Full-text-ish search over message parts (status messages
    /// excluded). Backs the `search` prebuilt capability.
    pub async fn search_text(&self, query: &str, limit: usize) -> EngineResult<Vec<Message>> {
        let pattern = format!("%{}%", query);
        let rows = sqlx::query(
            "SELECT * FROM messages
             WHERE parts LIKE ?
             AND COALESCE(json_extract(metadata, '$.kind'), '') != 'status-message'
             ORDER BY created_at DESC, rowid DESC LIMIT ?",
        )
        .bind(pattern)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_message).collect()
    }
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

/// Repository for task rows. History and artifacts are stored in their
/// own tables; [`TaskRepository::get`] returns the bare row and the
/// task service assembles the full snapshot.
#[derive(Debug, Clone)]
pub struct TaskRepository {
    pool: SqlitePool,
}

impl TaskRepository {
    pub(crate) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a new task row.
    pub async fn insert(&self, task: &Task) -> EngineResult<()> {
        let status = serde_json::to_string(&task.status)?;
        let ts = unix_timestamp();
        sqlx::query(
            "INSERT INTO tasks (id, context_id, status, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&task.id)
        .bind(&task.context_id)
        .bind(status)
        .bind(ts)
        .bind(ts)
        .execute(&self.pool)
        .await?;
        debug!(task_id = %task.id, "Task inserted");
        Ok(())
    }

    /// Look up a task row (no history, no artifacts).
    pub async fn get(&self, id: &str) -> EngineResult<Option<Task>> {
        let row = sqlx::query(
            "SELECT id, context_id, status, created_at, updated_at FROM tasks WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| {
            let status_raw: String = r.get("status");
            let status: TaskStatus = decode_json(&status_raw, "status")?;
            Ok(Task {
                id: r.get("id"),
                context_id: r.get("context_id"),
                kind: "task".to_string(),
                status,
                artifacts: None,
                history: None,
                metadata: None,
            })
        })
        .transpose()
    }

    /// Replace the status column and bump `updated_at`.
    pub async fn update_status(&self, id: &str, status: &TaskStatus) -> EngineResult<()> {
        let raw = serde_json::to_string(status)?;
        sqlx::query("UPDATE tasks SET status = ?, updated_at = ? WHERE id = ?")
            .bind(raw)
            .bind(unix_timestamp())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

}

// ---------------------------------------------------------------------------
// Artifacts
// ---------------------------------------------------------------------------

/// Repository for artifacts, keyed by `(task_id, artifact_id)`.
#[derive(Debug, Clone)]
pub struct ArtifactRepository {
    pool: SqlitePool,
}

impl ArtifactRepository {
    pub(crate) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert or replace an artifact. Persisting the same id twice is
    /// harmless; a re-emission with new content wins.
    pub async fn upsert(&self, task_id: &str, artifact: &Artifact) -> EngineResult<()> {
        let parts = serde_json::to_string(&artifact.parts)?;
        let metadata = artifact
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        sqlx::query(
            "INSERT INTO artifacts (task_id, artifact_id, name, description, parts, metadata, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(task_id, artifact_id) DO UPDATE SET
                name        = excluded.name,
                description = excluded.description,
                parts       = excluded.parts,
                metadata    = excluded.metadata",
        )
        .bind(task_id)
        .bind(&artifact.artifact_id)
        .bind(artifact.name.as_deref())
        .bind(artifact.description.as_deref())
        .bind(parts)
        .bind(metadata)
        .bind(unix_timestamp())
        .execute(&self.pool)
        .await?;

        debug!(task_id = %task_id, artifact_id = %artifact.artifact_id, "Artifact saved");
        Ok(())
    }

    /// Look up one artifact.
    pub async fn get(&self, task_id: &str, artifact_id: &str) -> EngineResult<Option<Artifact>> {
        let row = sqlx::query("SELECT * FROM artifacts WHERE task_id = ? AND artifact_id = ?")
            .bind(task_id)
            .bind(artifact_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| row_to_artifact(&r)).transpose()
    }

    /// All artifacts of a task in creation order.
    pub async fn list_by_task(&self, task_id: &str) -> EngineResult<Vec<Artifact>> {
        let rows =
            sqlx::query("SELECT * FROM artifacts WHERE task_id = ? ORDER BY created_at, rowid")
                .bind(task_id)
                .fetch_all(&self.pool)
                .await?;
        rows.iter().map(row_to_artifact).collect()
    }
}
