//! Embedded relational store.
//!
//! A single SQLite database file holds the four tables of the engine's
//! durable state: contexts, messages, tasks, and artifacts. The schema
//! is applied idempotently at open. All access goes through the
//! repositories in [`repositories`].

pub mod repositories;

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use tracing::debug;

use crate::error::EngineResult;
use repositories::{
    ArtifactRepository, ContextRepository, MessageRepository, TaskRepository,
};

/// Idempotent schema. `json_extract` powers the narrator's
/// status-message lookup without a dedicated column.
const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS contexts (
    id          TEXT PRIMARY KEY,
    title       TEXT,
    metadata    TEXT,
    created_at  INTEGER NOT NULL,
    updated_at  INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS messages (
    id          TEXT PRIMARY KEY,
    context_id  TEXT NOT NULL REFERENCES contexts(id) ON DELETE CASCADE,
    task_id     TEXT,
    role        TEXT NOT NULL,
    parts       TEXT NOT NULL,
    metadata    TEXT,
    created_at  INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_messages_context ON messages(context_id);
CREATE INDEX IF NOT EXISTS idx_messages_task ON messages(task_id);
CREATE INDEX IF NOT EXISTS idx_messages_task_kind
    ON messages(task_id, json_extract(metadata, '$.kind'));

CREATE TABLE IF NOT EXISTS tasks (
    id          TEXT PRIMARY KEY,
    context_id  TEXT NOT NULL REFERENCES contexts(id) ON DELETE CASCADE,
    status      TEXT NOT NULL,
    created_at  INTEGER NOT NULL,
    updated_at  INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_tasks_context ON tasks(context_id);

CREATE TABLE IF NOT EXISTS artifacts (
    task_id     TEXT NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
    artifact_id TEXT NOT NULL,
    name        TEXT,
    description TEXT,
    parts       TEXT NOT NULL,
    metadata    TEXT,
    created_at  INTEGER NOT NULL,
    PRIMARY KEY (task_id, artifact_id)
);
CREATE INDEX IF NOT EXISTS idx_artifacts_task ON artifacts(task_id);
"#;

/// Handle to the engine's SQLite database.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (creating if missing) the database file at `path`.
    pub async fn open(path: impl AsRef<Path>) -> EngineResult<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5))
            .foreign_keys(true);
        Self::open_with(options, 5).await
    }

    /// Open an in-memory database. Intended for tests; the pool is
    /// pinned to a single connection so every handle sees the same data.
    pub async fn in_memory() -> EngineResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(crate::error::EngineError::from)?
            .foreign_keys(true);
        Self::open_with(options, 1).await
    }

    async fn open_with(options: SqliteConnectOptions, max_connections: u32) -> EngineResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        sqlx::raw_sql(SCHEMA).execute(&pool).await?;
        debug!("Database opened, schema applied");

        Ok(Self { pool })
    }

    /// The underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Repository for conversation contexts.
    pub fn contexts(&self) -> ContextRepository {
        ContextRepository::new(self.pool.clone())
    }

    /// Repository for messages.
    pub fn messages(&self) -> MessageRepository {
        MessageRepository::new(self.pool.clone())
    }

    /// Repository for tasks.
    pub fn tasks(&self) -> TaskRepository {
        TaskRepository::new(self.pool.clone())
    }

    /// Repository for artifacts.
    pub fn artifacts(&self) -> ArtifactRepository {
        ArtifactRepository::new(self.pool.clone())
    }
}
