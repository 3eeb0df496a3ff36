//! Repository behavior: append-only message upserts, the
//! status-message filter, cascade deletes, and artifact upserts.

use a2a_engine::persistence::Database;
use a2a_engine::types::{FileContent, FileWithBytes, Message, Part, Role};
use a2a_engine::utils::{new_status_message, new_text_artifact};
use serde_json::json;

async fn db_with_context(context_id: &str) -> Database {
    let db = Database::in_memory().await.unwrap();
    db.contexts().ensure(context_id).await.unwrap();
    db
}

fn context_message(id: &str, context_id: &str, text: &str) -> Message {
    let mut message = Message::user(id, text);
    message.context_id = Some(context_id.to_string());
    message
}

#[tokio::test]
async fn context_ensure_is_idempotent() {
    let db = Database::in_memory().await.unwrap();

    let first = db.contexts().ensure("ctx-1").await.unwrap();
    let second = db.contexts().ensure("ctx-1").await.unwrap();
    assert_eq!(first.id, second.id);
    assert_eq!(first.created_at, second.created_at);

    db.contexts().set_title("ctx-1", "My chat").await.unwrap();
    let titled = db.contexts().get("ctx-1").await.unwrap().unwrap();
    assert_eq!(titled.title.as_deref(), Some("My chat"));
}

#[tokio::test]
async fn message_upsert_rewrites_only_unset_fields() {
    let db = db_with_context("ctx-1").await;

    // First write: no task id, no metadata.
    let message = context_message("m1", "ctx-1", "hello");
    db.messages().upsert(&message).await.unwrap();

    // Second write fills in the task id.
    let mut update = message.clone();
    update.task_id = Some("task-1".to_string());
    update.metadata = Some(json!({"seen": true}));
    db.messages().upsert(&update).await.unwrap();

    let stored = db.messages().get("m1").await.unwrap().unwrap();
    assert_eq!(stored.task_id.as_deref(), Some("task-1"));
    assert_eq!(stored.metadata.unwrap()["seen"], true);

    // Third write cannot overwrite what is already set.
    let mut clobber = message.clone();
    clobber.task_id = Some("task-2".to_string());
    clobber.metadata = Some(json!({"seen": false}));
    db.messages().upsert(&clobber).await.unwrap();

    let stored = db.messages().get("m1").await.unwrap().unwrap();
    assert_eq!(stored.task_id.as_deref(), Some("task-1"));
    assert_eq!(stored.metadata.unwrap()["seen"], true);
}

#[tokio::test]
async fn status_messages_filtered_from_context_view() {
    let db = db_with_context("ctx-1").await;

    db.messages()
        .upsert(&context_message("m1", "ctx-1", "question"))
        .await
        .unwrap();
    db.messages()
        .upsert(&new_status_message("Reading files", "ctx-1", "task-1"))
        .await
        .unwrap();
    db.messages()
        .upsert(&context_message("m2", "ctx-1", "answer"))
        .await
        .unwrap();

    let prompt_view = db.messages().list_by_context("ctx-1", false).await.unwrap();
    assert_eq!(prompt_view.len(), 2);
    assert!(prompt_view.iter().all(|m| !m.is_status_message()));

    let full_view = db.messages().list_by_context("ctx-1", true).await.unwrap();
    assert_eq!(full_view.len(), 3);

    // Task view keeps the narration.
    let task_view = db.messages().list_by_task("task-1").await.unwrap();
    assert_eq!(task_view.len(), 1);
    assert!(task_view[0].is_status_message());
}

#[tokio::test]
async fn recent_status_messages_newest_first_with_limit() {
    let db = db_with_context("ctx-1").await;

    for i in 0..7 {
        db.messages()
            .upsert(&new_status_message(
                format!("status {}", i),
                "ctx-1",
                "task-1",
            ))
            .await
            .unwrap();
    }

    let recents = db
        .messages()
        .recent_status_messages("task-1", 5)
        .await
        .unwrap();
    assert_eq!(recents.len(), 5);
    // Newest first: the last inserted status leads.
    assert_eq!(
        a2a_engine::utils::get_message_text(&recents[0], ""),
        "status 6"
    );
    assert_eq!(
        a2a_engine::utils::get_message_text(&recents[4], ""),
        "status 2"
    );
}

#[tokio::test]
async fn search_skips_status_messages() {
    let db = db_with_context("ctx-1").await;

    db.messages()
        .upsert(&context_message("m1", "ctx-1", "the blue whale"))
        .await
        .unwrap();
    db.messages()
        .upsert(&new_status_message("thinking about whales", "ctx-1", "task-1"))
        .await
        .unwrap();

    let hits = db.messages().search_text("whale", 10).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].message_id, "m1");
}

#[tokio::test]
async fn context_delete_cascades() {
    let db = db_with_context("ctx-1").await;

    db.messages()
        .upsert(&context_message("m1", "ctx-1", "hello"))
        .await
        .unwrap();

    let task = a2a_engine::types::Task {
        id: "task-1".to_string(),
        context_id: "ctx-1".to_string(),
        kind: "task".to_string(),
        status: a2a_engine::types::TaskStatus::now(a2a_engine::types::TaskState::Submitted),
        artifacts: None,
        history: None,
        metadata: None,
    };
    db.tasks().insert(&task).await.unwrap();
    db.artifacts()
        .upsert("task-1", &new_text_artifact("o.txt", "content", None::<String>))
        .await
        .unwrap();

    db.contexts().delete("ctx-1").await.unwrap();

    assert!(db.messages().get("m1").await.unwrap().is_none());
    assert!(db.tasks().get("task-1").await.unwrap().is_none());
    assert!(db
        .artifacts()
        .list_by_task("task-1")
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn message_roundtrip_preserves_tool_parts() {
    let db = db_with_context("ctx-1").await;

    let message = Message {
        message_id: "m1".to_string(),
        role: Role::Agent,
        kind: "message".to_string(),
        parts: vec![
            Part::text("running the tool"),
            Part::function_call("c1", "exec", json!({"command": "ls"})),
            Part::function_response("c1", json!({"stdout": "Cargo.toml\n"})),
            Part::File {
                file: FileContent::Bytes(FileWithBytes {
                    bytes: "SGVsbG8=".to_string(),
                    mime_type: Some("text/plain".to_string()),
                    name: Some("listing.txt".to_string()),
                }),
                metadata: None,
            },
        ],
        context_id: Some("ctx-1".to_string()),
        task_id: None,
        metadata: None,
    };
    db.messages().upsert(&message).await.unwrap();

    let stored = db.messages().get("m1").await.unwrap().unwrap();
    assert_eq!(stored.parts, message.parts);
    assert_eq!(stored.role, Role::Agent);
}

#[tokio::test]
async fn task_status_roundtrip() {
    let db = db_with_context("ctx-1").await;

    let task = a2a_engine::types::Task {
        id: "task-1".to_string(),
        context_id: "ctx-1".to_string(),
        kind: "task".to_string(),
        status: a2a_engine::types::TaskStatus::now(a2a_engine::types::TaskState::Submitted),
        artifacts: None,
        history: None,
        metadata: None,
    };
    db.tasks().insert(&task).await.unwrap();

    let mut failed = a2a_engine::types::TaskStatus::now(a2a_engine::types::TaskState::Failed);
    failed.message = Some(Message::agent("m-err", "provider gave up"));
    db.tasks().update_status("task-1", &failed).await.unwrap();

    let stored = db.tasks().get("task-1").await.unwrap().unwrap();
    assert_eq!(stored.status.state, a2a_engine::types::TaskState::Failed);
    assert_eq!(
        stored.status.message.unwrap().message_id,
        "m-err".to_string()
    );
}
