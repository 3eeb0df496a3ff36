//! Task service: lifecycle transitions, sticky terminal states, the
//! abort registry, and idempotent artifact persistence.

use a2a_engine::persistence::Database;
use a2a_engine::server::TaskService;
use a2a_engine::types::{Message, TaskState};
use a2a_engine::utils::{get_artifact_text, new_text_artifact};

async fn service() -> (TaskService, Database) {
    let db = Database::in_memory().await.unwrap();
    (TaskService::new(db.clone()), db)
}

async fn make_task(service: &TaskService, db: &Database) -> String {
    db.contexts().ensure("ctx-1").await.unwrap();
    let mut message = Message::user("m1", "do the thing");
    message.context_id = Some("ctx-1".to_string());
    let task = service.create("ctx-1", &message).await.unwrap();
    task.id
}

#[tokio::test]
async fn create_starts_submitted_with_message_attached() {
    let (service, db) = service().await;
    let task_id = make_task(&service, &db).await;

    let task = service.get_task(&task_id, None).await.unwrap();
    assert_eq!(task.status.state, TaskState::Submitted);

    let history = task.history.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].task_id.as_deref(), Some(task_id.as_str()));
    assert_eq!(history[0].context_id.as_deref(), Some("ctx-1"));
}

#[tokio::test]
async fn lifecycle_transitions_and_sticky_terminal() {
    let (service, db) = service().await;
    let task_id = make_task(&service, &db).await;

    service
        .transition(&task_id, TaskState::Working, None)
        .await
        .unwrap();
    service
        .transition(&task_id, TaskState::Completed, None)
        .await
        .unwrap();

    // Every further transition is rejected and the row is untouched.
    for next in [
        TaskState::Working,
        TaskState::Failed,
        TaskState::Canceled,
        TaskState::InputRequired,
    ] {
        let result = service.transition(&task_id, next, None).await;
        assert!(
            matches!(result, Err(a2a_engine::EngineError::InvalidState { .. })),
            "transition to {} must be rejected",
            next
        );
    }

    let task = service.get_task(&task_id, None).await.unwrap();
    assert_eq!(task.status.state, TaskState::Completed);
}

#[tokio::test]
async fn input_required_is_not_terminal() {
    let (service, db) = service().await;
    let task_id = make_task(&service, &db).await;

    service
        .transition(&task_id, TaskState::Working, None)
        .await
        .unwrap();
    service
        .transition(&task_id, TaskState::InputRequired, None)
        .await
        .unwrap();
    // Resuming into working is legal.
    service
        .transition(&task_id, TaskState::Working, None)
        .await
        .unwrap();
}

#[tokio::test]
async fn transition_unknown_task_is_not_found() {
    let (service, _db) = service().await;
    let result = service
        .transition("missing", TaskState::Working, None)
        .await;
    assert!(matches!(
        result,
        Err(a2a_engine::EngineError::NotFound { .. })
    ));
}

#[tokio::test]
async fn artifact_persistence_is_idempotent() {
    let (service, db) = service().await;
    let task_id = make_task(&service, &db).await;

    let artifact = new_text_artifact("out.txt", "final content", None::<String>);
    service.create_artifact(&task_id, &artifact).await.unwrap();
    // Second persist of the same id is a no-op.
    service.create_artifact(&task_id, &artifact).await.unwrap();

    let task = service.get_task(&task_id, None).await.unwrap();
    let artifacts = task.artifacts.unwrap();
    assert_eq!(artifacts.len(), 1);
    assert_eq!(get_artifact_text(&artifacts[0], ""), "final content");
}

#[tokio::test]
async fn artifact_reemission_replaces_content() {
    let (service, db) = service().await;
    let task_id = make_task(&service, &db).await;

    let mut artifact = new_text_artifact("out.txt", "draft", None::<String>);
    service.create_artifact(&task_id, &artifact).await.unwrap();

    artifact.parts = vec![a2a_engine::types::Part::text("revised")];
    service.create_artifact(&task_id, &artifact).await.unwrap();

    let task = service.get_task(&task_id, None).await.unwrap();
    let artifacts = task.artifacts.unwrap();
    assert_eq!(artifacts.len(), 1);
    assert_eq!(get_artifact_text(&artifacts[0], ""), "revised");
}

#[tokio::test]
async fn abort_registry_lifecycle() {
    let (service, db) = service().await;
    let task_id = make_task(&service, &db).await;

    let token = service.register_abort(&task_id).await;
    assert!(service.has_abort(&task_id).await);
    assert!(!token.is_cancelled());

    assert!(service.abort(&task_id).await);
    assert!(token.is_cancelled());

    // Firing an unknown handle reports absence.
    assert!(!service.abort("missing").await);
}

#[tokio::test]
async fn terminal_transition_unregisters_abort() {
    let (service, db) = service().await;
    let task_id = make_task(&service, &db).await;

    service.register_abort(&task_id).await;
    service
        .transition(&task_id, TaskState::Working, None)
        .await
        .unwrap();
    assert!(service.has_abort(&task_id).await);

    service
        .transition(&task_id, TaskState::Canceled, None)
        .await
        .unwrap();
    assert!(!service.has_abort(&task_id).await);
}

#[tokio::test]
async fn history_ordering_follows_insertion() {
    let (service, db) = service().await;
    let task_id = make_task(&service, &db).await;

    // Same-second timestamps: insertion order must break the tie.
    for i in 0..5 {
        let message = Message::agent(format!("step-{}", i), format!("step {}", i));
        service.attach_message(&task_id, &message).await.unwrap();
    }

    let task = service.get_task(&task_id, None).await.unwrap();
    let history = task.history.unwrap();
    let ids: Vec<&str> = history.iter().map(|m| m.message_id.as_str()).collect();
    assert_eq!(ids[0], "m1");
    assert_eq!(
        &ids[1..],
        &["step-0", "step-1", "step-2", "step-3", "step-4"]
    );
}
