//! Helpers for building and reading engine messages.

use crate::types::{Message, Part, Role};
use crate::utils::parts::get_text_parts;
use serde_json::json;
use uuid::Uuid;

fn agent_message(
    text: String,
    context_id: Option<String>,
    task_id: Option<String>,
    metadata: Option<serde_json::Value>,
) -> Message {
    Message {
        message_id: Uuid::new_v4().to_string(),
        role: Role::Agent,
        kind: "message".to_string(),
        parts: vec![Part::text(text)],
        context_id,
        task_id,
        metadata,
    }
}

/// Build an agent message holding one text part, with a generated id.
///
/// # Example
///
/// ```
/// use a2a_engine::utils::new_agent_text_message;
///
/// let message = new_agent_text_message("Hello", None::<String>, None::<String>);
/// assert_eq!(message.role, a2a_engine::types::Role::Agent);
/// ```
pub fn new_agent_text_message(
    text: impl Into<String>,
    context_id: Option<impl Into<String>>,
    task_id: Option<impl Into<String>>,
) -> Message {
    agent_message(
        text.into(),
        context_id.map(Into::into),
        task_id.map(Into::into),
        None,
    )
}

/// Build a narrator status message: agent role, task-scoped, tagged
/// `metadata.kind = "status-message"` so history views and prompt
/// assembly can filter it.
pub fn new_status_message(
    text: impl Into<String>,
    context_id: impl Into<String>,
    task_id: impl Into<String>,
) -> Message {
    agent_message(
        text.into(),
        Some(context_id.into()),
        Some(task_id.into()),
        Some(json!({
            crate::utils::METADATA_KIND_KEY: crate::utils::STATUS_MESSAGE_KIND
        })),
    )
}

/// Join the text content of a message's parts; empty when the message
/// holds no text parts.
pub fn get_message_text(message: &Message, delimiter: &str) -> String {
    get_text_parts(&message.parts).join(delimiter)
}
