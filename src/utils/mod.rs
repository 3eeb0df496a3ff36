//! Helper functions and well-known constants.

pub mod artifact;
pub mod message;
pub mod parts;

pub use artifact::{get_artifact_text, guess_mime_type, new_text_artifact};
pub use message::{get_message_text, new_agent_text_message, new_status_message};
pub use parts::get_text_parts;

/// Metadata key whose value classifies a message.
pub const METADATA_KIND_KEY: &str = "kind";

/// Metadata kind marking narrator-generated status messages.
pub const STATUS_MESSAGE_KIND: &str = "status-message";

/// Name of the sentinel routing tool: calling it escalates the request
/// into a task.
pub const CREATE_TASK_TOOL: &str = "create_task";

/// Name of the well-known artifact tool available during task execution.
pub const CREATE_ARTIFACT_TOOL: &str = "create_artifact";

/// Current unix time in seconds.
pub fn unix_timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Current time as an ISO-8601 string.
pub fn iso_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}
