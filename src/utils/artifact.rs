//! Helpers for creating and reading artifacts.

use crate::types::{Artifact, Part};
use crate::utils::parts::get_text_parts;
use uuid::Uuid;

/// Creates a new text artifact with a generated artifact id.
///
/// # Arguments
///
/// * `name` - The stable, producer-chosen name of the artifact.
/// * `text` - The text content.
/// * `description` - An optional description.
///
/// # Example
///
/// ```
/// use a2a_engine::utils::new_text_artifact;
///
/// let artifact = new_text_artifact("haiku.txt", "old pond / frog / splash", Some("a haiku"));
/// assert_eq!(artifact.name, Some("haiku.txt".to_string()));
/// ```
pub fn new_text_artifact(
    name: impl Into<String>,
    text: impl Into<String>,
    description: Option<impl Into<String>>,
) -> Artifact {
    Artifact {
        artifact_id: Uuid::new_v4().to_string(),
        name: Some(name.into()),
        description: description.map(|d| d.into()),
        parts: vec![Part::text(text)],
        metadata: None,
    }
}

/// Extracts and joins all text content from an artifact's parts.
pub fn get_artifact_text(artifact: &Artifact, delimiter: &str) -> String {
    get_text_parts(&artifact.parts).join(delimiter)
}

/// Guess a MIME type from artifact content.
///
/// Used at finalization when the producer supplied none. Intentionally
/// coarse: JSON, markdown, HTML, otherwise plain text.
pub fn guess_mime_type(content: &str) -> &'static str {
    let trimmed = content.trim_start();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        if serde_json::from_str::<serde_json::Value>(content).is_ok() {
            return "application/json";
        }
    }
    if trimmed.starts_with("<!DOCTYPE html") || trimmed.starts_with("<html") {
        return "text/html";
    }
    if trimmed.starts_with('#') || content.contains("\n## ") || content.contains("```") {
        return "text/markdown";
    }
    "text/plain"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_artifact_generates_uuid() {
        let artifact = new_text_artifact("notes.txt", "content", None::<String>);
        assert!(Uuid::parse_str(&artifact.artifact_id).is_ok());
        assert_eq!(get_artifact_text(&artifact, "\n"), "content");
    }

    #[test]
    fn mime_guessing() {
        assert_eq!(guess_mime_type(r#"{"a": 1}"#), "application/json");
        assert_eq!(guess_mime_type("# Title\n\nbody"), "text/markdown");
        assert_eq!(guess_mime_type("<html><body/></html>"), "text/html");
        assert_eq!(guess_mime_type("just words"), "text/plain");
        // Looks like JSON but isn't — fall through to plain text.
        assert_eq!(guess_mime_type("{not json"), "text/plain");
    }
}
