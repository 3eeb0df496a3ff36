//! Helpers for working with message and artifact parts.

use crate::types::Part;

/// Extracts the text content from a list of parts.
///
/// Non-text parts (function calls, responses, data) are skipped.
pub fn get_text_parts(parts: &[Part]) -> Vec<&str> {
    parts
        .iter()
        .filter_map(|part| match part {
            Part::Text { text, .. } => Some(text.as_str()),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_only_text() {
        let parts = vec![
            Part::text("one"),
            Part::function_call("c1", "exec", json!({})),
            Part::text("two"),
            Part::function_response("c1", json!({"ok": true})),
            Part::File {
                file: crate::types::FileContent::Uri(crate::types::FileWithUri {
                    uri: "https://example.com/a.txt".to_string(),
                    mime_type: None,
                    name: None,
                }),
                metadata: None,
            },
        ];
        assert_eq!(get_text_parts(&parts), vec!["one", "two"]);
    }

    #[test]
    fn empty_for_no_text() {
        let parts = vec![Part::function_call("c1", "exec", json!({}))];
        assert!(get_text_parts(&parts).is_empty());
    }
}
