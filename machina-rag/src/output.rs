//! Extraction of JSON values from free-form model output.

use serde_json::Value;

use crate::error::{RagError, Result};

/// Parse the first JSON value found in `text`.
///
/// Tries, in order: the whole text, the body of a fenced code block, and the
/// span from the first `{` to the last `}`.
///
/// # Errors
///
/// Returns [`RagError::SchemaMismatch`] describing why no JSON was found.
pub fn extract_json(text: &str) -> Result<Value> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(RagError::SchemaMismatch(vec!["model returned no text".to_string()]));
    }

    let detail = match serde_json::from_str::<Value>(trimmed) {
        Ok(value) => return Ok(value),
        Err(e) => e.to_string(),
    };

    if let Some(block) = extract_fenced_block(trimmed) {
        if let Ok(value) = serde_json::from_str(&block) {
            return Ok(value);
        }
    }

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start < end {
            if let Ok(value) = serde_json::from_str(&trimmed[start..=end]) {
                return Ok(value);
            }
        }
    }

    Err(RagError::SchemaMismatch(vec![format!("output is not valid JSON: {detail}")]))
}

fn extract_fenced_block(text: &str) -> Option<String> {
    // Look for ```json ... ``` blocks
    let start_markers = ["```json\n", "```json\r\n", "```\n", "```\r\n"];
    let end_marker = "```";

    for start in start_markers {
        if let Some(start_idx) = text.find(start) {
            let content_start = start_idx + start.len();
            if let Some(end_idx) = text[content_start..].find(end_marker) {
                return Some(text[content_start..content_start + end_idx].trim().to_string());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_bare_json() {
        assert_eq!(
            extract_json(r#" {"toolType": "EndMillTool"} "#).unwrap(),
            json!({"toolType": "EndMillTool"})
        );
    }

    #[test]
    fn parses_fenced_json() {
        let text = "Here is my suggestion:\n```json\n{\"toolType\": \"FaceMill\"}\n```\nGood luck.";
        assert_eq!(extract_json(text).unwrap(), json!({"toolType": "FaceMill"}));
    }

    #[test]
    fn parses_embedded_object() {
        let text = "Suggestion: {\"diameter\": 6.0} as discussed";
        assert_eq!(extract_json(text).unwrap(), json!({"diameter": 6.0}));
    }

    #[test]
    fn rejects_prose() {
        assert!(extract_json("Use a 6 mm end mill.").is_err());
        assert!(extract_json("   ").is_err());
        assert!(extract_json("} backwards {").is_err());
    }
}
