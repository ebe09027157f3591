//! JSON extraction from model output
//!
//! Models asked for JSON frequently wrap it in markdown code fences. The
//! fences are stripped before decoding; a decode failure is a
//! [`PipelineError::JsonDecode`], distinct from transport or HTTP failures.

use serde_json::Value;

use super::error::{PipelineError, Result};

/// Strip leading/trailing markdown code-fence markers from model output.
///
/// A leading fence may carry a language tag (```` ```json ````); everything up
/// to the end of that line is dropped. Text without fences passes through
/// trimmed.
pub fn strip_code_fences(text: &str) -> &str {
    let mut s = text.trim();

    if let Some(rest) = s.strip_prefix("```") {
        s = match rest.find('\n') {
            Some(idx) => &rest[idx + 1..],
            None => rest.strip_prefix("json").unwrap_or(rest),
        };
    }

    if let Some(rest) = s.trim_end().strip_suffix("```") {
        s = rest;
    }

    s.trim()
}

/// Decode model output as JSON after fence stripping
pub fn extract_json(text: &str) -> Result<Value> {
    let cleaned = strip_code_fences(text);
    serde_json::from_str(cleaned).map_err(|e| PipelineError::JsonDecode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn fenced_and_bare_payloads_decode_identically() {
        let bare = r#"{"title": "Hello", "sections": [1, 2, 3]}"#;
        let fenced = format!("```json\n{bare}\n```");

        let a = extract_json(bare).unwrap();
        let b = extract_json(&fenced).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn fence_without_language_tag() {
        let out = extract_json("```\n{\"ok\": true}\n```").unwrap();
        assert_eq!(out, json!({"ok": true}));
    }

    #[test]
    fn surrounding_whitespace_is_tolerated() {
        let out = extract_json("\n\n  ```json\n[1,2]\n```  \n").unwrap();
        assert_eq!(out, json!([1, 2]));
    }

    #[test]
    fn invalid_json_is_a_decode_error() {
        let err = extract_json("```json\nnot json at all\n```").unwrap_err();
        assert!(matches!(err, PipelineError::JsonDecode(_)));
    }

    #[test]
    fn plain_text_passes_through_strip() {
        assert_eq!(strip_code_fences("  hello  "), "hello");
    }
}
