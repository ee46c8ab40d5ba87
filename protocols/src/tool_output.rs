//! Parsing for the dual-shape tool output tools may return.
//!
//! Two coexisting producer conventions are supported: a list whose first
//! element carries a `text` field containing a JSON object (the MCP
//! `TextContent` convention), and a list whose first element is itself a
//! JSON object (a legacy direct-JSON convention). Both must keep working.

use serde_json::{Map, Value};

use crate::error::ProtocolError;

/// The two shapes a tool's raw output may arrive in.
pub enum ToolOutput {
    Text(String),
    Structured(Map<String, Value>),
}

/// Parse a raw tool response into a JSON object, accepting either shape.
pub fn parse_tool_output(raw: &Value, op_name: &str) -> Result<Map<String, Value>, ProtocolError> {
    let fail = |detail: &str| ProtocolError::ToolParse {
        operation: op_name.to_string(),
        detail: detail.to_string(),
    };

    let items = raw.as_array().ok_or_else(|| fail("expected a list response"))?;
    let first = items.first().ok_or_else(|| fail("response list is empty"))?;

    let shape = classify(first).ok_or_else(|| fail("unrecognized first-element shape"))?;

    match shape {
        ToolOutput::Structured(map) => Ok(map),
        ToolOutput::Text(text) => {
            if text.is_empty() {
                return Err(fail("text field is empty"));
            }
            let parsed: Value =
                serde_json::from_str(&text).map_err(|e| fail(&format!("invalid JSON in text field: {e}")))?;
            parsed
                .as_object()
                .cloned()
                .ok_or_else(|| fail("parsed text field is not a JSON object"))
        }
    }
}

fn classify(first: &Value) -> Option<ToolOutput> {
    if let Some(obj) = first.as_object() {
        if let Some(text) = obj.get("text") {
            return match text {
                Value::String(s) => Some(ToolOutput::Text(s.clone())),
                _ => None,
            };
        }
        return Some(ToolOutput::Structured(obj.clone()));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_text_content_shape() {
        let raw = json!([{ "text": "{\"success\":true}" }]);
        let result = parse_tool_output(&raw, "render_ui_mockup").unwrap();
        assert_eq!(result.get("success"), Some(&json!(true)));
    }

    #[test]
    fn parses_direct_map_shape() {
        let raw = json!([{ "success": true, "valid": false }]);
        let result = parse_tool_output(&raw, "validate_dsl").unwrap();
        assert_eq!(result.get("valid"), Some(&json!(false)));
    }

    #[test]
    fn empty_list_fails() {
        let raw = json!([]);
        assert!(parse_tool_output(&raw, "render_ui_mockup").is_err());
    }

    #[test]
    fn wrong_top_level_shape_fails() {
        let raw = json!({"not": "a list"});
        assert!(parse_tool_output(&raw, "render_ui_mockup").is_err());
    }

    #[test]
    fn empty_text_fails() {
        let raw = json!([{ "text": "" }]);
        assert!(parse_tool_output(&raw, "render_ui_mockup").is_err());
    }

    #[test]
    fn non_string_text_fails() {
        let raw = json!([{ "text": 42 }]);
        assert!(parse_tool_output(&raw, "render_ui_mockup").is_err());
    }

    #[test]
    fn invalid_json_in_text_fails() {
        let raw = json!([{ "text": "{not json" }]);
        assert!(parse_tool_output(&raw, "render_ui_mockup").is_err());
    }
}
