use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ArgumentParseError {
    #[error("no JSON object found in tool arguments (length={length})")]
    NoObject { length: usize },

    #[error("tool arguments decoded to {found}, expected an object")]
    NotObject { found: &'static str },
}

/// Decode the argument payload of a tool call.
///
/// Vendors send arguments as a JSON string that is usually, but not always,
/// clean. Accepted shapes:
/// - Clean JSON: `{"symbol": "AAPL"}`
/// - Empty or whitespace: treated as `{}`
/// - Double-encoded: `"{\"symbol\": \"AAPL\"}"`
/// - Markdown-wrapped: ```json\n{"symbol": "AAPL"}\n```
/// - Prose around the object: `Calling now: {"symbol": "AAPL"}`
pub fn parse_tool_arguments(raw: &str) -> Result<Map<String, Value>, ArgumentParseError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(Map::new());
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return match value {
            Value::Object(map) => Ok(map),
            Value::String(inner) if inner.trim_start().starts_with('{') => {
                parse_tool_arguments(&inner)
            }
            other => Err(ArgumentParseError::NotObject {
                found: json_kind(&other),
            }),
        };
    }

    let candidates = [extract_from_markdown_block(trimmed), extract_first_object(trimmed)];
    for candidate in candidates.into_iter().flatten() {
        if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(&candidate) {
            return Ok(map);
        }
    }

    Err(ArgumentParseError::NoObject { length: raw.len() })
}

/// Interpret an already-decoded argument value, as some vendors send objects
/// directly while others send strings.
pub fn arguments_from_value(value: Value) -> Result<Map<String, Value>, ArgumentParseError> {
    match value {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        Value::String(s) => parse_tool_arguments(&s),
        other => Err(ArgumentParseError::NotObject {
            found: json_kind(&other),
        }),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn extract_from_markdown_block(text: &str) -> Option<String> {
    let start_markers = ["```json\n", "```json\r\n", "```\n", "```\r\n"];

    for marker in &start_markers {
        if let Some(start) = text.find(marker) {
            let body_start = start + marker.len();
            if let Some(end) = text[body_start..].find("```") {
                return Some(text[body_start..body_start + end].trim().to_string());
            }
        }
    }

    None
}

/// First balanced `{ ... }`, ignoring braces inside string literals.
fn extract_first_object(text: &str) -> Option<String> {
    let mut depth = 0usize;
    let mut start = None;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, ch) in text.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }

        match ch {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            '}' if !in_string && depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    if let Some(s) = start {
                        return Some(text[s..=i].to_string());
                    }
                }
            }
            _ => {}
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_object() {
        let args = parse_tool_arguments(r#"{"symbol": "AAPL", "qty": 3}"#).unwrap();
        assert_eq!(args["symbol"], "AAPL");
        assert_eq!(args["qty"], 3);
    }

    #[test]
    fn empty_is_empty_object() {
        assert!(parse_tool_arguments("").unwrap().is_empty());
        assert!(parse_tool_arguments("   ").unwrap().is_empty());
    }

    #[test]
    fn double_encoded() {
        let args = parse_tool_arguments(r#""{\"symbol\": \"MSFT\"}""#).unwrap();
        assert_eq!(args["symbol"], "MSFT");
    }

    #[test]
    fn markdown_fenced() {
        let args = parse_tool_arguments("```json\n{\"side\": \"buy\"}\n```").unwrap();
        assert_eq!(args["side"], "buy");
    }

    #[test]
    fn prose_prefix_with_braces_in_strings() {
        let raw = r#"Sure: {"reasoning": "range {low} to {high}", "symbol": "AMD"} done"#;
        let args = parse_tool_arguments(raw).unwrap();
        assert_eq!(args["symbol"], "AMD");
    }

    #[test]
    fn non_object_is_rejected() {
        assert_eq!(
            parse_tool_arguments("[1, 2]").unwrap_err(),
            ArgumentParseError::NotObject { found: "an array" }
        );
        assert!(matches!(
            parse_tool_arguments("no json here"),
            Err(ArgumentParseError::NoObject { .. })
        ));
    }

    #[test]
    fn value_forms() {
        assert!(arguments_from_value(Value::Null).unwrap().is_empty());
        let map = arguments_from_value(serde_json::json!({"a": 1})).unwrap();
        assert_eq!(map["a"], 1);
        assert!(arguments_from_value(serde_json::json!(5)).is_err());
    }
}
