//! JSON Extraction from Model Responses
//!
//! Research reports come back as prose with a JSON array of candidate
//! hypotheses somewhere inside. This module pulls the array out and
//! tolerates the usual model output defects:
//! - Markdown code fence wrapping (```json ... ```)
//! - Explanatory text before/after the JSON
//! - Trailing commas
//! - Missing closing braces/brackets

use serde_json::Value;
use tracing::{debug, warn};

use crate::types::{ForgeError, Result};

/// Extract the candidate array from a model response.
///
/// Accepts either a bare JSON array or an object whose `hypotheses`
/// key holds the array.
pub fn extract_candidate_array(content: &str) -> Result<Vec<Value>> {
    let value = extract_json_from_response(content)?;
    match value {
        Value::Array(items) => Ok(items),
        Value::Object(mut map) => match map.remove("hypotheses") {
            Some(Value::Array(items)) => Ok(items),
            _ => Err(ForgeError::Validation(
                "Response JSON is an object without a hypotheses array".to_string(),
            )),
        },
        other => Err(ForgeError::Validation(format!(
            "Response JSON is {}, expected an array",
            type_name(&other)
        ))),
    }
}

/// Extract and parse JSON from a model response, repairing if needed.
pub fn extract_json_from_response(content: &str) -> Result<Value> {
    let cleaned = preprocess(content);

    if let Ok(value) = serde_json::from_str::<Value>(&cleaned) {
        return Ok(value);
    }
    debug!("Direct JSON parse failed, attempting repair");

    let repaired = balance_brackets(&fix_trailing_commas(&cleaned));
    if let Ok(value) = serde_json::from_str::<Value>(&repaired) {
        warn!("JSON repaired before parsing");
        return Ok(value);
    }

    // Last resort: carve the first balanced structure out of mixed prose
    if let Some(embedded) = extract_embedded(&cleaned) {
        let embedded = balance_brackets(&fix_trailing_commas(&embedded));
        if let Ok(value) = serde_json::from_str::<Value>(&embedded) {
            warn!("JSON extracted from surrounding prose");
            return Ok(value);
        }
    }

    Err(ForgeError::Validation(format!(
        "No parseable JSON in response. Preview: {}...",
        cleaned.chars().take(200).collect::<String>()
    )))
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn preprocess(raw: &str) -> String {
    let mut s = raw.trim().trim_start_matches('\u{feff}').to_string();

    if s.starts_with("```")
        && let Some(first_newline) = s.find('\n')
    {
        s = s[first_newline + 1..].to_string();
    }
    if s.ends_with("```") {
        s = s[..s.len() - 3].trim_end().to_string();
    }

    s.trim().to_string()
}

/// Drop commas that directly precede a closing bracket or brace.
fn fix_trailing_commas(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut result = String::with_capacity(s.len());

    let mut i = 0;
    while i < chars.len() {
        if chars[i] == ',' {
            let mut j = i + 1;
            while j < chars.len() && chars[j].is_whitespace() {
                j += 1;
            }
            if j < chars.len() && (chars[j] == ']' || chars[j] == '}') {
                i += 1;
                continue;
            }
        }
        result.push(chars[i]);
        i += 1;
    }

    result
}

/// Append the closers a truncated response dropped.
fn balance_brackets(s: &str) -> String {
    let mut result = s.to_string();
    let mut braces = 0i32;
    let mut brackets = 0i32;
    let mut in_string = false;
    let mut escape = false;

    for ch in result.chars() {
        if escape {
            escape = false;
            continue;
        }
        match ch {
            '\\' if in_string => escape = true,
            '"' => in_string = !in_string,
            '{' if !in_string => braces += 1,
            '}' if !in_string => braces -= 1,
            '[' if !in_string => brackets += 1,
            ']' if !in_string => brackets -= 1,
            _ => {}
        }
    }

    if in_string {
        result.push('"');
    }
    for _ in 0..braces.max(0) {
        result.push('}');
    }
    for _ in 0..brackets.max(0) {
        result.push(']');
    }

    result
}

/// Find the first balanced `{...}` or `[...]` inside mixed content.
fn extract_embedded(s: &str) -> Option<String> {
    let start = s.find(['{', '['])?;
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escape = false;

    for (i, ch) in s[start..].char_indices() {
        if escape {
            escape = false;
            continue;
        }
        match ch {
            '\\' if in_string => escape = true,
            '"' => in_string = !in_string,
            '{' | '[' if !in_string => depth += 1,
            '}' | ']' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(s[start..start + i + 1].to_string());
                }
            }
            _ => {}
        }
    }

    // Unbalanced to the end of input - return the tail and let the
    // bracket balancer finish it
    Some(s[start..].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_bare_array() {
        let items = extract_candidate_array(r#"[{"title": "A"}, {"title": "B"}]"#).unwrap();
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn test_object_with_hypotheses_key() {
        let items =
            extract_candidate_array(r#"{"hypotheses": [{"title": "A"}]}"#).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0], json!({"title": "A"}));
    }

    #[test]
    fn test_code_fenced_array() {
        let input = "```json\n[{\"title\": \"A\"}]\n```";
        let items = extract_candidate_array(input).unwrap();
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn test_array_in_prose() {
        let input = "Based on my research, here are the candidates:\n\n[{\"title\": \"A\"}]\n\nLet me know if you need more detail.";
        let items = extract_candidate_array(input).unwrap();
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn test_trailing_comma_repaired() {
        let items = extract_candidate_array(r#"[{"title": "A"},]"#).unwrap();
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn test_truncated_array_repaired() {
        let items = extract_candidate_array(r#"[{"title": "A"}, {"title": "B""#).unwrap();
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn test_scalar_rejected() {
        let err = extract_candidate_array("42").unwrap_err();
        assert!(matches!(err, ForgeError::Validation(_)));
    }

    #[test]
    fn test_no_json_at_all() {
        let err = extract_candidate_array("I could not produce any hypotheses.").unwrap_err();
        assert!(matches!(err, ForgeError::Validation(_)));
    }
}
