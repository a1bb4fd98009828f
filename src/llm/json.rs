//! Robust JSON extraction from LLM output.
//!
//! Model output may wrap JSON in a fenced code block or bury it in prose.
//! Every consumer of LLM text routes through [`extract_json`]; it returns
//! an empty map on any failure and never panics.

use serde_json::{Map, Value};

/// Extract the first JSON object from raw LLM text.
///
/// Tries a fenced ```json block first, then falls back to balanced-brace
/// scanning from the first `{`. Returns an empty map when no parseable
/// object is found.
pub fn extract_json(text: &str) -> Map<String, Value> {
    if let Some(obj) = fenced_block(text).and_then(parse_object) {
        return obj;
    }

    balanced_braces(text).and_then(parse_object).unwrap_or_default()
}

fn parse_object(candidate: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(candidate) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// Contents of the first ```json (or bare ```) fence, if any
fn fenced_block(text: &str) -> Option<&str> {
    let start = text.find("```")?;
    let after_ticks = &text[start + 3..];

    // Skip an optional language tag on the fence line
    let body_start = after_ticks.find('\n').map(|i| i + 1).unwrap_or(0);
    let body = &after_ticks[body_start..];

    let end = body.find("```")?;
    Some(body[..end].trim())
}

/// Substring from the first `{` to its balance-matched `}`, if any
fn balanced_braces(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, ch) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + i + 1]);
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
    fn test_empty_input_yields_empty_map() {
        assert!(extract_json("").is_empty());
    }

    #[test]
    fn test_plain_prose_yields_empty_map() {
        assert!(extract_json("not json at all").is_empty());
    }

    #[test]
    fn test_broken_fence_yields_empty_map() {
        assert!(extract_json("```json\n{broken").is_empty());
    }

    #[test]
    fn test_object_amid_noise() {
        let map = extract_json("noise {\"a\":1} trailing");
        assert_eq!(map.get("a").and_then(|v| v.as_i64()), Some(1));
    }

    #[test]
    fn test_fenced_block_preferred() {
        let text = "Here you go:\n```json\n{\"validated\": true, \"evidence\": \"x\"}\n```";
        let map = extract_json(text);
        assert_eq!(map.get("validated").and_then(|v| v.as_bool()), Some(true));
    }

    #[test]
    fn test_nested_and_string_braces() {
        let text = r#"prefix {"outer": {"inner": "has } brace"}, "n": 2} suffix"#;
        let map = extract_json(text);
        assert_eq!(map.get("n").and_then(|v| v.as_i64()), Some(2));
        assert_eq!(
            map["outer"]["inner"].as_str(),
            Some("has } brace")
        );
    }

    #[test]
    fn test_top_level_array_is_not_an_object() {
        assert!(extract_json("[1, 2, 3]").is_empty());
    }
}
