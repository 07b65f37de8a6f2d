//! Structured-response extraction
//!
//! Model output is often a JSON object wrapped in prose or a code fence. These
//! helpers recover the object when possible and report `None` otherwise; they
//! never fail.

use crate::llm::Generation;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

/// Best-effort JSON object extraction.
///
/// Structured output passes through unchanged. Text is parsed strictly first,
/// then the first balanced `{...}` span is tried on its own.
pub fn extract_json(response: &Generation) -> Option<Map<String, Value>> {
    match response {
        Generation::Structured(map) => Some(map.clone()),
        Generation::Text(text) => extract_json_from_text(text),
    }
}

pub fn extract_json_from_text(text: &str) -> Option<Map<String, Value>> {
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(text.trim()) {
        return Some(map);
    }

    let span = first_brace_span(text)?;
    match serde_json::from_str::<Value>(span) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// Extract and deserialize into a typed stage result. Fields with the wrong
/// JSON type make the whole extraction fail.
pub fn extract_as<T: DeserializeOwned>(response: &Generation) -> Option<T> {
    let map = extract_json(response)?;
    serde_json::from_value(Value::Object(map)).ok()
}

/// Slice from the first `{` to its matching `}`, skipping braces inside
/// string literals.
fn first_brace_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }

    None
}
