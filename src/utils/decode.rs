//! Best-effort decoding of tool outputs into structured values.
//!
//! Tool outputs arrive either already structured (a JSON object/array in the
//! event) or as a string holding a Python repr, JSON, or JSON buried in prose.
//! [`decode_tool_output`] runs an ordered chain of decoders and stops at the
//! first one that succeeds:
//!
//! 1. structured values are used as-is
//! 2. sanitized literal decoding (Python-style reprs)
//! 3. sanitized JSON decoding
//! 4. first balanced `{...}` object embedded in surrounding text
//!
//! Placeholder sanitization (see [`super::sanitize`]) happens once, before
//! steps 2-4.

use serde_json::Value;

use super::literal::parse_literal;
use super::sanitize::sanitize_unquoted_tokens;
use crate::error::ContextDecodeError;

/// Which decoder in the chain produced a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeStrategy {
    Structured,
    Literal,
    Json,
    EmbeddedJson,
}

type TextDecoder = fn(&str) -> Option<Value>;

const TEXT_DECODERS: [(DecodeStrategy, TextDecoder); 3] = [
    (DecodeStrategy::Literal, decode_literal),
    (DecodeStrategy::Json, decode_json),
    (DecodeStrategy::EmbeddedJson, decode_embedded_json),
];

/// Decodes a raw tool output.
///
/// Empty strings and `null` are rejected with [`ContextDecodeError::Empty`].
pub fn decode_tool_output(raw: &Value) -> Result<(Value, DecodeStrategy), ContextDecodeError> {
    match raw {
        Value::Null => Err(ContextDecodeError::Empty),
        Value::String(text) => decode_text(text),
        Value::Array(_) | Value::Object(_) => Ok((raw.clone(), DecodeStrategy::Structured)),
        Value::Bool(_) | Value::Number(_) => Err(ContextDecodeError::UnexpectedShape {
            expected: "list or mapping",
        }),
    }
}

/// Runs the text decoders over a string output.
pub fn decode_text(text: &str) -> Result<(Value, DecodeStrategy), ContextDecodeError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ContextDecodeError::Empty);
    }

    let sanitized = sanitize_unquoted_tokens(trimmed);
    TEXT_DECODERS
        .iter()
        .find_map(|(strategy, decoder)| decoder(&sanitized).map(|value| (value, *strategy)))
        .ok_or_else(|| ContextDecodeError::Undecodable(preview(trimmed, 80)))
}

fn decode_literal(text: &str) -> Option<Value> {
    parse_literal(text).ok()
}

fn decode_json(text: &str) -> Option<Value> {
    serde_json::from_str(text).ok()
}

fn decode_embedded_json(text: &str) -> Option<Value> {
    let start = text.find('{')?;
    let end = find_matching_brace(&text[start..])?;
    serde_json::from_str(&text[start..=start + end]).ok()
}

/// Finds the byte index of the `}` closing the object that opens at the
/// start of `s`, skipping braces inside double-quoted strings.
pub fn find_matching_brace(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, c) in s.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }

        match c {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }

    None
}

/// Returns at most `max_chars` characters of `text`.
pub fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_structured_values_pass_through() {
        let raw = json!([{"a": 1}]);
        let (value, strategy) = decode_tool_output(&raw).expect("should decode");
        assert_eq!(value, raw);
        assert_eq!(strategy, DecodeStrategy::Structured);
    }

    #[test]
    fn test_python_repr_uses_literal_decoder() {
        let raw = json!("[{'region': 'West', 'total': <MONEY_1>}]");
        let (value, strategy) = decode_tool_output(&raw).expect("should decode");
        assert_eq!(strategy, DecodeStrategy::Literal);
        assert_eq!(value, json!([{"region": "West", "total": "<MONEY_1>"}]));
    }

    #[test]
    fn test_json_falls_through_to_json_decoder() {
        let raw = json!(r#"{"chunks": [{"content": "x"}], "ok": true}"#);
        let (value, strategy) = decode_tool_output(&raw).expect("should decode");
        assert_eq!(strategy, DecodeStrategy::Json);
        assert_eq!(value["ok"], json!(true));
    }

    #[test]
    fn test_embedded_json_in_prose() {
        let raw = json!(r#"Found results: {"chunks": [{"content": "}"}], "n": null} done"#);
        let (value, strategy) = decode_tool_output(&raw).expect("should decode");
        assert_eq!(strategy, DecodeStrategy::EmbeddedJson);
        assert_eq!(value["chunks"][0]["content"], json!("}"));
    }

    #[test]
    fn test_undecodable_and_empty() {
        assert_eq!(
            decode_tool_output(&json!("")).expect_err("empty"),
            ContextDecodeError::Empty
        );
        assert_eq!(
            decode_tool_output(&Value::Null).expect_err("null"),
            ContextDecodeError::Empty
        );
        assert!(matches!(
            decode_tool_output(&json!("plain text answer")),
            Err(ContextDecodeError::Undecodable(_))
        ));
        assert!(matches!(
            decode_tool_output(&json!(42)),
            Err(ContextDecodeError::UnexpectedShape { .. })
        ));
    }

    #[test]
    fn test_find_matching_brace() {
        assert_eq!(find_matching_brace(r#"{"a": {"b": "}"}} tail"#), Some(16));
        assert_eq!(find_matching_brace("{ unclosed"), None);
        assert_eq!(find_matching_brace("} {"), None);
    }

    #[test]
    fn test_preview_is_char_safe() {
        assert_eq!(preview("héllo", 2), "hé...");
        assert_eq!(preview("hi", 5), "hi");
    }
}
