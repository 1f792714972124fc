//! Assistant reply parsing
//!
//! The provider is prompted to answer with a single JSON object of shape
//! `{"description": ...}`, and the chat endpoint wraps its own failures in
//! `{"description": ..., "error": true}`. Neither shape is enforced by the
//! wire, so classification is defensive: a tagged result covers the three
//! possible outcomes, and a separate escape-aware scanner extracts readable
//! text from incomplete fragments while the stream is still running.

/// Outcome of classifying a complete assistant reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssistantReply {
    /// Well-formed `{"description": ...}` payload
    Reply(String),
    /// Payload carried `"error": true`; the description is a user-facing
    /// failure message and the turn must not be persisted
    ProviderError(String),
    /// Anything else; the raw text is used verbatim
    Malformed(String),
}

const FALLBACK_ERROR_TEXT: &str = "Something went wrong while calling the AI provider.";

/// Classify the full concatenated output of a finished exchange.
pub fn classify_reply(raw: &str) -> AssistantReply {
    match serde_json::from_str::<serde_json::Value>(raw.trim()) {
        Ok(serde_json::Value::Object(map)) => {
            let description = map
                .get("description")
                .and_then(serde_json::Value::as_str)
                .map(str::to_string);
            if map.get("error").and_then(serde_json::Value::as_bool) == Some(true) {
                AssistantReply::ProviderError(
                    description.unwrap_or_else(|| FALLBACK_ERROR_TEXT.to_string()),
                )
            } else if let Some(description) = description {
                AssistantReply::Reply(description)
            } else {
                AssistantReply::Malformed(raw.to_string())
            }
        }
        _ => AssistantReply::Malformed(raw.to_string()),
    }
}

/// Extract displayable text from a possibly incomplete reply fragment.
///
/// While the stream is running the accumulated text is usually a JSON
/// prefix like `{"description": "Hel`. Rendering that raw would show JSON
/// syntax, so this scans for the description string and unescapes whatever
/// part of it has arrived. Fragments that do not look like JSON are
/// returned as-is; JSON-shaped fragments whose description has not started
/// yet render as empty.
pub fn extract_streaming_text(raw: &str) -> String {
    let trimmed = raw.trim_start();
    if !trimmed.starts_with('{') {
        return raw.to_string();
    }
    partial_description(trimmed).unwrap_or_default()
}

/// Scan a JSON-prefix fragment for the `"description"` string value and
/// return the unescaped part that has arrived so far.
fn partial_description(fragment: &str) -> Option<String> {
    let key_pos = fragment.find("\"description\"")?;
    let after_key = &fragment[key_pos + "\"description\"".len()..];
    let colon = after_key.find(':')?;
    let value = after_key[colon + 1..].trim_start();
    let value = value.strip_prefix('"')?;

    let mut out = String::new();
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        match c {
            '"' => break,
            '\\' => match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some('r') => out.push('\r'),
                Some('b') => out.push('\u{0008}'),
                Some('f') => out.push('\u{000C}'),
                Some('"') => out.push('"'),
                Some('\\') => out.push('\\'),
                Some('/') => out.push('/'),
                Some('u') => {
                    let hex: String = chars.by_ref().take(4).collect();
                    if hex.len() < 4 {
                        // Incomplete escape at the end of the fragment.
                        break;
                    }
                    match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                        Some(decoded) => out.push(decoded),
                        None => break,
                    }
                }
                // Truncated or unknown escape; stop at the last clean point.
                _ => break,
            },
            _ => out.push(c),
        }
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_well_formed_reply() {
        assert_eq!(
            classify_reply(r#"{"description": "Hello"}"#),
            AssistantReply::Reply("Hello".to_string())
        );
    }

    #[test]
    fn test_classify_error_flagged_reply() {
        assert_eq!(
            classify_reply(r#"{"description": "X", "error": true, "timestamp": "t"}"#),
            AssistantReply::ProviderError("X".to_string())
        );
    }

    #[test]
    fn test_classify_error_without_description() {
        assert_eq!(
            classify_reply(r#"{"error": true}"#),
            AssistantReply::ProviderError(FALLBACK_ERROR_TEXT.to_string())
        );
    }

    #[test]
    fn test_classify_error_false_with_description() {
        assert_eq!(
            classify_reply(r#"{"description": "ok", "error": false}"#),
            AssistantReply::Reply("ok".to_string())
        );
    }

    #[test]
    fn test_classify_non_json_is_verbatim() {
        assert_eq!(
            classify_reply("plain markdown answer"),
            AssistantReply::Malformed("plain markdown answer".to_string())
        );
    }

    #[test]
    fn test_classify_json_without_description_is_verbatim() {
        let raw = r#"{"answer": "Hello"}"#;
        assert_eq!(classify_reply(raw), AssistantReply::Malformed(raw.to_string()));
    }

    #[test]
    fn test_streaming_partial_fragment() {
        assert_eq!(extract_streaming_text(r#"{"description": "Hel"#), "Hel");
    }

    #[test]
    fn test_streaming_complete_fragment() {
        assert_eq!(
            extract_streaming_text(r#"{"description": "Hello there"}"#),
            "Hello there"
        );
    }

    #[test]
    fn test_streaming_fragment_before_value_starts() {
        assert_eq!(extract_streaming_text(r#"{"descri"#), "");
        assert_eq!(extract_streaming_text(r#"{"description""#), "");
        assert_eq!(extract_streaming_text(r#"{"description": "#), "");
    }

    #[test]
    fn test_streaming_non_json_passthrough() {
        assert_eq!(extract_streaming_text("plain text"), "plain text");
    }

    #[test]
    fn test_streaming_unescapes() {
        assert_eq!(
            extract_streaming_text(r#"{"description": "line\nnext \"quoted\""#),
            "line\nnext \"quoted\""
        );
    }

    #[test]
    fn test_streaming_truncated_escape() {
        // A fragment ending mid-escape renders the clean prefix.
        assert_eq!(extract_streaming_text(r#"{"description": "abc\"#), "abc");
        assert_eq!(extract_streaming_text(r#"{"description": "abc\u00"#), "abc");
    }

    #[test]
    fn test_streaming_unicode_escape() {
        assert_eq!(
            extract_streaming_text("{\"description\": \"caf\\u00e9 time"),
            "caf\u{e9} time"
        );
    }
}
