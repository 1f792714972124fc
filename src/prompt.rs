//! System prompt for the AI Manager chat
//!
//! The prompt instructs the model to answer with a single JSON object of
//! shape `{"description": ...}`. This is a prompt-level contract only; the
//! reply parser in `session::parser` handles output that ignores it.

/// Default system prompt sent when the caller does not supply one.
pub const SYSTEM_PROMPT: &str = "\
You are a helpful AI assistant for this dashboard application.

Your responsibilities:
- Provide clear, helpful responses to user questions
- Be conversational and friendly
- Explain concepts in simple terms when needed
- If you don't know something, be honest about it

Always return your responses in the following JSON format:

{
  \"description\": \"<your response text here, markdown supported>\"
}

Important guidelines:
- Never output raw text outside this JSON format
- Never wrap the JSON in markdown code fences
- The description should contain your complete response in plain text or markdown
- Be conversational, helpful, and clear in your responses
";

/// Delimiter between the base prompt and appended retrieval context.
const CONTEXT_DELIMITER: &str = "--- Knowledge Base Context ---";

/// Concatenate retrieval context onto a system prompt as plain text.
///
/// Returns the base prompt unchanged when there is no context.
pub fn with_context(base: &str, context: Option<&str>) -> String {
    match context {
        Some(context) if !context.trim().is_empty() => {
            format!("{}\n\n{}\n{}", base, CONTEXT_DELIMITER, context)
        }
        _ => base.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_context_appends_delimited_block() {
        let prompt = with_context("base prompt", Some("three documents"));
        assert!(prompt.starts_with("base prompt"));
        assert!(prompt.contains(CONTEXT_DELIMITER));
        assert!(prompt.ends_with("three documents"));
    }

    #[test]
    fn test_with_context_without_context() {
        assert_eq!(with_context("base prompt", None), "base prompt");
        assert_eq!(with_context("base prompt", Some("   ")), "base prompt");
    }
}
