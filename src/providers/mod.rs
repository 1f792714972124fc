//! LLM provider integrations
//!
//! One streaming client per supported provider (OpenAI, Gemini), plus the
//! provider-name resolution and error classification shared by the chat
//! endpoint. Both clients speak SSE over reqwest byte streams and yield
//! incremental text chunks.

pub mod classify;
pub mod gemini;
pub mod openai;
pub mod sse;

use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Supported LLM providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderName {
    /// OpenAI chat-completions API
    OpenAi,
    /// Google Gemini generative language API
    Gemini,
}

impl ProviderName {
    /// String form used on the wire and in the credential store
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderName::OpenAi => "openai",
            ProviderName::Gemini => "gemini",
        }
    }

    /// Resolve a provider from a model selector ("gpt-4o-mini",
    /// "gemini-2.0-flash", ...) by prefix/substring match.
    ///
    /// Returns `None` when nothing matches; callers must fail closed.
    pub fn from_selector(selector: &str) -> Option<Self> {
        let lower = selector.to_lowercase();
        if lower.starts_with("gpt") || lower.contains("openai") {
            Some(ProviderName::OpenAi)
        } else if lower.contains("gemini") {
            Some(ProviderName::Gemini)
        } else {
            None
        }
    }

    /// Resolve a provider from an explicit provider name, case-insensitive
    /// substring match ("gemini" is checked first, matching route behavior).
    pub fn from_name(name: &str) -> Option<Self> {
        let lower = name.to_lowercase();
        if lower.contains("gemini") {
            Some(ProviderName::Gemini)
        } else if lower.contains("openai") {
            Some(ProviderName::OpenAi)
        } else {
            None
        }
    }
}

impl std::fmt::Display for ProviderName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised while talking to a provider
#[derive(Error, Debug)]
pub enum ProviderError {
    /// The provider name did not resolve to a known provider
    #[error("Unsupported provider: {0}")]
    UnknownProvider(String),

    /// No API key was supplied for the resolved provider
    #[error("No API key provided for {0}")]
    MissingApiKey(String),

    /// HTTP transport failure (connect, read, decode)
    #[error("Provider request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider returned a non-success status; body text is preserved
    /// verbatim so error classification can match on it
    #[error("Provider API error (HTTP {status}): {body}")]
    Api {
        /// HTTP status code returned by the provider
        status: u16,
        /// Raw response body
        body: String,
    },

    /// The provider refused the prompt (e.g. Gemini safety block)
    #[error("Provider blocked the prompt: {0}")]
    Blocked(String),
}

/// Single-turn prompt forwarded to a provider.
///
/// The provider call is single-turn by design: continuity across turns
/// relies on response-id threading, not on resending the transcript.
#[derive(Debug, Clone, Copy)]
pub struct ChatPrompt<'a> {
    /// Effective system prompt (already context-augmented)
    pub system_prompt: &'a str,
    /// The latest user message
    pub user_message: &'a str,
    /// Model identifier understood by the provider
    pub model: &'a str,
}

/// A live provider exchange: optional out-of-band response identifier plus
/// the incremental text chunk stream.
pub struct ProviderStream {
    /// Provider-issued response identifier, when the provider reports one
    /// (OpenAI-style calls only)
    pub response_id: Option<String>,
    /// Incremental text chunks; the concatenation is the full model output
    pub chunks: BoxStream<'static, Result<String, ProviderError>>,
}
