//! OpenAI streaming client
//!
//! Direct HTTP client for the OpenAI chat-completions API in streaming mode.
//! The response identifier is pulled from the first stream event so it can be
//! surfaced out-of-band (as a response header) before the body is consumed.

use crate::providers::sse::SseParser;
use crate::providers::{ChatPrompt, ProviderError, ProviderStream};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const OPENAI_API_BASE_URL: &str = "https://api.openai.com/v1";
const SSE_DONE: &str = "[DONE]";

/// Chat-completions request payload
#[derive(Serialize, Debug)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    stream: bool,
    messages: Vec<RequestMessage<'a>>,
}

/// One message in the request payload
#[derive(Serialize, Debug)]
struct RequestMessage<'a> {
    role: &'static str,
    content: &'a str,
}

/// One SSE event of a streamed completion
#[derive(Deserialize, Debug)]
struct StreamChunk {
    /// Response identifier, repeated on every event
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize, Debug)]
struct StreamChoice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Deserialize, Debug, Default)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

impl StreamChunk {
    /// Incremental text carried by this event, if any
    fn delta_text(&self) -> Option<String> {
        self.choices
            .first()
            .and_then(|choice| choice.delta.content.clone())
            .filter(|text| !text.is_empty())
    }
}

/// Stream a single-turn chat completion from OpenAI.
///
/// # Errors
/// Returns `ProviderError::Api` when the provider responds with a
/// non-success status (the body text is preserved for classification), or
/// `ProviderError::Http` on transport failure.
pub async fn stream_chat(
    client: &reqwest::Client,
    api_key: &str,
    prompt: &ChatPrompt<'_>,
) -> Result<ProviderStream, ProviderError> {
    stream_chat_with_base_url(client, api_key, prompt, OPENAI_API_BASE_URL).await
}

/// Internal function that allows a custom base URL (for testing)
async fn stream_chat_with_base_url(
    client: &reqwest::Client,
    api_key: &str,
    prompt: &ChatPrompt<'_>,
    base_url: &str,
) -> Result<ProviderStream, ProviderError> {
    let request_body = ChatCompletionRequest {
        model: prompt.model,
        stream: true,
        messages: vec![
            RequestMessage {
                role: "system",
                content: prompt.system_prompt,
            },
            RequestMessage {
                role: "user",
                content: prompt.user_message,
            },
        ],
    };

    debug!(
        model = %prompt.model,
        prompt_len = prompt.user_message.len(),
        "Calling OpenAI chat completions"
    );

    let response = client
        .post(format!("{}/chat/completions", base_url))
        .bearer_auth(api_key)
        .json(&request_body)
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unable to read error body".to_string());
        warn!(
            status_code = status.as_u16(),
            body = %body,
            "OpenAI API returned error status"
        );
        return Err(ProviderError::Api {
            status: status.as_u16(),
            body,
        });
    }

    let mut byte_stream = response.bytes_stream();
    let mut parser = SseParser::new();
    let mut response_id: Option<String> = None;
    let mut buffered: Vec<String> = Vec::new();
    let mut finished = false;

    // Pull events until the first one parses, so the response id is known
    // before the stream is handed back. Every chat-completion event repeats
    // the id, so in practice this reads exactly one event.
    'pull: while response_id.is_none() && !finished {
        match byte_stream.next().await {
            Some(Ok(bytes)) => {
                for payload in parser.push(&bytes) {
                    if payload == SSE_DONE {
                        finished = true;
                        break;
                    }
                    match serde_json::from_str::<StreamChunk>(&payload) {
                        Ok(chunk) => {
                            if response_id.is_none() {
                                response_id = chunk.id.clone().filter(|id| !id.is_empty());
                            }
                            if let Some(text) = chunk.delta_text() {
                                buffered.push(text);
                            }
                        }
                        Err(e) => warn!(error = %e, "Skipping malformed OpenAI stream chunk"),
                    }
                }
                if !buffered.is_empty() {
                    break 'pull;
                }
            }
            Some(Err(e)) => return Err(e.into()),
            None => finished = true,
        }
    }

    let chunks = async_stream::stream! {
        for text in buffered {
            yield Ok(text);
        }
        let mut finished = finished;
        while !finished {
            match byte_stream.next().await {
                Some(Ok(bytes)) => {
                    for payload in parser.push(&bytes) {
                        if payload == SSE_DONE {
                            finished = true;
                            break;
                        }
                        match serde_json::from_str::<StreamChunk>(&payload) {
                            Ok(chunk) => {
                                if let Some(text) = chunk.delta_text() {
                                    yield Ok(text);
                                }
                            }
                            Err(e) => warn!(error = %e, "Skipping malformed OpenAI stream chunk"),
                        }
                    }
                }
                Some(Err(e)) => {
                    yield Err(ProviderError::from(e));
                    finished = true;
                }
                None => finished = true,
            }
        }
    };

    Ok(ProviderStream {
        response_id,
        chunks: chunks.boxed(),
    })
}
