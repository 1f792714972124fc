//! Gemini streaming client
//!
//! Direct HTTP client for the Gemini `streamGenerateContent` endpoint with
//! SSE framing. Gemini does not issue a chainable response identifier, so
//! the returned stream carries none.

use crate::providers::sse::SseParser;
use crate::providers::{ChatPrompt, ProviderError, ProviderStream};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const GEMINI_API_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Request payload for `streamGenerateContent`
#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<RequestContent<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<RequestContent<'a>>,
}

/// Content structure for requests
#[derive(Serialize, Debug)]
struct RequestContent<'a> {
    parts: Vec<RequestPart<'a>>,
}

/// A single part for requests (typically text)
#[derive(Serialize, Debug)]
struct RequestPart<'a> {
    text: &'a str,
}

/// One SSE event of a streamed generation
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct StreamChunk {
    #[serde(default)]
    candidates: Vec<Candidate>,
    /// Feedback about the prompt (e.g. if it was blocked)
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize, Debug)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

#[derive(Deserialize, Debug)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize, Debug)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

impl StreamChunk {
    /// Incremental text carried by this event, if any
    fn text(&self) -> Option<String> {
        let candidate = self.candidates.first()?;
        let content = candidate.content.as_ref()?;
        let text: String = content
            .parts
            .iter()
            .map(|part| part.text.as_str())
            .collect();
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

/// Stream a single-turn generation from Gemini.
///
/// # Errors
/// Returns `ProviderError::Api` when the provider responds with a
/// non-success status, or `ProviderError::Http` on transport failure. A
/// prompt block reported mid-stream surfaces as `ProviderError::Blocked` on
/// the chunk stream.
pub async fn stream_chat(
    client: &reqwest::Client,
    api_key: &str,
    prompt: &ChatPrompt<'_>,
) -> Result<ProviderStream, ProviderError> {
    stream_chat_with_base_url(client, api_key, prompt, GEMINI_API_BASE_URL).await
}

/// Internal function that allows a custom base URL (for testing)
async fn stream_chat_with_base_url(
    client: &reqwest::Client,
    api_key: &str,
    prompt: &ChatPrompt<'_>,
    base_url: &str,
) -> Result<ProviderStream, ProviderError> {
    let url = format!(
        "{}/models/{}:streamGenerateContent?alt=sse&key={}",
        base_url, prompt.model, api_key
    );

    let request_body = GenerateContentRequest {
        contents: vec![RequestContent {
            parts: vec![RequestPart {
                text: prompt.user_message,
            }],
        }],
        system_instruction: Some(RequestContent {
            parts: vec![RequestPart {
                text: prompt.system_prompt,
            }],
        }),
    };

    debug!(
        model = %prompt.model,
        prompt_len = prompt.user_message.len(),
        "Calling Gemini streamGenerateContent"
    );

    let response = client.post(&url).json(&request_body).send().await?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unable to read error body".to_string());
        warn!(
            status_code = status.as_u16(),
            body = %body,
            "Gemini API returned error status"
        );
        return Err(ProviderError::Api {
            status: status.as_u16(),
            body,
        });
    }

    let mut byte_stream = response.bytes_stream();
    let chunks = async_stream::stream! {
        let mut parser = SseParser::new();
        let mut finished = false;
        while !finished {
            match byte_stream.next().await {
                Some(Ok(bytes)) => {
                    for payload in parser.push(&bytes) {
                        match serde_json::from_str::<StreamChunk>(&payload) {
                            Ok(chunk) => {
                                if let Some(feedback) = &chunk.prompt_feedback {
                                    if let Some(reason) = &feedback.block_reason {
                                        yield Err(ProviderError::Blocked(reason.clone()));
                                        finished = true;
                                        break;
                                    }
                                }
                                if let Some(text) = chunk.text() {
                                    yield Ok(text);
                                }
                            }
                            Err(e) => warn!(error = %e, "Skipping malformed Gemini stream chunk"),
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
        response_id: None,
        chunks: chunks.boxed(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use serial_test::serial;

    fn test_prompt<'a>() -> ChatPrompt<'a> {
        ChatPrompt {
            system_prompt: "You are helpful",
            user_message: "Hello there",
            model: "gemini-2.0-flash",
        }
    }

    #[tokio::test]
    #[serial]
    async fn test_stream_chat_success() {
        let mut server = Server::new_async().await;
        let body = concat!(
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"Hel\"}],\"role\":\"model\"}}]}\n\n",
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"lo\"}],\"role\":\"model\"}}]}\n\n",
        );
        let mock = server
            .mock("POST", "/models/gemini-2.0-flash:streamGenerateContent")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("alt".into(), "sse".into()),
                Matcher::UrlEncoded("key".into(), "test-key".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body(body)
            .create_async()
            .await;

        let client = reqwest::Client::new();
        let result =
            stream_chat_with_base_url(&client, "test-key", &test_prompt(), &server.url()).await;

        mock.assert_async().await;
        let stream = result.unwrap();
        assert_eq!(stream.response_id, None);

        let mut chunks = stream.chunks;
        let mut out = String::new();
        while let Some(item) = chunks.next().await {
            out.push_str(&item.unwrap());
        }
        assert_eq!(out, "Hello");
    }

    #[tokio::test]
    #[serial]
    async fn test_stream_chat_blocked_prompt() {
        let mut server = Server::new_async().await;
        let body = "data: {\"candidates\":[],\"promptFeedback\":{\"blockReason\":\"SAFETY\"}}\n\n";
        let mock = server
            .mock("POST", "/models/gemini-2.0-flash:streamGenerateContent")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(body)
            .create_async()
            .await;

        let client = reqwest::Client::new();
        let stream =
            stream_chat_with_base_url(&client, "test-key", &test_prompt(), &server.url())
                .await
                .unwrap();

        mock.assert_async().await;
        let mut chunks = stream.chunks;
        match chunks.next().await {
            Some(Err(ProviderError::Blocked(reason))) => assert_eq!(reason, "SAFETY"),
            other => panic!("Expected Blocked error, got {:?}", other.map(|r| r.is_ok())),
        }
        assert!(chunks.next().await.is_none());
    }

    #[tokio::test]
    #[serial]
    async fn test_stream_chat_error_status() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/models/gemini-2.0-flash:streamGenerateContent")
            .match_query(Matcher::Any)
            .with_status(429)
            .with_body("{\"error\": {\"status\": \"RESOURCE_EXHAUSTED\"}}")
            .create_async()
            .await;

        let client = reqwest::Client::new();
        let result =
            stream_chat_with_base_url(&client, "test-key", &test_prompt(), &server.url()).await;

        mock.assert_async().await;
        match result {
            Err(ProviderError::Api { status, body }) => {
                assert_eq!(status, 429);
                assert!(body.contains("RESOURCE_EXHAUSTED"));
            }
            other => panic!("Expected Api error, got {:?}", other.map(|_| "stream")),
        }
    }
}
