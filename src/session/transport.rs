//! Chat transport
//!
//! The seam between the session reconciler and the chat endpoint. The HTTP
//! implementation captures the provider response identifier from the
//! `x-response-id` header before the body is consumed; headers arrive ahead
//! of the streamed body, so the id is available for the whole exchange.

use crate::providers::ProviderName;
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use serde::Serialize;
use thiserror::Error;

/// Header carrying the provider response identifier out-of-band
pub const RESPONSE_ID_HEADER: &str = "x-response-id";

/// Errors raised by the chat transport
#[derive(Error, Debug)]
pub enum TransportError {
    /// HTTP transport failure (connect, read, decode)
    #[error("Chat request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The chat endpoint returned a non-success status. The endpoint wraps
    /// provider failures in HTTP-200 envelopes, so this only fires on
    /// genuine transport-level trouble.
    #[error("Chat endpoint returned HTTP {0}")]
    Status(u16),
}

/// Request body sent to the chat endpoint (camelCase on the wire)
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    /// Effective system prompt, already context-augmented
    pub system_prompt: String,
    /// Response id from the most recent completed exchange, if any
    pub previous_response_id: Option<String>,
    /// The latest user message (single-turn contract)
    pub user_message: String,
    /// Model selector
    pub model: String,
    /// Provider API key from the local credential store
    pub provider_api_key: String,
    /// Resolved provider
    pub provider_name: ProviderName,
}

/// A live exchange: optional out-of-band response id plus the body stream
pub struct Exchange {
    /// Provider response identifier captured from the response headers
    pub response_id: Option<String>,
    /// Incremental text chunks of the streamed body
    pub chunks: BoxStream<'static, Result<String, TransportError>>,
}

/// Transport seam for sending one chat request
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Send the request and return the live exchange
    async fn send(&self, request: ChatRequest) -> Result<Exchange, TransportError>;
}

/// HTTP transport against the chat endpoint
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTransport {
    /// Create a transport for the given chat endpoint URL
    pub fn new(client: reqwest::Client, endpoint: String) -> Self {
        Self { client, endpoint }
    }
}

#[async_trait]
impl ChatTransport for HttpTransport {
    async fn send(&self, request: ChatRequest) -> Result<Exchange, TransportError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }

        let response_id = response
            .headers()
            .get(RESPONSE_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        let chunks = response
            .bytes_stream()
            .map(|item| match item {
                Ok(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
                Err(e) => Err(TransportError::from(e)),
            })
            .boxed();

        Ok(Exchange {
            response_id,
            chunks,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;
    use serial_test::serial;

    fn request() -> ChatRequest {
        ChatRequest {
            system_prompt: "base".to_string(),
            previous_response_id: None,
            user_message: "Hello".to_string(),
            model: "gpt-4o-mini".to_string(),
            provider_api_key: "sk-test".to_string(),
            provider_name: ProviderName::OpenAi,
        }
    }

    #[tokio::test]
    #[serial]
    async fn test_send_captures_response_id_header() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api/chat")
            .match_header("content-type", "application/json")
            .with_status(200)
            .with_header(RESPONSE_ID_HEADER, "resp-42")
            .with_body("{\"description\": \"Hello\"}")
            .create_async()
            .await;

        let transport = HttpTransport::new(
            reqwest::Client::new(),
            format!("{}/api/chat", server.url()),
        );
        let mut exchange = transport.send(request()).await.unwrap();

        mock.assert_async().await;
        assert_eq!(exchange.response_id.as_deref(), Some("resp-42"));

        let mut body = String::new();
        while let Some(chunk) = exchange.chunks.next().await {
            body.push_str(&chunk.unwrap());
        }
        assert_eq!(body, "{\"description\": \"Hello\"}");
    }

    #[tokio::test]
    #[serial]
    async fn test_send_surfaces_transport_status() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api/chat")
            .with_status(502)
            .create_async()
            .await;

        let transport = HttpTransport::new(
            reqwest::Client::new(),
            format!("{}/api/chat", server.url()),
        );
        let result = transport.send(request()).await;

        mock.assert_async().await;
        assert!(matches!(result, Err(TransportError::Status(502))));
    }

    #[test]
    fn test_request_serializes_camel_case() {
        let json = serde_json::to_string(&request()).unwrap();
        assert!(json.contains("\"systemPrompt\""));
        assert!(json.contains("\"userMessage\""));
        assert!(json.contains("\"providerApiKey\""));
        assert!(json.contains("\"providerName\":\"openai\""));
    }
}
