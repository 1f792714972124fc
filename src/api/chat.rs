//! Chat endpoint
//!
//! `POST /api/chat` routes a single-turn chat request to the resolved
//! provider and streams the model output back as the response body. On any
//! failure — unknown provider, missing credential, provider rejection —
//! the endpoint responds with HTTP **200** and an error envelope
//! `{"description": ..., "error": true, "timestamp": ...}` so the client
//! parser always has one body shape to branch on. Genuine transport errors
//! are the only thing a client ever sees as non-200.

use crate::api::SharedState;
use crate::error::AppError;
use crate::prompt;
use crate::providers::{self, classify, ChatPrompt, ProviderError, ProviderName, ProviderStream};
use crate::session::transport::RESPONSE_ID_HEADER;
use axum::body::Body;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_PROVIDER: &str = "openai";

/// Chat request body (camelCase on the wire)
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatApiRequest {
    /// System prompt; blank or absent falls back to the built-in default
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// Response id from the previous exchange. Carried for providers that
    /// chain responses server-side; not forwarded to the completion call.
    #[serde(default)]
    pub previous_response_id: Option<String>,
    /// The user message for this turn
    pub user_message: String,
    /// Model identifier; defaults to `gpt-4o-mini`
    #[serde(default)]
    pub model: Option<String>,
    /// Provider API key; a request is never forwarded without one
    #[serde(default)]
    pub provider_api_key: Option<String>,
    /// Provider name; defaults to `openai`
    #[serde(default)]
    pub provider_name: Option<String>,
}

/// Error envelope returned with HTTP 200 on any failure
#[derive(Debug, Serialize, Deserialize)]
pub struct ChatErrorBody {
    /// User-facing explanation (classified from the raw error)
    pub description: String,
    /// Always `true`
    pub error: bool,
    /// RFC-3339 timestamp of the failure
    pub timestamp: String,
}

/// POST /api/chat - stream a single-turn completion
pub async fn chat(
    State(state): State<SharedState>,
    Json(request): Json<ChatApiRequest>,
) -> Response {
    match run_chat(&state, request).await {
        Ok(response) => response,
        Err(err) => {
            error!(error = %err, "Chat request failed");
            error_response(&err.to_string())
        }
    }
}

async fn run_chat(
    state: &crate::api::ServerState,
    request: ChatApiRequest,
) -> Result<Response, AppError> {
    let system_prompt = request
        .system_prompt
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| prompt::SYSTEM_PROMPT.to_string());
    let model = request
        .model
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_MODEL.to_string());
    let provider_name = request
        .provider_name
        .filter(|p| !p.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_PROVIDER.to_string());

    let provider = ProviderName::from_name(&provider_name)
        .ok_or_else(|| ProviderError::UnknownProvider(provider_name.clone()))?;

    let api_key = request
        .provider_api_key
        .as_deref()
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ProviderError::MissingApiKey(provider.to_string()))?;

    info!(
        provider = %provider,
        model = %model,
        previous_response_id = ?request.previous_response_id,
        message_len = request.user_message.len(),
        "Routing chat request"
    );

    let chat_prompt = ChatPrompt {
        system_prompt: &system_prompt,
        user_message: &request.user_message,
        model: &model,
    };

    let stream = match provider {
        ProviderName::OpenAi => {
            providers::openai::stream_chat(&state.http, &api_key, &chat_prompt).await?
        }
        ProviderName::Gemini => {
            providers::gemini::stream_chat(&state.http, &api_key, &chat_prompt).await?
        }
    };

    stream_response(stream)
}

/// Build the streamed 200 response, attaching the response id header when
/// the provider reported one (OpenAI-style calls only).
fn stream_response(stream: ProviderStream) -> Result<Response, AppError> {
    let ProviderStream {
        response_id,
        mut chunks,
    } = stream;

    let body = async_stream::stream! {
        while let Some(item) = chunks.next().await {
            match item {
                Ok(text) => yield Ok::<_, std::io::Error>(text),
                Err(e) => {
                    // Headers are already sent; all that is left is to end
                    // the stream.
                    warn!(error = %e, "Provider stream failed mid-response");
                    break;
                }
            }
        }
    };

    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .header(header::CACHE_CONTROL, "no-cache");
    if let Some(id) = &response_id {
        builder = builder.header(RESPONSE_ID_HEADER, id.as_str());
    }
    builder
        .body(Body::from_stream(body))
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to build stream response: {}", e)))
}

/// Wrap a raw error string into the HTTP-200 error envelope
fn error_response(raw: &str) -> Response {
    let body = ChatErrorBody {
        description: classify::user_facing_message(raw),
        error: true,
        timestamp: Utc::now().to_rfc3339(),
    };
    (StatusCode::OK, Json(body)).into_response()
}
