//! Retrieval context endpoint
//!
//! `GET /api/context` summarizes the documents available in an OpenAI
//! vector store. The summary is concatenated onto the system prompt by the
//! session reconciler. Every failure path degrades to a usable placeholder
//! string with HTTP 200; this endpoint never errors.

use crate::api::SharedState;
use axum::extract::State;
use axum::response::Json;
use serde::{Deserialize, Serialize};
use tracing::error;

const OPENAI_API_BASE_URL: &str = "https://api.openai.com/v1";

/// Maximum number of file ids listed in the summary
const MAX_LISTED_FILES: usize = 5;

/// Context response body
#[derive(Debug, Serialize, Deserialize)]
pub struct ContextResponse {
    /// Plain-text summary of the knowledge base
    pub context: String,
}

#[derive(Debug, Deserialize)]
struct VectorStoreFileList {
    #[serde(default)]
    data: Vec<VectorStoreFile>,
}

#[derive(Debug, Deserialize)]
struct VectorStoreFile {
    id: String,
}

/// GET /api/context - summarize the configured vector store
pub async fn get_context(State(state): State<SharedState>) -> Json<ContextResponse> {
    let context = match (
        &state.config.context.openai_api_key,
        &state.config.context.vector_store_id,
    ) {
        (Some(api_key), Some(store_id)) => {
            vector_store_context(&state.http, api_key, store_id, OPENAI_API_BASE_URL).await
        }
        _ => "No vector store ID or openai API key found.".to_string(),
    };
    Json(ContextResponse { context })
}

/// Build the context summary, degrading to placeholders on any failure
async fn vector_store_context(
    client: &reqwest::Client,
    api_key: &str,
    store_id: &str,
    base_url: &str,
) -> String {
    match fetch_vector_store_files(client, api_key, store_id, base_url).await {
        Ok(files) if files.is_empty() => "No documents found in vector store.".to_string(),
        Ok(files) => {
            let file_info: String = files
                .iter()
                .take(MAX_LISTED_FILES)
                .map(|file| format!("- {}", file.id))
                .collect::<Vec<_>>()
                .join("\n");
            format!(
                "Found {} documents in vector store.\nTop files:\n{}",
                files.len(),
                file_info
            )
        }
        Err(e) => {
            error!(error = %e, "Vector store context lookup failed");
            "Vector store context unavailable.".to_string()
        }
    }
}

async fn fetch_vector_store_files(
    client: &reqwest::Client,
    api_key: &str,
    store_id: &str,
    base_url: &str,
) -> Result<Vec<VectorStoreFile>, reqwest::Error> {
    let response = client
        .get(format!("{}/vector_stores/{}/files", base_url, store_id))
        .bearer_auth(api_key)
        .send()
        .await?
        .error_for_status()?;

    let list: VectorStoreFileList = response.json().await?;
    Ok(list.data)
}
