//! Conversation history endpoints
//!
//! Read-only endpoints backing the history drawer: list a user's
//! conversations and fetch one conversation's messages. Both go through
//! the message store, so the GraphQL-first/database-fallback behavior
//! applies here too.

use crate::api::SharedState;
use crate::error::AppError;
use crate::store::ConversationStore;
use axum::extract::{Path, Query, State};
use axum::response::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Query parameters for the conversation listing
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListConversationsParams {
    /// Owner whose conversations to list
    pub owner_id: String,
}

/// Conversation response
#[derive(Debug, Serialize)]
pub struct ConversationResponse {
    /// Conversation unique identifier
    pub id: String,
    /// Conversation title (unset until the first exchange completes)
    pub title: Option<String>,
    /// Latest assistant response text, if any
    pub description: Option<String>,
    /// Response id threaded into the next exchange
    pub previous_response_id: Option<String>,
    /// Unix timestamp when the conversation was created
    pub created_at: i64,
    /// Unix timestamp when the conversation was last updated
    pub updated_at: i64,
}

/// Message response
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    /// Message unique identifier
    pub id: String,
    /// ID of the conversation this message belongs to
    pub conversation_id: String,
    /// Message role ("user", "assistant" or "system")
    pub role: String,
    /// Message content
    pub content: String,
    /// Provider response id attached to this turn, if any
    pub provider_response_id: Option<String>,
    /// Unix timestamp when the message was created
    pub created_at: i64,
}

/// GET /api/conversations?ownerId=... - list a user's conversations,
/// most recently updated first
pub async fn list_conversations(
    State(state): State<SharedState>,
    Query(params): Query<ListConversationsParams>,
) -> Result<Json<Vec<ConversationResponse>>, AppError> {
    if params.owner_id.trim().is_empty() {
        return Err(AppError::InvalidRequest(
            "ownerId cannot be empty".to_string(),
        ));
    }

    let conversations = state.store.get_user_conversations(&params.owner_id).await?;

    let responses: Vec<ConversationResponse> = conversations
        .into_iter()
        .map(|c| ConversationResponse {
            id: c.id,
            title: c.title,
            description: c.description,
            previous_response_id: c.previous_response_id,
            created_at: c.created_at,
            updated_at: c.updated_at,
        })
        .collect();

    Ok(Json(responses))
}

/// GET /api/conversations/:id/messages - fetch one conversation's messages,
/// creation time ascending
pub async fn get_conversation_messages(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<MessageResponse>>, AppError> {
    // Conversation ids are store-assigned UUIDs; reject anything else
    // before it reaches storage.
    if Uuid::parse_str(&id).is_err() {
        return Err(AppError::InvalidRequest(format!(
            "Malformed conversation id: {}",
            id
        )));
    }

    let messages = state.store.get_conversation_messages(&id).await?;

    let responses: Vec<MessageResponse> = messages
        .into_iter()
        .map(|m| MessageResponse {
            id: m.id,
            conversation_id: m.conversation_id,
            role: m.role,
            content: m.content,
            provider_response_id: m.provider_response_id,
            created_at: m.created_at,
        })
        .collect();

    Ok(Json(responses))
}
