//! Message store
//!
//! Durable storage for conversations and messages. The primary path targets
//! a GraphQL endpoint; on any GraphQL failure the same logical operation is
//! retried once against the direct SQLite interface with equivalent
//! semantics. The fallback is transparent to callers.

pub mod db;
pub mod graphql;
pub mod models;

pub use db::ChatDb;
pub use graphql::GraphQlClient;
pub use models::{
    Conversation, ConversationUpdate, Message, MessageRole, NewConversation, NewMessage,
};

use async_trait::async_trait;
use thiserror::Error;
use tracing::warn;

/// Errors raised by the message store
#[derive(Error, Debug)]
pub enum StoreError {
    /// Database-level failure
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// HTTP transport failure on the GraphQL path
    #[error("GraphQL transport error: {0}")]
    Http(#[from] reqwest::Error),

    /// The GraphQL endpoint rejected the operation
    #[error("GraphQL error: {0}")]
    Graphql(String),

    /// File system failure (database directory creation and the like)
    #[error("IO error: {0}")]
    Io(String),
}

/// Storage seam for conversations and messages.
///
/// The session reconciler only ever talks to this trait, so tests can swap
/// in recording or scripted implementations.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Create a conversation and return the store-assigned id (blocking
    /// from the caller's point of view: the id must exist before any
    /// message referencing it is written)
    async fn create_conversation(&self, new: NewConversation) -> Result<String, StoreError>;

    /// Update conversation metadata; unset fields are left unchanged.
    /// Last-write-wins by id, no optimistic concurrency control.
    async fn update_conversation(
        &self,
        id: &str,
        update: ConversationUpdate,
    ) -> Result<(), StoreError>;

    /// Append a message to an existing conversation
    async fn create_message(&self, message: NewMessage) -> Result<(), StoreError>;

    /// List a user's conversations, most recently updated first
    async fn get_user_conversations(&self, owner_id: &str) -> Result<Vec<Conversation>, StoreError>;

    /// List a conversation's messages, creation time ascending
    async fn get_conversation_messages(
        &self,
        conversation_id: &str,
    ) -> Result<Vec<Message>, StoreError>;
}

/// GraphQL-first message store with a direct-database fallback.
///
/// When no GraphQL client is configured the store runs database-only.
pub struct MessageStore {
    graphql: Option<GraphQlClient>,
    db: ChatDb,
}

impl MessageStore {
    /// Build a store from an optional GraphQL client and the SQLite fallback
    pub fn new(graphql: Option<GraphQlClient>, db: ChatDb) -> Self {
        Self { graphql, db }
    }
}

#[async_trait]
impl ConversationStore for MessageStore {
    async fn create_conversation(&self, new: NewConversation) -> Result<String, StoreError> {
        if let Some(graphql) = &self.graphql {
            match graphql.create_conversation(&new).await {
                Ok(id) => return Ok(id),
                Err(e) => warn!(
                    error = %e,
                    "GraphQL create_conversation failed, falling back to database"
                ),
            }
        }
        self.db.create_conversation(&new).await
    }

    async fn update_conversation(
        &self,
        id: &str,
        update: ConversationUpdate,
    ) -> Result<(), StoreError> {
        if let Some(graphql) = &self.graphql {
            match graphql.update_conversation(id, &update).await {
                Ok(()) => return Ok(()),
                Err(e) => warn!(
                    conversation_id = %id,
                    error = %e,
                    "GraphQL update_conversation failed, falling back to database"
                ),
            }
        }
        self.db.update_conversation(id, &update).await
    }

    async fn create_message(&self, message: NewMessage) -> Result<(), StoreError> {
        if let Some(graphql) = &self.graphql {
            match graphql.create_message(&message).await {
                Ok(()) => return Ok(()),
                Err(e) => warn!(
                    conversation_id = %message.conversation_id,
                    error = %e,
                    "GraphQL create_message failed, falling back to database"
                ),
            }
        }
        self.db.create_message(&message).await
    }

    async fn get_user_conversations(&self, owner_id: &str) -> Result<Vec<Conversation>, StoreError> {
        if let Some(graphql) = &self.graphql {
            match graphql.get_user_conversations(owner_id).await {
                Ok(conversations) => return Ok(conversations),
                Err(e) => warn!(
                    error = %e,
                    "GraphQL get_user_conversations failed, falling back to database"
                ),
            }
        }
        self.db.get_user_conversations(owner_id).await
    }

    async fn get_conversation_messages(
        &self,
        conversation_id: &str,
    ) -> Result<Vec<Message>, StoreError> {
        if let Some(graphql) = &self.graphql {
            match graphql.get_conversation_messages(conversation_id).await {
                Ok(messages) => return Ok(messages),
                Err(e) => warn!(
                    conversation_id = %conversation_id,
                    error = %e,
                    "GraphQL get_conversation_messages failed, falling back to database"
                ),
            }
        }
        self.db.get_messages(conversation_id).await
    }
}
