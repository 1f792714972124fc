//! Chat data models
//!
//! Defines structures for conversations and messages.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Role of a message sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// Message from the user
    User,
    /// Message from the assistant/AI
    Assistant,
    /// System-injected message
    System,
}

impl MessageRole {
    /// Convert the role to its string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::System => "system",
        }
    }
}

impl From<&str> for MessageRole {
    fn from(s: &str) -> Self {
        match s {
            "assistant" => MessageRole::Assistant,
            "system" => MessageRole::System,
            _ => MessageRole::User,
        }
    }
}

/// A conversation thread owned by one user
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Conversation {
    /// Unique identifier, assigned by the store at creation time
    pub id: String,
    /// Identifier of the owning user
    pub owner_id: String,
    /// Role the owner held when the conversation was created
    pub owner_role: String,
    /// Short label derived from the first words of the opening message;
    /// unset until the first response completes
    pub title: Option<String>,
    /// Free-text summary, set to the latest assistant response's text
    pub description: Option<String>,
    /// Provider-issued token from the most recent completed exchange
    pub previous_response_id: Option<String>,
    /// When the conversation was created (Unix timestamp)
    pub created_at: i64,
    /// When the conversation was last updated (Unix timestamp)
    pub updated_at: i64,
}

/// Parameters for creating a conversation
#[derive(Debug, Clone)]
pub struct NewConversation {
    /// Identifier of the owning user
    pub owner_id: String,
    /// Role the owner holds at creation time
    pub owner_role: String,
    /// Response id carried over from a prior session, if any
    pub previous_response_id: Option<String>,
}

/// Optional-field update for conversation metadata.
///
/// `None` fields are left unchanged. Updates are last-write-wins by id with
/// no version check.
#[derive(Debug, Clone, Default)]
pub struct ConversationUpdate {
    /// New title, if any
    pub title: Option<String>,
    /// New description, if any
    pub description: Option<String>,
    /// New previous-response pointer, if any
    pub previous_response_id: Option<String>,
}

/// A single message in a conversation
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Message {
    /// Unique identifier for the message
    pub id: String,
    /// ID of the conversation this message belongs to
    pub conversation_id: String,
    /// Role of the message sender
    pub role: String, // Stored as "user", "assistant" or "system" in DB
    /// Content of the message
    pub content: String,
    /// Provider response id attached to this turn, if any
    pub provider_response_id: Option<String>,
    /// When the message was created (Unix timestamp)
    pub created_at: i64,
}

impl Message {
    /// Get the message role as enum
    pub fn role_enum(&self) -> MessageRole {
        MessageRole::from(self.role.as_str())
    }
}

/// Parameters for appending a message to a conversation
#[derive(Debug, Clone)]
pub struct NewMessage {
    /// Owning conversation id (the row must already exist)
    pub conversation_id: String,
    /// Role of the sender
    pub role: MessageRole,
    /// Message content (plain text / markdown)
    pub content: String,
    /// Provider response id attached to this turn, if any
    pub provider_response_id: Option<String>,
}

impl NewConversation {
    /// Convenience constructor
    pub fn new(
        owner_id: impl Into<String>,
        owner_role: impl Into<String>,
        previous_response_id: Option<String>,
    ) -> Self {
        Self {
            owner_id: owner_id.into(),
            owner_role: owner_role.into(),
            previous_response_id,
        }
    }
}

/// Current Unix timestamp in seconds
pub(crate) fn now_timestamp() -> i64 {
    Utc::now().timestamp()
}
