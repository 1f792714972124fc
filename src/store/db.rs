//! Direct-database chat storage
//!
//! SQLite backend for conversations and messages. This is the fallback path
//! of the message store; the same logical operations exist on the GraphQL
//! client with equivalent semantics.

use crate::store::models::{
    now_timestamp, Conversation, ConversationUpdate, Message, NewConversation, NewMessage,
};
use crate::store::StoreError;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::{debug, info};
use uuid::Uuid;

/// Database connection pool for chat operations
pub struct ChatDb {
    pool: SqlitePool,
}

impl ChatDb {
    /// Initialize database connection pool
    ///
    /// # Arguments
    /// * `db_path` - Path to the SQLite database file
    pub async fn new(db_path: &str) -> Result<Self, StoreError> {
        // Ensure parent directory exists
        if let Some(parent) = PathBuf::from(db_path).parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Io(format!("Failed to create db directory: {}", e)))?;
        }

        // SQLite connection string format: sqlite://path/to/db.db
        let connection_string = if db_path.starts_with("sqlite:") {
            db_path.to_string()
        } else {
            format!("sqlite:{}", db_path)
        };

        let options = SqliteConnectOptions::from_str(&connection_string)?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        info!("Connected to SQLite database at: {}", db_path);

        let db = Self { pool };
        db.run_migrations().await?;

        Ok(db)
    }

    /// Run database migrations
    async fn run_migrations(&self) -> Result<(), StoreError> {
        let migration_sql = include_str!("../../migrations/001_create_chats.sql");

        // Remove comments (lines starting with --) and normalize whitespace
        let mut cleaned_sql = String::new();
        for line in migration_sql.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with("--") {
                continue;
            }
            let without_comments = if let Some(comment_pos) = trimmed.find("--") {
                &trimmed[..comment_pos]
            } else {
                trimmed
            };
            cleaned_sql.push_str(without_comments.trim());
            cleaned_sql.push(' ');
        }

        // Split by semicolon and execute each statement separately
        let statements: Vec<&str> = cleaned_sql
            .split(';')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .collect();

        for statement in statements {
            sqlx::query(statement).execute(&self.pool).await?;
        }

        debug!("Database migrations completed");
        Ok(())
    }

    /// Create a new conversation, returning the store-assigned id
    pub async fn create_conversation(&self, new: &NewConversation) -> Result<String, StoreError> {
        let id = Uuid::new_v4().to_string();
        let now = now_timestamp();

        sqlx::query(
            "INSERT INTO conversations (id, owner_id, owner_role, title, description, previous_response_id, created_at, updated_at) \
             VALUES (?, ?, ?, NULL, NULL, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&new.owner_id)
        .bind(&new.owner_role)
        .bind(&new.previous_response_id)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        debug!("Created conversation: {}", id);
        Ok(id)
    }

    /// Update conversation metadata, leaving unset fields unchanged.
    ///
    /// Last-write-wins by id; no version check.
    pub async fn update_conversation(
        &self,
        id: &str,
        update: &ConversationUpdate,
    ) -> Result<(), StoreError> {
        let updated_at = now_timestamp();
        sqlx::query(
            "UPDATE conversations SET \
             title = COALESCE(?, title), \
             description = COALESCE(?, description), \
             previous_response_id = COALESCE(?, previous_response_id), \
             updated_at = ? \
             WHERE id = ?",
        )
        .bind(&update.title)
        .bind(&update.description)
        .bind(&update.previous_response_id)
        .bind(updated_at)
        .bind(id)
        .execute(&self.pool)
        .await?;

        debug!("Updated conversation: {}", id);
        Ok(())
    }

    /// Update a conversation's updated_at timestamp (when a message lands)
    async fn touch_conversation(&self, id: &str) -> Result<(), StoreError> {
        let updated_at = now_timestamp();
        sqlx::query("UPDATE conversations SET updated_at = ? WHERE id = ?")
            .bind(updated_at)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Get a conversation by ID
    pub async fn get_conversation(&self, id: &str) -> Result<Option<Conversation>, StoreError> {
        let conversation = sqlx::query_as::<_, Conversation>(
            "SELECT id, owner_id, owner_role, title, description, previous_response_id, created_at, updated_at \
             FROM conversations WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(conversation)
    }

    /// Get a user's conversations, ordered by most recently updated
    pub async fn get_user_conversations(
        &self,
        owner_id: &str,
    ) -> Result<Vec<Conversation>, StoreError> {
        let conversations = sqlx::query_as::<_, Conversation>(
            "SELECT id, owner_id, owner_role, title, description, previous_response_id, created_at, updated_at \
             FROM conversations WHERE owner_id = ? ORDER BY updated_at DESC",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(conversations)
    }

    /// Append a message to a conversation
    pub async fn create_message(&self, message: &NewMessage) -> Result<(), StoreError> {
        let id = Uuid::new_v4().to_string();
        let now = now_timestamp();

        sqlx::query(
            "INSERT INTO messages (id, conversation_id, role, content, provider_response_id, created_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&message.conversation_id)
        .bind(message.role.as_str())
        .bind(&message.content)
        .bind(&message.provider_response_id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.touch_conversation(&message.conversation_id).await?;

        debug!(
            "Added message {} to conversation {}",
            id, message.conversation_id
        );
        Ok(())
    }

    /// Get all messages for a conversation, ordered by creation time
    /// ascending. The rowid tiebreak keeps same-second inserts in
    /// append order.
    pub async fn get_messages(&self, conversation_id: &str) -> Result<Vec<Message>, StoreError> {
        let messages = sqlx::query_as::<_, Message>(
            "SELECT id, conversation_id, role, content, provider_response_id, created_at \
             FROM messages WHERE conversation_id = ? ORDER BY created_at ASC, rowid ASC",
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(messages)
    }
}
