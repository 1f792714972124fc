//! API module
//!
//! Contains HTTP request handlers for the chat, context and conversation
//! endpoints.

pub mod chat;
pub mod context;
pub mod conversations;

use crate::config::Config;
use crate::store::MessageStore;
use std::sync::Arc;

/// Shared state handed to every handler
pub struct ServerState {
    /// Shared HTTP client (connection pooling across provider calls)
    pub http: reqwest::Client,
    /// Loaded configuration
    pub config: Config,
    /// Message store (GraphQL-first, database fallback)
    pub store: Arc<MessageStore>,
}

/// Axum state alias
pub type SharedState = Arc<ServerState>;
