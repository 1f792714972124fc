//! Application configuration
//!
//! Centralized configuration management with environment variable support
//! and sensible defaults.

use std::env;
use std::path::PathBuf;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,
    /// Chat storage configuration
    pub storage: StorageConfig,
    /// GraphQL endpoint configuration (primary message store path)
    pub graphql: GraphqlConfig,
    /// Retrieval context configuration
    pub context: ContextConfig,
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to bind the server to
    pub port: u16,
    /// Host address to bind to
    pub host: String,
}

/// Chat storage configuration
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Path to the SQLite database file used as the direct-database fallback
    pub db_path: String,
    /// Path to the per-provider credential file
    pub credentials_path: PathBuf,
}

/// GraphQL endpoint configuration
///
/// When no endpoint is configured the message store runs database-only.
#[derive(Debug, Clone)]
pub struct GraphqlConfig {
    /// GraphQL endpoint URL (optional)
    pub endpoint: Option<String>,
    /// Shared secret sent with each GraphQL request (optional)
    pub secret: Option<String>,
}

/// Retrieval context configuration
///
/// Used by the `/api/context` endpoint to summarize an OpenAI vector store.
#[derive(Debug, Clone)]
pub struct ContextConfig {
    /// OpenAI API key for the vector store lookup (optional)
    pub openai_api_key: Option<String>,
    /// Vector store identifier (optional)
    pub vector_store_id: Option<String>,
}

impl Config {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        let data_dir = env::var("DATA_DIR").unwrap_or_else(|_| {
            // Default to ~/.ai-manager or current directory
            if let Some(home) = env::var_os("HOME") {
                format!("{}/.ai-manager", home.to_string_lossy())
            } else {
                ".ai-manager".to_string()
            }
        });

        Self {
            server: ServerConfig {
                port: env::var("PORT")
                    .ok()
                    .and_then(|p| p.parse().ok())
                    .unwrap_or(8080),
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            },
            storage: StorageConfig {
                db_path: env::var("DATABASE_PATH")
                    .unwrap_or_else(|_| format!("{}/chats.db", data_dir)),
                credentials_path: env::var("CREDENTIALS_PATH")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from(format!("{}/credentials.json", data_dir))),
            },
            graphql: GraphqlConfig {
                endpoint: env::var("GRAPHQL_ENDPOINT").ok().filter(|v| !v.is_empty()),
                secret: env::var("GRAPHQL_SECRET").ok().filter(|v| !v.is_empty()),
            },
            context: ContextConfig {
                openai_api_key: env::var("OPENAI_API_KEY").ok().filter(|v| !v.is_empty()),
                vector_store_id: env::var("VECTOR_STORE_ID").ok().filter(|v| !v.is_empty()),
            },
        }
    }

    /// Get the server address as a string
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
