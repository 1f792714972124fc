//! AI Manager Backend Library
//!
//! Chat provider routing, conversation persistence and client-side session
//! management for the AI Manager dashboard feature. The main binary is in
//! `src/main.rs`; this library exposes the building blocks for tests and
//! embedding callers:
//!
//! - [`providers`] - streaming OpenAI/Gemini clients and error classification
//! - [`store`] - the GraphQL-first, database-fallback message store
//! - [`session`] - the session reconciler and its collaborators
//! - [`api`] - the HTTP handlers served by the binary

pub mod api;
pub mod config;
pub mod error;
pub mod prompt;
pub mod providers;
pub mod session;
pub mod store;
