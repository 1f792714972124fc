//! Client-side chat session management
//!
//! The session reconciler and its collaborators: the tagged reply parser,
//! the persistence outbox, the per-provider credential store and the chat
//! transport seam.

pub mod credentials;
pub mod outbox;
pub mod parser;
pub mod reconciler;
pub mod transport;

pub use credentials::{CredentialError, CredentialStore};
pub use outbox::{Outbox, WriteOp};
pub use parser::{classify_reply, extract_streaming_text, AssistantReply};
pub use reconciler::{
    derive_title, ConversationLoad, ConversationSummary, DisplayMessage, ExchangeEvent,
    ExchangeHandle, LoadOutcome, LoadedMessages, SessionReconciler, StreamingStatus, SubmitError,
    DEFAULT_CONVERSATION_TITLE,
};
pub use transport::{ChatRequest, ChatTransport, Exchange, HttpTransport, TransportError};
