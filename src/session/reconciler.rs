//! Session reconciler
//!
//! Bridges ephemeral UI state and durable storage for one chat session.
//! The reconciler owns the active conversation's in-memory transcript,
//! performs lazy conversation creation, threads provider response ids,
//! drives the streaming status state machine and synchronizes finished
//! exchanges back to the message store without blocking the caller.
//!
//! The reconciler is a plain state object: `submit` starts an exchange and
//! hands back a handle, the caller feeds the handle's events into `apply`,
//! and cancellation is a generation comparison rather than a protocol.
//! Persistence writes go through the outbox so a storage failure can never
//! stall or fail a visible turn.

use crate::prompt;
use crate::providers::ProviderName;
use crate::session::credentials::CredentialStore;
use crate::session::outbox::{Outbox, WriteOp};
use crate::session::parser::{self, AssistantReply};
use crate::session::transport::{ChatRequest, ChatTransport, TransportError};
use crate::store::{
    Conversation, ConversationStore, ConversationUpdate, Message, MessageRole, NewConversation,
    NewMessage, StoreError,
};
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, warn};
use uuid::Uuid;

/// Title shown for a conversation before its first exchange completes
pub const DEFAULT_CONVERSATION_TITLE: &str = "New conversation";

/// Number of leading words of the opening message used as the title
const TITLE_MAX_WORDS: usize = 5;

/// Streaming status of the active exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamingStatus {
    /// No exchange in flight
    Idle,
    /// Request sent, no output received yet
    Submitted,
    /// First chunk has arrived
    Streaming,
}

/// One entry of the in-memory transcript
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayMessage {
    /// Client-side identifier (not the store's message id)
    pub id: String,
    /// Role of the sender
    pub role: MessageRole,
    /// Displayable content
    pub content: String,
}

impl DisplayMessage {
    fn new(role: MessageRole, content: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content,
        }
    }
}

impl From<Message> for DisplayMessage {
    fn from(message: Message) -> Self {
        Self {
            role: message.role_enum(),
            id: message.id,
            content: message.content,
        }
    }
}

/// Summary entry of the conversation index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationSummary {
    /// Conversation id
    pub id: String,
    /// Display title
    pub title: String,
    /// Latest assistant response text, if any
    pub description: Option<String>,
    /// Response id threaded into the next exchange
    pub previous_response_id: Option<String>,
    /// Last mutation time (Unix timestamp)
    pub updated_at: i64,
}

impl From<Conversation> for ConversationSummary {
    fn from(conversation: Conversation) -> Self {
        Self {
            id: conversation.id,
            title: conversation
                .title
                .unwrap_or_else(|| DEFAULT_CONVERSATION_TITLE.to_string()),
            description: conversation.description,
            previous_response_id: conversation.previous_response_id,
            updated_at: conversation.updated_at,
        }
    }
}

/// Reasons a submit call does not start an exchange
#[derive(Error, Debug)]
pub enum SubmitError {
    /// The message was empty after trimming
    #[error("Message is empty")]
    EmptyInput,

    /// An exchange is already in flight for this session
    #[error("An exchange is already in flight")]
    Busy,

    /// The model selector matched no known provider (fails closed)
    #[error("No provider matches model selector: {0}")]
    NoProvider(String),

    /// No API key is stored for the resolved provider; the caller should
    /// prompt for one — the request was not sent
    #[error("No API key stored for {0}")]
    CredentialRequired(ProviderName),

    /// The awaited conversation creation failed
    #[error("Failed to create conversation: {0}")]
    Store(#[from] StoreError),

    /// The chat request itself failed at the transport level
    #[error("Chat transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Event produced by an in-flight exchange
#[derive(Debug)]
pub enum ExchangeEvent {
    /// An incremental chunk of raw output text
    Chunk {
        /// Exchange generation this event belongs to
        generation: u64,
        /// Raw text fragment
        text: String,
    },
    /// The stream terminated successfully
    Completed {
        /// Exchange generation this event belongs to
        generation: u64,
        /// Full concatenated raw output
        raw: String,
        /// Provider response id captured out-of-band, if any
        response_id: Option<String>,
    },
    /// The stream failed at the transport level
    Failed {
        /// Exchange generation this event belongs to
        generation: u64,
        /// Human-readable error text
        message: String,
    },
}

impl ExchangeEvent {
    fn generation(&self) -> u64 {
        match self {
            ExchangeEvent::Chunk { generation, .. }
            | ExchangeEvent::Completed { generation, .. }
            | ExchangeEvent::Failed { generation, .. } => *generation,
        }
    }
}

/// Handle to an in-flight exchange.
///
/// The caller pulls events from the handle and feeds each one into
/// [`SessionReconciler::apply`]. Dropping the handle abandons the stream;
/// already-issued persistence writes still complete independently.
pub struct ExchangeHandle {
    generation: u64,
    response_id: Option<String>,
    chunks: BoxStream<'static, Result<String, TransportError>>,
    raw: String,
    finished: bool,
}

impl ExchangeHandle {
    /// Pull the next event, or `None` once the exchange has ended
    pub async fn next_event(&mut self) -> Option<ExchangeEvent> {
        if self.finished {
            return None;
        }
        match self.chunks.next().await {
            Some(Ok(text)) => {
                self.raw.push_str(&text);
                Some(ExchangeEvent::Chunk {
                    generation: self.generation,
                    text,
                })
            }
            Some(Err(e)) => {
                self.finished = true;
                Some(ExchangeEvent::Failed {
                    generation: self.generation,
                    message: e.to_string(),
                })
            }
            None => {
                self.finished = true;
                Some(ExchangeEvent::Completed {
                    generation: self.generation,
                    raw: std::mem::take(&mut self.raw),
                    response_id: self.response_id.take(),
                })
            }
        }
    }
}

/// Ticket for an asynchronous conversation load
#[derive(Debug, Clone)]
pub struct ConversationLoad {
    conversation_id: String,
    epoch: u64,
}

/// Result of fetching a conversation's messages, tagged with its ticket
pub struct LoadedMessages {
    conversation_id: String,
    epoch: u64,
    result: Result<Vec<Message>, StoreError>,
}

/// Outcome of applying a finished conversation load
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The transcript was replaced with the loaded messages
    Applied,
    /// The conversation had no messages; the active id was cleared (stale
    /// URL parameter case) and the caller should strip it from the URL
    Cleared,
    /// A newer selection superseded this load; nothing changed
    Stale,
    /// The load failed; the previous transcript is retained
    Failed,
}

/// Client-side orchestrator for one chat session
pub struct SessionReconciler {
    owner_id: String,
    owner_role: String,
    store: Arc<dyn ConversationStore>,
    transport: Arc<dyn ChatTransport>,
    credentials: CredentialStore,
    outbox: Outbox,
    system_prompt: String,
    retrieval_context: Option<String>,

    active_conversation_id: Option<String>,
    transcript: Vec<DisplayMessage>,
    conversations: Vec<ConversationSummary>,
    status: StreamingStatus,
    pending_error: Option<String>,

    /// Ties stream events to the submit call that created them
    generation: u64,
    /// Ties load results to the selection that requested them
    load_epoch: u64,
    /// Accumulated raw output of the in-flight exchange
    pending_raw: String,
    /// Transcript index of the partial assistant message, if one exists
    pending_assistant: Option<usize>,
}

impl SessionReconciler {
    /// Create a reconciler for one user session.
    ///
    /// Must be called inside a Tokio runtime: the persistence outbox spawns
    /// its drain task here.
    pub fn new(
        owner_id: impl Into<String>,
        owner_role: impl Into<String>,
        store: Arc<dyn ConversationStore>,
        transport: Arc<dyn ChatTransport>,
        credentials: CredentialStore,
    ) -> Self {
        let outbox = Outbox::spawn(store.clone());
        Self {
            owner_id: owner_id.into(),
            owner_role: owner_role.into(),
            store,
            transport,
            credentials,
            outbox,
            system_prompt: prompt::SYSTEM_PROMPT.to_string(),
            retrieval_context: None,
            active_conversation_id: None,
            transcript: Vec::new(),
            conversations: Vec::new(),
            status: StreamingStatus::Idle,
            pending_error: None,
            generation: 0,
            load_epoch: 0,
            pending_raw: String::new(),
            pending_assistant: None,
        }
    }

    /// Replace the base system prompt
    pub fn set_system_prompt(&mut self, system_prompt: impl Into<String>) {
        self.system_prompt = system_prompt.into();
    }

    /// Cache retrieval context; it is concatenated onto the system prompt
    /// of every subsequent request
    pub fn set_retrieval_context(&mut self, context: impl Into<String>) {
        self.retrieval_context = Some(context.into());
    }

    /// Current streaming status
    pub fn status(&self) -> StreamingStatus {
        self.status
    }

    /// The in-memory transcript currently displayed
    pub fn transcript(&self) -> &[DisplayMessage] {
        &self.transcript
    }

    /// The conversation index, most recently updated first
    pub fn conversations(&self) -> &[ConversationSummary] {
        &self.conversations
    }

    /// Active conversation id, if one exists yet
    pub fn active_conversation_id(&self) -> Option<&str> {
        self.active_conversation_id.as_deref()
    }

    /// Error text from the last failed exchange, if any
    pub fn pending_error(&self) -> Option<&str> {
        self.pending_error.as_deref()
    }

    /// Mutable access to the credential store (settings UI)
    pub fn credentials_mut(&mut self) -> &mut CredentialStore {
        &mut self.credentials
    }

    /// Load the user's conversation summaries from the store.
    ///
    /// A failure leaves the index empty and is logged only.
    pub async fn refresh_conversation_index(&mut self) {
        match self.store.get_user_conversations(&self.owner_id).await {
            Ok(conversations) => {
                self.conversations = conversations
                    .into_iter()
                    .map(ConversationSummary::from)
                    .collect();
            }
            Err(e) => error!(error = %e, "Failed to load conversation index"),
        }
    }

    /// Start a new exchange with the given user text and model selector.
    ///
    /// On success the returned handle must be driven to completion (or
    /// abandoned) by the caller, feeding each event into [`Self::apply`].
    ///
    /// # Errors
    /// Fails closed without sending anything on empty input, a busy
    /// session, an unresolvable model selector or a missing credential;
    /// the credential case signals that a credential-entry prompt should
    /// be shown. Conversation creation is the one awaited store call and
    /// its failure aborts the turn.
    pub async fn submit(
        &mut self,
        user_text: &str,
        model_selector: &str,
    ) -> Result<ExchangeHandle, SubmitError> {
        let text = user_text.trim();
        if text.is_empty() {
            return Err(SubmitError::EmptyInput);
        }
        if self.status != StreamingStatus::Idle {
            return Err(SubmitError::Busy);
        }

        let provider = ProviderName::from_selector(model_selector)
            .ok_or_else(|| SubmitError::NoProvider(model_selector.to_string()))?;
        let api_key = self
            .credentials
            .api_key(provider)
            .map(str::to_string)
            .ok_or(SubmitError::CredentialRequired(provider))?;

        let previous_response_id = self
            .active_conversation_id
            .as_ref()
            .and_then(|id| self.conversations.iter().find(|c| c.id == *id))
            .and_then(|c| c.previous_response_id.clone());

        // Lazy creation: the id must exist before the first assistant reply
        // can land, so this is the one awaited store call.
        let conversation_id = match &self.active_conversation_id {
            Some(id) => id.clone(),
            None => {
                let id = self
                    .store
                    .create_conversation(NewConversation::new(
                        self.owner_id.clone(),
                        self.owner_role.clone(),
                        previous_response_id.clone(),
                    ))
                    .await?;
                debug!(conversation_id = %id, "Created conversation");
                self.active_conversation_id = Some(id.clone());
                self.conversations.insert(
                    0,
                    ConversationSummary {
                        id: id.clone(),
                        title: DEFAULT_CONVERSATION_TITLE.to_string(),
                        description: None,
                        previous_response_id: previous_response_id.clone(),
                        updated_at: chrono::Utc::now().timestamp(),
                    },
                );
                id
            }
        };

        // Transcript first, persistence second: the UI never waits on
        // storage.
        self.transcript
            .push(DisplayMessage::new(MessageRole::User, text.to_string()));
        self.pending_error = None;
        self.pending_raw.clear();
        self.pending_assistant = None;
        self.status = StreamingStatus::Submitted;
        self.generation += 1;
        let generation = self.generation;

        self.outbox.enqueue(WriteOp::CreateMessage(NewMessage {
            conversation_id: conversation_id.clone(),
            role: MessageRole::User,
            content: text.to_string(),
            provider_response_id: previous_response_id.clone(),
        }));

        let request = ChatRequest {
            system_prompt: prompt::with_context(
                &self.system_prompt,
                self.retrieval_context.as_deref(),
            ),
            previous_response_id,
            user_message: text.to_string(),
            model: model_selector.to_string(),
            provider_api_key: api_key,
            provider_name: provider,
        };

        match self.transport.send(request).await {
            Ok(exchange) => Ok(ExchangeHandle {
                generation,
                response_id: exchange.response_id,
                chunks: exchange.chunks,
                raw: String::new(),
                finished: false,
            }),
            Err(e) => {
                self.exchange_failed(e.to_string());
                Err(e.into())
            }
        }
    }

    /// Apply one event from an in-flight exchange.
    ///
    /// Events from a cancelled exchange (older generation) are discarded.
    pub fn apply(&mut self, event: ExchangeEvent) {
        if event.generation() != self.generation {
            debug!("Ignoring event from a cancelled exchange");
            return;
        }
        match event {
            ExchangeEvent::Chunk { text, .. } => {
                if self.status == StreamingStatus::Submitted {
                    self.status = StreamingStatus::Streaming;
                }
                self.pending_raw.push_str(&text);
                let display = parser::extract_streaming_text(&self.pending_raw);
                match self.pending_assistant {
                    Some(index) => self.transcript[index].content = display,
                    None => {
                        self.transcript
                            .push(DisplayMessage::new(MessageRole::Assistant, display));
                        self.pending_assistant = Some(self.transcript.len() - 1);
                    }
                }
            }
            ExchangeEvent::Completed {
                raw, response_id, ..
            } => self.exchange_completed(&raw, response_id),
            ExchangeEvent::Failed { message, .. } => self.exchange_failed(message),
        }
    }

    /// Finish a successful stream: classify the output, settle the
    /// transcript and enqueue the persistence writes.
    fn exchange_completed(&mut self, raw: &str, response_id: Option<String>) {
        self.status = StreamingStatus::Idle;
        self.pending_raw.clear();

        let content = match parser::classify_reply(raw) {
            AssistantReply::ProviderError(description) => {
                // Provider-reported failure: surface it, persist nothing.
                warn!(description = %description, "Provider returned an error response");
                if let Some(index) = self.pending_assistant.take() {
                    self.transcript[index].content = description.clone();
                }
                self.pending_error = Some(description);
                return;
            }
            AssistantReply::Reply(text) => text,
            AssistantReply::Malformed(raw_text) => raw_text,
        };

        self.pending_error = None;
        match self.pending_assistant.take() {
            Some(index) => self.transcript[index].content = content.clone(),
            None => {
                if !content.is_empty() {
                    self.transcript
                        .push(DisplayMessage::new(MessageRole::Assistant, content.clone()));
                }
            }
        }

        let conversation_id = match &self.active_conversation_id {
            Some(id) => id.clone(),
            None => {
                warn!("Exchange completed without an active conversation; skipping persistence");
                return;
            }
        };

        let title = self.last_user_text().map(|text| derive_title(&text));

        if !content.trim().is_empty() {
            self.outbox.enqueue(WriteOp::CreateMessage(NewMessage {
                conversation_id: conversation_id.clone(),
                role: MessageRole::Assistant,
                content: content.clone(),
                provider_response_id: response_id.clone(),
            }));
        }
        self.outbox.enqueue(WriteOp::UpdateConversation {
            id: conversation_id.clone(),
            update: ConversationUpdate {
                title: title.clone(),
                description: Some(content.clone()),
                previous_response_id: response_id.clone(),
            },
        });

        // Keep the in-memory index in step with what was just enqueued.
        let now = chrono::Utc::now().timestamp();
        if let Some(index) = self
            .conversations
            .iter()
            .position(|c| c.id == conversation_id)
        {
            let entry = &mut self.conversations[index];
            if let Some(title) = title {
                entry.title = title;
            }
            entry.description = Some(content);
            entry.previous_response_id = response_id;
            entry.updated_at = now;
        } else {
            self.conversations.push(ConversationSummary {
                id: conversation_id,
                title: title.unwrap_or_else(|| DEFAULT_CONVERSATION_TITLE.to_string()),
                description: Some(content),
                previous_response_id: response_id,
                updated_at: now,
            });
        }
        self.conversations
            .sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    }

    /// Finish a failed stream: a synthetic assistant message lands in the
    /// transcript only; conversation metadata is untouched and nothing is
    /// persisted.
    fn exchange_failed(&mut self, message: String) {
        self.status = StreamingStatus::Idle;
        self.pending_raw.clear();
        self.pending_error = Some(message.clone());
        match self.pending_assistant.take() {
            Some(index) => self.transcript[index].content = message,
            None => self
                .transcript
                .push(DisplayMessage::new(MessageRole::Assistant, message)),
        }
    }

    /// Select a conversation and get a ticket for loading its messages.
    ///
    /// Any in-flight exchange is cancelled (its remaining events will be
    /// discarded). The current transcript is retained until the load is
    /// applied, so the user never sees a mismatched id/messages pairing.
    pub fn select_conversation(&mut self, id: &str) -> ConversationLoad {
        self.cancel_in_flight();
        self.active_conversation_id = Some(id.to_string());
        self.load_epoch += 1;
        ConversationLoad {
            conversation_id: id.to_string(),
            epoch: self.load_epoch,
        }
    }

    /// Fetch the messages for a selection ticket
    pub async fn fetch_messages(&self, load: &ConversationLoad) -> LoadedMessages {
        let result = self
            .store
            .get_conversation_messages(&load.conversation_id)
            .await;
        LoadedMessages {
            conversation_id: load.conversation_id.clone(),
            epoch: load.epoch,
            result,
        }
    }

    /// Apply a finished load, replacing the transcript atomically.
    ///
    /// Loads that no longer match the active selection are discarded.
    pub fn apply_loaded_messages(&mut self, loaded: LoadedMessages) -> LoadOutcome {
        let still_active = self.load_epoch == loaded.epoch
            && self.active_conversation_id.as_deref() == Some(loaded.conversation_id.as_str());
        if !still_active {
            return LoadOutcome::Stale;
        }

        match loaded.result {
            Ok(messages) if messages.is_empty() => {
                // A persisted conversation always has at least its opening
                // message; an empty result means the id was stale (e.g. a
                // dead URL parameter).
                self.active_conversation_id = None;
                self.transcript.clear();
                LoadOutcome::Cleared
            }
            Ok(messages) => {
                self.transcript = messages.into_iter().map(DisplayMessage::from).collect();
                LoadOutcome::Applied
            }
            Err(e) => {
                error!(
                    conversation_id = %loaded.conversation_id,
                    error = %e,
                    "Failed to load conversation messages"
                );
                LoadOutcome::Failed
            }
        }
    }

    /// Clear the session for a fresh conversation.
    ///
    /// Does not contact storage; the next submit performs lazy creation.
    pub fn create_new_conversation(&mut self) {
        self.cancel_in_flight();
        self.active_conversation_id = None;
        self.transcript.clear();
        self.pending_error = None;
    }

    /// Restore a conversation id arriving from a navigable URL.
    ///
    /// The value is validated against a UUID shape; malformed values are
    /// discarded (`None`), in which case the caller should strip the
    /// parameter from the URL.
    pub fn restore(&mut self, query_value: &str) -> Option<ConversationLoad> {
        if Uuid::parse_str(query_value).is_err() {
            warn!(value = %query_value, "Discarding malformed conversation id");
            return None;
        }
        Some(self.select_conversation(query_value))
    }

    /// Wait until every persistence write enqueued so far has been
    /// attempted (shutdown drain; tests)
    pub async fn flush_pending_writes(&self) {
        self.outbox.flush().await;
    }

    fn cancel_in_flight(&mut self) {
        self.generation += 1;
        self.status = StreamingStatus::Idle;
        self.pending_raw.clear();
        self.pending_assistant = None;
    }

    fn last_user_text(&self) -> Option<String> {
        self.transcript
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::User)
            .map(|m| m.content.clone())
    }
}

/// Derive a conversation title from the first words of a message
pub fn derive_title(text: &str) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return DEFAULT_CONVERSATION_TITLE.to_string();
    }
    let mut title = words
        .iter()
        .take(TITLE_MAX_WORDS)
        .copied()
        .collect::<Vec<_>>()
        .join(" ");
    if words.len() > TITLE_MAX_WORDS {
        title.push_str("...");
    }
    title
}
