//! Persistence outbox
//!
//! Writes that must not block the visible chat turn are enqueued here and
//! drained by a background task. Each write is retried once; a second
//! failure is logged and the write is dropped. Enqueue order is preserved,
//! which keeps the causal guarantee that a message write never overtakes
//! the conversation-metadata write queued before it.

use crate::store::{ConversationStore, ConversationUpdate, NewMessage, StoreError};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::warn;

/// One intended persistence write
#[derive(Debug, Clone)]
pub enum WriteOp {
    /// Append a message to its conversation
    CreateMessage(NewMessage),
    /// Update conversation metadata
    UpdateConversation {
        /// Conversation id
        id: String,
        /// Fields to change
        update: ConversationUpdate,
    },
}

enum Envelope {
    Op(WriteOp),
    Flush(oneshot::Sender<()>),
}

/// Handle to the outbox drain task
pub struct Outbox {
    tx: mpsc::UnboundedSender<Envelope>,
}

impl Outbox {
    /// Spawn the drain task against the given store
    pub fn spawn(store: Arc<dyn ConversationStore>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            while let Some(envelope) = rx.recv().await {
                match envelope {
                    Envelope::Op(op) => drain_one(store.as_ref(), op).await,
                    Envelope::Flush(ack) => {
                        let _ = ack.send(());
                    }
                }
            }
        });
        Self { tx }
    }

    /// Enqueue a write without waiting for it
    pub fn enqueue(&self, op: WriteOp) {
        if self.tx.send(Envelope::Op(op)).is_err() {
            warn!("Outbox drain task is gone; dropping persistence write");
        }
    }

    /// Wait until every write enqueued before this call has been attempted.
    ///
    /// Used on shutdown and in tests; normal operation never waits.
    pub async fn flush(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.tx.send(Envelope::Flush(ack_tx)).is_ok() {
            let _ = ack_rx.await;
        }
    }
}

async fn drain_one(store: &dyn ConversationStore, op: WriteOp) {
    if let Err(first) = apply(store, &op).await {
        warn!(error = %first, "Persistence write failed, retrying once");
        if let Err(second) = apply(store, &op).await {
            warn!(error = %second, "Persistence write failed again, dropping");
        }
    }
}

async fn apply(store: &dyn ConversationStore, op: &WriteOp) -> Result<(), StoreError> {
    match op {
        WriteOp::CreateMessage(message) => store.create_message(message.clone()).await,
        WriteOp::UpdateConversation { id, update } => {
            store.update_conversation(id, update.clone()).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Conversation, Message, MessageRole, NewConversation};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Store that records calls and fails `create_message` a configurable
    /// number of times.
    #[derive(Default)]
    struct FlakyStore {
        calls: Mutex<Vec<String>>,
        failures_remaining: Mutex<u32>,
    }

    #[async_trait]
    impl ConversationStore for FlakyStore {
        async fn create_conversation(&self, _new: NewConversation) -> Result<String, StoreError> {
            self.calls.lock().unwrap().push("create_conversation".into());
            Ok("conv-1".to_string())
        }

        async fn update_conversation(
            &self,
            id: &str,
            _update: ConversationUpdate,
        ) -> Result<(), StoreError> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("update_conversation:{}", id));
            Ok(())
        }

        async fn create_message(&self, message: NewMessage) -> Result<(), StoreError> {
            let mut failures = self.failures_remaining.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(StoreError::Graphql("synthetic failure".to_string()));
            }
            self.calls
                .lock()
                .unwrap()
                .push(format!("create_message:{}", message.content));
            Ok(())
        }

        async fn get_user_conversations(
            &self,
            _owner_id: &str,
        ) -> Result<Vec<Conversation>, StoreError> {
            Ok(Vec::new())
        }

        async fn get_conversation_messages(
            &self,
            _conversation_id: &str,
        ) -> Result<Vec<Message>, StoreError> {
            Ok(Vec::new())
        }
    }

    fn user_message(content: &str) -> NewMessage {
        NewMessage {
            conversation_id: "conv-1".to_string(),
            role: MessageRole::User,
            content: content.to_string(),
            provider_response_id: None,
        }
    }

    #[tokio::test]
    async fn test_writes_drain_in_enqueue_order() {
        let store = Arc::new(FlakyStore::default());
        let outbox = Outbox::spawn(store.clone());

        outbox.enqueue(WriteOp::CreateMessage(user_message("first")));
        outbox.enqueue(WriteOp::UpdateConversation {
            id: "conv-1".to_string(),
            update: ConversationUpdate::default(),
        });
        outbox.enqueue(WriteOp::CreateMessage(user_message("second")));
        outbox.flush().await;

        let calls = store.calls.lock().unwrap().clone();
        assert_eq!(
            calls,
            vec![
                "create_message:first",
                "update_conversation:conv-1",
                "create_message:second"
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_write_is_retried_once() {
        let store = Arc::new(FlakyStore::default());
        *store.failures_remaining.lock().unwrap() = 1;
        let outbox = Outbox::spawn(store.clone());

        outbox.enqueue(WriteOp::CreateMessage(user_message("retry me")));
        outbox.flush().await;

        let calls = store.calls.lock().unwrap().clone();
        assert_eq!(calls, vec!["create_message:retry me"]);
    }

    #[tokio::test]
    async fn test_write_dropped_after_second_failure() {
        let store = Arc::new(FlakyStore::default());
        *store.failures_remaining.lock().unwrap() = 2;
        let outbox = Outbox::spawn(store.clone());

        outbox.enqueue(WriteOp::CreateMessage(user_message("doomed")));
        outbox.enqueue(WriteOp::CreateMessage(user_message("survivor")));
        outbox.flush().await;

        // The doomed write is dropped; later writes still drain.
        let calls = store.calls.lock().unwrap().clone();
        assert_eq!(calls, vec!["create_message:survivor"]);
    }
}
