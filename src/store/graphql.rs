//! GraphQL chat storage client
//!
//! Primary path of the message store. Speaks the collection-style GraphQL
//! schema (`conversationsCollection`, `insertIntoconversationsCollection`,
//! ...) over a plain `{query, variables}` POST. Any failure here is caught
//! by the composite store, which retries the operation against SQLite.

use crate::store::models::{Conversation, ConversationUpdate, Message, NewConversation, NewMessage};
use crate::store::StoreError;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tracing::debug;

const CREATE_CONVERSATION: &str = "\
mutation CreateConversation($objects: [conversationsInsertInput!]!) {
  insertIntoconversationsCollection(objects: $objects) {
    records { id }
  }
}";

const UPDATE_CONVERSATION: &str = "\
mutation UpdateConversation($id: UUID!, $set: conversationsUpdateInput!) {
  updateconversationsCollection(filter: { id: { eq: $id } }, set: $set) {
    affectedCount
  }
}";

const INSERT_MESSAGE: &str = "\
mutation InsertMessage($objects: [messagesInsertInput!]!) {
  insertIntomessagesCollection(objects: $objects) {
    affectedCount
  }
}";

const GET_USER_CONVERSATIONS: &str = "\
query GetUserConversations($filter: conversationsFilter, $first: Int) {
  conversationsCollection(filter: $filter, first: $first, orderBy: [{ updated_at: DescNullsLast }]) {
    edges {
      node { id owner_id owner_role title description previous_response_id created_at updated_at }
    }
  }
}";

const GET_CONVERSATION_MESSAGES: &str = "\
query GetConversationMessages($filter: messagesFilter, $first: Int) {
  messagesCollection(filter: $filter, first: $first, orderBy: [{ created_at: AscNullsLast }]) {
    edges {
      node { id conversation_id role content provider_response_id created_at }
    }
  }
}";

const CONVERSATION_PAGE_SIZE: i64 = 50;
const MESSAGE_PAGE_SIZE: i64 = 1000;

/// GraphQL client for the chat schema
pub struct GraphQlClient {
    client: reqwest::Client,
    endpoint: String,
    secret: Option<String>,
}

impl GraphQlClient {
    /// Create a client against the given endpoint
    pub fn new(client: reqwest::Client, endpoint: String, secret: Option<String>) -> Self {
        Self {
            client,
            endpoint,
            secret,
        }
    }

    /// Execute one GraphQL document, returning the `data` value.
    async fn execute(&self, query: &str, variables: Value) -> Result<Value, StoreError> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .json(&json!({ "query": query, "variables": variables }));
        if let Some(secret) = &self.secret {
            request = request.bearer_auth(secret);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(StoreError::Graphql(format!(
                "GraphQL endpoint returned HTTP {}",
                status.as_u16()
            )));
        }

        let body: Value = response.json().await?;
        if let Some(errors) = body.get("errors").and_then(Value::as_array) {
            if !errors.is_empty() {
                let messages: Vec<String> = errors
                    .iter()
                    .map(|e| {
                        e.get("message")
                            .and_then(Value::as_str)
                            .unwrap_or("unknown GraphQL error")
                            .to_string()
                    })
                    .collect();
                return Err(StoreError::Graphql(messages.join("; ")));
            }
        }

        body.get("data")
            .cloned()
            .ok_or_else(|| StoreError::Graphql("GraphQL response has no data".to_string()))
    }

    /// Create a conversation, returning the server-assigned id
    pub async fn create_conversation(&self, new: &NewConversation) -> Result<String, StoreError> {
        let data = self
            .execute(
                CREATE_CONVERSATION,
                json!({
                    "objects": [{
                        "owner_id": new.owner_id,
                        "owner_role": new.owner_role,
                        "title": Value::Null,
                        "description": Value::Null,
                        "previous_response_id": new.previous_response_id,
                        "updated_at": Utc::now().to_rfc3339(),
                    }]
                }),
            )
            .await?;

        let id = data
            .pointer("/insertIntoconversationsCollection/records/0/id")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                StoreError::Graphql("Conversation insert returned no records".to_string())
            })?;

        debug!("Created conversation via GraphQL: {}", id);
        Ok(id.to_string())
    }

    /// Update conversation metadata (last-write-wins by id)
    pub async fn update_conversation(
        &self,
        id: &str,
        update: &ConversationUpdate,
    ) -> Result<(), StoreError> {
        let mut set = serde_json::Map::new();
        if let Some(title) = &update.title {
            set.insert("title".to_string(), json!(title));
        }
        if let Some(description) = &update.description {
            set.insert("description".to_string(), json!(description));
        }
        if let Some(previous_response_id) = &update.previous_response_id {
            set.insert("previous_response_id".to_string(), json!(previous_response_id));
        }
        set.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));

        self.execute(
            UPDATE_CONVERSATION,
            json!({ "id": id, "set": Value::Object(set) }),
        )
        .await?;
        Ok(())
    }

    /// Append a message to a conversation
    pub async fn create_message(&self, message: &NewMessage) -> Result<(), StoreError> {
        self.execute(
            INSERT_MESSAGE,
            json!({
                "objects": [{
                    "conversation_id": message.conversation_id,
                    "role": message.role.as_str(),
                    "content": message.content,
                    "provider_response_id": message.provider_response_id,
                }]
            }),
        )
        .await?;
        Ok(())
    }

    /// Get a user's conversations, most recently updated first
    pub async fn get_user_conversations(
        &self,
        owner_id: &str,
    ) -> Result<Vec<Conversation>, StoreError> {
        let data = self
            .execute(
                GET_USER_CONVERSATIONS,
                json!({
                    "filter": { "owner_id": { "eq": owner_id } },
                    "first": CONVERSATION_PAGE_SIZE,
                }),
            )
            .await?;

        let edges = data
            .pointer("/conversationsCollection/edges")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        Ok(edges
            .iter()
            .filter_map(|edge| edge.get("node"))
            .map(conversation_from_node)
            .collect())
    }

    /// Get a conversation's messages, creation time ascending
    pub async fn get_conversation_messages(
        &self,
        conversation_id: &str,
    ) -> Result<Vec<Message>, StoreError> {
        let data = self
            .execute(
                GET_CONVERSATION_MESSAGES,
                json!({
                    "filter": { "conversation_id": { "eq": conversation_id } },
                    "first": MESSAGE_PAGE_SIZE,
                }),
            )
            .await?;

        let edges = data
            .pointer("/messagesCollection/edges")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        Ok(edges
            .iter()
            .filter_map(|edge| edge.get("node"))
            .map(message_from_node)
            .collect())
    }
}

fn conversation_from_node(node: &Value) -> Conversation {
    Conversation {
        id: string_field(node, "id"),
        owner_id: string_field(node, "owner_id"),
        owner_role: string_field(node, "owner_role"),
        title: optional_field(node, "title"),
        description: optional_field(node, "description"),
        previous_response_id: optional_field(node, "previous_response_id"),
        created_at: timestamp_field(node, "created_at"),
        updated_at: timestamp_field(node, "updated_at"),
    }
}

fn message_from_node(node: &Value) -> Message {
    Message {
        id: string_field(node, "id"),
        conversation_id: string_field(node, "conversation_id"),
        role: string_field(node, "role"),
        content: string_field(node, "content"),
        provider_response_id: optional_field(node, "provider_response_id"),
        created_at: timestamp_field(node, "created_at"),
    }
}

fn string_field(node: &Value, key: &str) -> String {
    node.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn optional_field(node: &Value, key: &str) -> Option<String> {
    node.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Timestamps arrive as RFC-3339 strings from GraphQL and as integers from
/// some schemas; accept both.
fn timestamp_field(node: &Value, key: &str) -> i64 {
    match node.get(key) {
        Some(Value::Number(n)) => n.as_i64().unwrap_or(0),
        Some(Value::String(s)) => DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc).timestamp())
            .unwrap_or(0),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::models::MessageRole;
    use mockito::{Matcher, Server};
    use serial_test::serial;

    fn client_for(server: &Server) -> GraphQlClient {
        GraphQlClient::new(reqwest::Client::new(), server.url(), Some("secret".into()))
    }

    #[tokio::test]
    #[serial]
    async fn test_create_conversation_returns_server_id() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/")
            .match_header("authorization", "Bearer secret")
            .match_body(Matcher::PartialJsonString(
                r#"{"variables":{"objects":[{"owner_id":"user-1"}]}}"#.to_string(),
            ))
            .with_status(200)
            .with_body(
                r#"{"data":{"insertIntoconversationsCollection":{"records":[{"id":"conv-1"}]}}}"#,
            )
            .create_async()
            .await;

        let client = client_for(&server);
        let id = client
            .create_conversation(&NewConversation::new("user-1", "admin", None))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(id, "conv-1");
    }

    #[tokio::test]
    #[serial]
    async fn test_graphql_errors_surface_as_store_error() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/")
            .with_status(200)
            .with_body(r#"{"data":null,"errors":[{"message":"permission denied"}]}"#)
            .create_async()
            .await;

        let client = client_for(&server);
        let result = client
            .create_conversation(&NewConversation::new("user-1", "admin", None))
            .await;

        mock.assert_async().await;
        match result {
            Err(StoreError::Graphql(msg)) => assert!(msg.contains("permission denied")),
            other => panic!("Expected Graphql error, got {:?}", other),
        }
    }

    #[tokio::test]
    #[serial]
    async fn test_http_error_surfaces_as_store_error() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/")
            .with_status(503)
            .with_body("unavailable")
            .create_async()
            .await;

        let client = client_for(&server);
        let result = client.get_user_conversations("user-1").await;

        mock.assert_async().await;
        match result {
            Err(StoreError::Graphql(msg)) => assert!(msg.contains("503")),
            other => panic!("Expected Graphql error, got {:?}", other),
        }
    }

    #[tokio::test]
    #[serial]
    async fn test_get_conversation_messages_parses_nodes() {
        let mut server = Server::new_async().await;
        let body = r#"{"data":{"messagesCollection":{"edges":[
            {"node":{"id":"m1","conversation_id":"conv-1","role":"user","content":"Hello","provider_response_id":null,"created_at":"2026-08-01T10:00:00+00:00"}},
            {"node":{"id":"m2","conversation_id":"conv-1","role":"assistant","content":"Hi","provider_response_id":"resp-1","created_at":"2026-08-01T10:00:05+00:00"}}
        ]}}}"#;
        let mock = server
            .mock("POST", "/")
            .with_status(200)
            .with_body(body)
            .create_async()
            .await;

        let client = client_for(&server);
        let messages = client.get_conversation_messages("conv-1").await.unwrap();

        mock.assert_async().await;
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role_enum(), MessageRole::User);
        assert_eq!(messages[1].provider_response_id.as_deref(), Some("resp-1"));
        assert!(messages[0].created_at < messages[1].created_at);
    }

    #[tokio::test]
    #[serial]
    async fn test_update_conversation_sends_only_set_fields() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/")
            .match_body(Matcher::PartialJsonString(
                r#"{"variables":{"id":"conv-1","set":{"description":"A reply"}}}"#.to_string(),
            ))
            .with_status(200)
            .with_body(r#"{"data":{"updateconversationsCollection":{"affectedCount":1}}}"#)
            .create_async()
            .await;

        let client = client_for(&server);
        client
            .update_conversation(
                "conv-1",
                &ConversationUpdate {
                    description: Some("A reply".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        mock.assert_async().await;
    }
}
