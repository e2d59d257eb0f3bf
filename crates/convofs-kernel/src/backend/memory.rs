//! In-process conversation backend.
//!
//! Used for testing and the `--backend memory` offline mode. All data is
//! ephemeral.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use super::{
    BackendError, BackendResult, ConversationBackend, ConversationConfig, Message, Role,
};

/// In-memory conversation service.
///
/// Thread-safe via internal `RwLock`. Ids are UUIDv7 strings.
#[derive(Debug, Default)]
pub struct MemoryConversations {
    conversations: RwLock<HashMap<String, Vec<Message>>>,
    failing: AtomicBool,
    calls: AtomicUsize,
}

impl MemoryConversations {
    /// Create an empty service.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of calls received, failed ones included.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of conversations the service holds.
    pub fn conversation_count(&self) -> usize {
        self.conversations.read().len()
    }

    /// Seed a message directly, bypassing the failure switch.
    ///
    /// Lets tests put assistant replies into a transcript.
    pub fn push_message(&self, conversation_id: &str, message: Message) -> BackendResult<()> {
        let mut conversations = self.conversations.write();
        let messages = conversations
            .get_mut(conversation_id)
            .ok_or_else(|| BackendError::UnknownConversation(conversation_id.to_string()))?;
        messages.push(message);
        Ok(())
    }

    fn enter(&self) -> BackendResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(BackendError::Other("memory backend set to fail".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl ConversationBackend for MemoryConversations {
    fn name(&self) -> &str {
        "memory"
    }

    async fn create_conversation(&self, _config: &ConversationConfig) -> BackendResult<String> {
        self.enter()?;
        let id = uuid::Uuid::now_v7().to_string();
        self.conversations.write().insert(id.clone(), Vec::new());
        Ok(id)
    }

    async fn list_messages(&self, conversation_id: &str) -> BackendResult<Vec<Message>> {
        self.enter()?;
        self.conversations
            .read()
            .get(conversation_id)
            .cloned()
            .ok_or_else(|| BackendError::UnknownConversation(conversation_id.to_string()))
    }

    async fn append_message(
        &self,
        conversation_id: &str,
        role: Role,
        content: &str,
    ) -> BackendResult<()> {
        self.enter()?;
        self.push_message(conversation_id, Message::new(role, content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_append_list() {
        let backend = MemoryConversations::new();
        let id = backend
            .create_conversation(&ConversationConfig::default())
            .await
            .unwrap();

        backend.append_message(&id, Role::User, "hello").await.unwrap();
        backend
            .push_message(&id, Message::assistant("hi there"))
            .unwrap();

        let messages = backend.list_messages(&id).await.unwrap();
        assert_eq!(
            messages,
            vec![Message::user("hello"), Message::assistant("hi there")]
        );
        assert_eq!(backend.conversation_count(), 1);
    }

    #[tokio::test]
    async fn test_unknown_conversation() {
        let backend = MemoryConversations::new();
        let result = backend.list_messages("missing").await;
        assert!(matches!(result, Err(BackendError::UnknownConversation(_))));
    }

    #[tokio::test]
    async fn test_failure_switch() {
        let backend = MemoryConversations::new();
        backend.set_failing(true);
        assert!(backend
            .create_conversation(&ConversationConfig::default())
            .await
            .is_err());
        assert_eq!(backend.conversation_count(), 0);
        assert_eq!(backend.call_count(), 1);

        backend.set_failing(false);
        assert!(backend
            .create_conversation(&ConversationConfig::default())
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_ids_are_distinct() {
        let backend = MemoryConversations::new();
        let config = ConversationConfig::default();
        let a = backend.create_conversation(&config).await.unwrap();
        let b = backend.create_conversation(&config).await.unwrap();
        assert_ne!(a, b);
    }
}
