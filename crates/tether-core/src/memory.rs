//! In-process store implementation.
//!
//! Backs the standalone server binary and the test suite. Platform
//! deployments implement the store traits against the shared database
//! instead; the semantics here (insert-then-reread, bulk read flagging)
//! match what those queries do.

use crate::store::{
    ConversationRecord, ConversationStore, MessageStore, StoreError, UserRecord, UserStore,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};
use tether_protocol::{ConversationId, MessageId, MessagePayload, UserId};

#[derive(Debug, Clone)]
struct StoredMessage {
    id: MessageId,
    conversation_id: ConversationId,
    sender_id: UserId,
    content: String,
    created_at: u64,
    read: bool,
}

/// In-memory implementation of the user, conversation, and message stores.
#[derive(Debug, Default)]
pub struct MemoryStore {
    users: Mutex<HashMap<UserId, UserRecord>>,
    conversations: Mutex<HashMap<ConversationId, ConversationRecord>>,
    messages: Mutex<Vec<StoredMessage>>,
    next_message_id: AtomicI64,
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, StoreError> {
    mutex
        .lock()
        .map_err(|_| StoreError::Unavailable("store lock poisoned".to_string()))
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_millis() as u64
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_message_id: AtomicI64::new(1),
            ..Self::default()
        }
    }

    /// Insert or replace a user record.
    pub fn add_user(&self, user: UserRecord) {
        if let Ok(mut users) = self.users.lock() {
            users.insert(user.id, user);
        }
    }

    /// Insert or replace a conversation record.
    pub fn add_conversation(&self, conversation: ConversationRecord) {
        if let Ok(mut conversations) = self.conversations.lock() {
            conversations.insert(conversation.id, conversation);
        }
    }

    /// Number of persisted messages in a conversation.
    #[must_use]
    pub fn message_count(&self, conversation_id: ConversationId) -> usize {
        self.messages
            .lock()
            .map(|messages| {
                messages
                    .iter()
                    .filter(|m| m.conversation_id == conversation_id)
                    .count()
            })
            .unwrap_or(0)
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn user_by_id(&self, id: UserId) -> Result<UserRecord, StoreError> {
        let users = lock(&self.users)?;
        users.get(&id).cloned().ok_or(StoreError::NotFound)
    }
}

#[async_trait]
impl ConversationStore for MemoryStore {
    async fn conversation_by_id(
        &self,
        id: ConversationId,
    ) -> Result<ConversationRecord, StoreError> {
        let conversations = lock(&self.conversations)?;
        conversations.get(&id).cloned().ok_or(StoreError::NotFound)
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn insert_message(
        &self,
        conversation_id: ConversationId,
        sender_id: UserId,
        content: &str,
    ) -> Result<MessageId, StoreError> {
        let id = self.next_message_id.fetch_add(1, Ordering::Relaxed);
        let mut messages = lock(&self.messages)?;
        messages.push(StoredMessage {
            id,
            conversation_id,
            sender_id,
            content: content.to_string(),
            created_at: now_millis(),
            read: false,
        });
        Ok(id)
    }

    async fn message_with_sender(&self, id: MessageId) -> Result<MessagePayload, StoreError> {
        let message = {
            let messages = lock(&self.messages)?;
            messages
                .iter()
                .find(|m| m.id == id)
                .cloned()
                .ok_or(StoreError::NotFound)?
        };

        let users = lock(&self.users)?;
        let sender = users.get(&message.sender_id).ok_or(StoreError::NotFound)?;

        Ok(MessagePayload {
            id: message.id,
            conversation_id: message.conversation_id,
            sender_user_id: message.sender_id,
            sender_username: sender.username.clone(),
            sender_display_name: sender.display_name.clone(),
            content: message.content,
            created_at: message.created_at,
            read: message.read,
        })
    }

    async fn mark_read(
        &self,
        conversation_id: ConversationId,
        reader_id: UserId,
    ) -> Result<u64, StoreError> {
        let mut messages = lock(&self.messages)?;
        let mut affected = 0;
        for message in messages
            .iter_mut()
            .filter(|m| m.conversation_id == conversation_id && m.sender_id != reader_id && !m.read)
        {
            message.read = true;
            affected += 1;
        }
        Ok(affected)
    }
}
