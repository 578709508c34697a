//! External collaborator interfaces.
//!
//! The messaging core does not own user accounts, conversations, or the
//! message table; it reads and writes them through these traits. The rest
//! of the platform implements them against its database. The message
//! store is the single source of truth: no component caches mutable
//! message state across calls.

use async_trait::async_trait;
use tether_protocol::{ConversationId, MessageId, MessagePayload, UserId};
use thiserror::Error;

/// Errors from the backing stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The referenced record does not exist.
    #[error("record not found")]
    NotFound,

    /// The store is unreachable or failed mid-operation.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Errors from the credential verifier.
#[derive(Debug, Error)]
pub enum TokenError {
    /// Malformed or unverifiable token.
    #[error("malformed or unverifiable token")]
    Invalid,

    /// Token signature is valid but the token has expired.
    #[error("token expired")]
    Expired,
}

/// A user account, looked up once per connection at authentication time
/// and cached on the connection for the session's lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    /// User id.
    pub id: UserId,
    /// Account name.
    pub username: String,
    /// Name shown to other users.
    pub display_name: String,
    /// Platform role.
    pub role: String,
}

/// Lifecycle state of a conversation between two users.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationStatus {
    /// Requested but not yet accepted.
    Pending,
    /// Mutually accepted; messaging is allowed.
    Accepted,
    /// Declined by the receiver.
    Declined,
}

/// A mutual-acceptance relationship between two users. Read-only from the
/// core's perspective; acceptance can be revoked at any time, so it is
/// re-fetched for every authorization decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationRecord {
    /// Conversation id.
    pub id: ConversationId,
    /// User who initiated the conversation.
    pub sender_id: UserId,
    /// User who received the request.
    pub receiver_id: UserId,
    /// Current lifecycle state.
    pub status: ConversationStatus,
}

impl ConversationRecord {
    /// Whether `user` is one of the two participants.
    #[must_use]
    pub fn involves(&self, user: UserId) -> bool {
        self.sender_id == user || self.receiver_id == user
    }

    /// The participant other than `user`.
    #[must_use]
    pub fn other_participant(&self, user: UserId) -> UserId {
        if self.sender_id == user {
            self.receiver_id
        } else {
            self.sender_id
        }
    }
}

/// User account lookup.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Fetch a user by id.
    async fn user_by_id(&self, id: UserId) -> Result<UserRecord, StoreError>;
}

/// Conversation lookup, used for authorization.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Fetch a conversation by id.
    async fn conversation_by_id(&self, id: ConversationId)
        -> Result<ConversationRecord, StoreError>;
}

/// Durable message persistence.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Persist a new message, returning its durable id. The write completes
    /// (or fails atomically) before the caller broadcasts anything.
    async fn insert_message(
        &self,
        conversation_id: ConversationId,
        sender_id: UserId,
        content: &str,
    ) -> Result<MessageId, StoreError>;

    /// Fetch a persisted message joined with its sender's display
    /// attributes.
    async fn message_with_sender(&self, id: MessageId) -> Result<MessagePayload, StoreError>;

    /// Mark every unread message in the conversation not sent by `reader_id`
    /// as read. Returns the number of rows affected.
    async fn mark_read(
        &self,
        conversation_id: ConversationId,
        reader_id: UserId,
    ) -> Result<u64, StoreError>;
}

/// Bearer credential verification.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    /// Resolve a token to the user id it was issued for.
    async fn verify(&self, token: &str) -> Result<UserId, TokenError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conversation(sender_id: UserId, receiver_id: UserId) -> ConversationRecord {
        ConversationRecord {
            id: 7,
            sender_id,
            receiver_id,
            status: ConversationStatus::Accepted,
        }
    }

    #[test]
    fn test_conversation_involves() {
        let convo = conversation(1, 2);
        assert!(convo.involves(1));
        assert!(convo.involves(2));
        assert!(!convo.involves(3));
    }

    #[test]
    fn test_conversation_other_participant() {
        let convo = conversation(1, 2);
        assert_eq!(convo.other_participant(1), 2);
        assert_eq!(convo.other_participant(2), 1);
    }
}
