//! Event types for the Tether protocol.
//!
//! Events are the unit of communication between chat clients and the server.
//! Each event is serialized using MessagePack for efficient binary encoding.

use serde::{Deserialize, Serialize};

/// A user identifier, as issued by the platform's user store.
pub type UserId = i64;

/// A conversation identifier. One conversation exists per accepted
/// connection between two users.
pub type ConversationId = i64;

/// A persisted message identifier.
pub type MessageId = i64;

/// A chat message as it is broadcast to channel subscribers, joined with
/// the sender's display attributes.
///
/// The payload is built from the persisted row, so what subscribers see is
/// exactly what a later query of the message store returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessagePayload {
    /// Durable message id.
    pub id: MessageId,
    /// Conversation the message belongs to.
    pub conversation_id: ConversationId,
    /// Authenticated sender. Never taken from client input.
    pub sender_user_id: UserId,
    /// Sender's account name.
    pub sender_username: String,
    /// Sender's display name.
    pub sender_display_name: String,
    /// Message body.
    pub content: String,
    /// Creation time, milliseconds since the Unix epoch.
    pub created_at: u64,
    /// Whether the other participant has read the message.
    pub read: bool,
}

/// Events sent by clients to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Present a bearer credential. Must be the first event on a fresh
    /// connection; the server closes the socket if it is missing or invalid.
    Authenticate {
        /// Opaque signed token.
        token: String,
    },

    /// Subscribe to a conversation channel.
    JoinConversation {
        /// Conversation to join.
        conversation_id: ConversationId,
    },

    /// Send a chat message to a conversation.
    SendMessage {
        /// Target conversation.
        conversation_id: ConversationId,
        /// Message body.
        content: String,
    },

    /// The user started typing in a conversation.
    TypingStart {
        /// Conversation being typed in.
        conversation_id: ConversationId,
    },

    /// The user stopped typing in a conversation.
    TypingStop {
        /// Conversation being typed in.
        conversation_id: ConversationId,
    },

    /// Mark all unread messages from the other participant as read.
    MarkMessagesRead {
        /// Conversation to mark.
        conversation_id: ConversationId,
    },
}

/// Events sent by the server to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Authentication succeeded and the connection is registered.
    Authenticated {
        /// Unique connection identifier.
        connection_id: String,
        /// Authenticated user.
        user_id: UserId,
        /// Account name of the authenticated user.
        username: String,
        /// Recommended heartbeat interval in milliseconds.
        heartbeat_ms: u32,
    },

    /// A new message was posted to a conversation the client has joined.
    NewMessage {
        /// Full persisted message payload.
        message: MessagePayload,
    },

    /// Out-of-channel alert that a message arrived in one of the user's
    /// conversations. Delivered on the user's private channel.
    MessageNotification {
        /// Conversation the message was posted to.
        conversation_id: ConversationId,
        /// Username of the sender.
        sender: String,
        /// Message content truncated for display.
        preview: String,
    },

    /// Another participant started typing.
    UserTyping {
        /// Typing user.
        user_id: UserId,
        /// Display name of the typing user.
        username: String,
    },

    /// Another participant stopped typing.
    UserStoppedTyping {
        /// User who stopped typing.
        user_id: UserId,
        /// Display name of the user.
        username: String,
    },

    /// Messages in a conversation were marked read.
    MessagesRead {
        /// Conversation that was marked.
        conversation_id: ConversationId,
        /// User who read the messages.
        read_by: UserId,
    },

    /// A rejected operation, scoped to the originating connection.
    Error {
        /// Human-readable error message.
        message: String,
    },
}

impl ServerEvent {
    /// Create a new Error event.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        ServerEvent::Error {
            message: message.into(),
        }
    }
}
