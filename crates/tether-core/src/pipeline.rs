//! Message pipeline for Tether.
//!
//! Joins, sends, typing indicators, and read receipts all flow through
//! here. Authorization is derived from the conversation row on every
//! operation: acceptance can be revoked between a join and a later send,
//! so membership state is never trusted in its place.

use crate::channel::ChannelKey;
use crate::envelope::{ConnectionId, Envelope};
use crate::error::CoreError;
use crate::hub::Hub;
use crate::store::{ConversationRecord, ConversationStatus, ConversationStore, MessageStore, UserRecord};
use std::sync::Arc;
use tether_protocol::{ConversationId, MessagePayload, ServerEvent, UserId};
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Default upper bound on message content, in Unicode code points.
pub const DEFAULT_MAX_MESSAGE_CHARS: usize = 10_000;

/// Length of a notification preview, in Unicode code points.
pub const PREVIEW_CHARS: usize = 50;

/// Validates, persists, and fans out conversation traffic.
pub struct MessagePipeline {
    hub: Arc<Hub>,
    conversations: Arc<dyn ConversationStore>,
    messages: Arc<dyn MessageStore>,
    max_message_chars: usize,
}

impl MessagePipeline {
    /// Create a new pipeline.
    pub fn new(
        hub: Arc<Hub>,
        conversations: Arc<dyn ConversationStore>,
        messages: Arc<dyn MessageStore>,
    ) -> Self {
        Self {
            hub,
            conversations,
            messages,
            max_message_chars: DEFAULT_MAX_MESSAGE_CHARS,
        }
    }

    /// Override the content length bound.
    #[must_use]
    pub fn with_max_message_chars(mut self, max_message_chars: usize) -> Self {
        self.max_message_chars = max_message_chars;
        self
    }

    /// Re-fetch a conversation and check that `user` may act in it.
    ///
    /// The row is fetched fresh on every call; authorization is never
    /// cached across operations.
    async fn authorize(
        &self,
        user: UserId,
        conversation_id: ConversationId,
    ) -> Result<ConversationRecord, CoreError> {
        let conversation = self.conversations.conversation_by_id(conversation_id).await?;

        if !conversation.involves(user) || conversation.status != ConversationStatus::Accepted {
            return Err(CoreError::Unauthorized);
        }

        Ok(conversation)
    }

    /// Subscribe a connection to a conversation channel.
    ///
    /// Returns `Ok(Some(receiver))` on a fresh subscription, `Ok(None)` if
    /// the connection had already joined (a no-op, not an error).
    ///
    /// # Errors
    ///
    /// Returns `Unauthorized` if the user is not an accepted participant.
    /// Callers drop the failure without replying to the client; the log
    /// line is the only trace.
    pub async fn join(
        &self,
        connection_id: &ConnectionId,
        user: UserId,
        conversation_id: ConversationId,
    ) -> Result<Option<broadcast::Receiver<Arc<Envelope>>>, CoreError> {
        self.authorize(user, conversation_id).await?;
        Ok(self.hub.subscribe(connection_id, ChannelKey::Conversation(conversation_id)))
    }

    /// Persist a message and fan it out.
    ///
    /// The write completes before any broadcast; on persistence failure
    /// nothing is delivered to anyone. Subscribers of the conversation
    /// channel receive the full payload re-read from the store; the other
    /// participant additionally gets a preview notification on their
    /// private channel, whether or not they joined the conversation.
    ///
    /// # Errors
    ///
    /// `Unauthorized`, `InvalidMessage`, or `Persistence`; all scoped to
    /// the sending connection.
    pub async fn send(
        &self,
        connection_id: &ConnectionId,
        sender: &UserRecord,
        conversation_id: ConversationId,
        content: &str,
    ) -> Result<MessagePayload, CoreError> {
        let conversation = self.authorize(sender.id, conversation_id).await?;

        if content.trim().is_empty() {
            return Err(CoreError::InvalidMessage("content is empty"));
        }
        if content.chars().count() > self.max_message_chars {
            return Err(CoreError::InvalidMessage("content too long"));
        }

        let message_id = self
            .messages
            .insert_message(conversation_id, sender.id, content)
            .await?;

        // Broadcast what the store now holds, not what arrived on the wire.
        let payload = self.messages.message_with_sender(message_id).await?;

        let recipients = self.hub.publish(
            ChannelKey::Conversation(conversation_id),
            Envelope::to_all(ServerEvent::NewMessage {
                message: payload.clone(),
            }),
        );

        let receiver = conversation.other_participant(sender.id);
        self.hub.notify_user(
            receiver,
            ServerEvent::MessageNotification {
                conversation_id,
                sender: sender.username.clone(),
                preview: preview(content),
            },
        );

        debug!(
            conversation = conversation_id,
            message = message_id,
            sender = sender.id,
            recipients,
            "Message delivered"
        );

        Ok(payload)
    }

    /// Broadcast a typing indicator to the other members of a conversation
    /// channel.
    ///
    /// Fire-and-forget: gated only on channel membership (granted by an
    /// authorized join), never persisted, at-most-once.
    pub fn typing(
        &self,
        connection_id: &ConnectionId,
        user: &UserRecord,
        conversation_id: ConversationId,
        started: bool,
    ) {
        let key = ChannelKey::Conversation(conversation_id);
        if !self.hub.is_subscribed(connection_id, key) {
            warn!(connection = %connection_id, conversation = conversation_id, "Typing from non-member dropped");
            return;
        }

        let event = if started {
            ServerEvent::UserTyping {
                user_id: user.id,
                username: user.display_name.clone(),
            }
        } else {
            ServerEvent::UserStoppedTyping {
                user_id: user.id,
                username: user.display_name.clone(),
            }
        };

        self.hub.publish(key, Envelope::excluding(event, connection_id.clone()));
    }

    /// Mark the caller's unread messages in a conversation as read and tell
    /// the rest of the channel.
    ///
    /// Idempotent: a second call updates zero rows; the event still fires.
    ///
    /// # Errors
    ///
    /// `Unauthorized` if the connection never joined the channel,
    /// `Persistence` if the bulk update fails.
    pub async fn mark_read(
        &self,
        connection_id: &ConnectionId,
        reader: &UserRecord,
        conversation_id: ConversationId,
    ) -> Result<u64, CoreError> {
        let key = ChannelKey::Conversation(conversation_id);
        if !self.hub.is_subscribed(connection_id, key) {
            return Err(CoreError::Unauthorized);
        }

        let affected = self.messages.mark_read(conversation_id, reader.id).await?;

        self.hub.publish(
            key,
            Envelope::excluding(
                ServerEvent::MessagesRead {
                    conversation_id,
                    read_by: reader.id,
                },
                connection_id.clone(),
            ),
        );

        debug!(
            conversation = conversation_id,
            reader = reader.id,
            affected,
            "Messages marked read"
        );

        Ok(affected)
    }
}

/// Truncate message content for a notification preview.
fn preview(content: &str) -> String {
    if content.chars().count() <= PREVIEW_CHARS {
        content.to_string()
    } else {
        let mut truncated: String = content.chars().take(PREVIEW_CHARS).collect();
        truncated.push_str("...");
        truncated
    }
}
