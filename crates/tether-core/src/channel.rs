//! Channel abstraction for Tether.
//!
//! Channels are broadcast groups where connections subscribe to receive
//! events. Two kinds exist: conversation channels, shared by the two
//! participants of an accepted conversation, and private per-user channels
//! used for direct notification delivery. Channels have no identity beyond
//! their key; membership is derived at subscribe time, never stored.

use crate::envelope::{ConnectionId, Envelope};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tether_protocol::{ConversationId, UserId};
use tokio::sync::broadcast;
use tracing::{debug, trace};

/// Default broadcast channel capacity.
const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Key identifying a broadcast channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKey {
    /// The shared channel of one conversation.
    Conversation(ConversationId),
    /// A user's private notification channel.
    User(UserId),
}

impl fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelKey::Conversation(id) => write!(f, "conversation:{}", id),
            ChannelKey::User(id) => write!(f, "user:{}", id),
        }
    }
}

/// A channel for event fanout.
#[derive(Debug)]
pub struct Channel {
    /// Channel key.
    key: ChannelKey,
    /// Broadcast sender for this channel.
    sender: broadcast::Sender<Arc<Envelope>>,
    /// Set of subscribed connection IDs.
    subscribers: HashSet<ConnectionId>,
}

impl Channel {
    /// Create a new channel.
    #[must_use]
    pub fn new(key: ChannelKey) -> Self {
        Self::with_capacity(key, DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a new channel with a specific capacity.
    #[must_use]
    pub fn with_capacity(key: ChannelKey, capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            key,
            sender,
            subscribers: HashSet::new(),
        }
    }

    /// Get the channel key.
    #[must_use]
    pub fn key(&self) -> ChannelKey {
        self.key
    }

    /// Get the number of subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Check if a connection is subscribed.
    #[must_use]
    pub fn is_subscribed(&self, connection_id: &ConnectionId) -> bool {
        self.subscribers.contains(connection_id)
    }

    /// Subscribe a connection to this channel.
    ///
    /// Returns a receiver for events on this channel.
    pub fn subscribe(&mut self, connection_id: ConnectionId) -> broadcast::Receiver<Arc<Envelope>> {
        debug!(channel = %self.key, connection = %connection_id, "Connection subscribed");
        self.subscribers.insert(connection_id);
        self.sender.subscribe()
    }

    /// Unsubscribe a connection from this channel.
    ///
    /// Returns `true` if the connection was subscribed.
    pub fn unsubscribe(&mut self, connection_id: &ConnectionId) -> bool {
        let removed = self.subscribers.remove(connection_id);
        if removed {
            debug!(channel = %self.key, connection = %connection_id, "Connection unsubscribed");
        }
        removed
    }

    /// Publish an envelope to this channel.
    ///
    /// Returns the number of receivers that received it. Delivery is
    /// non-blocking; a lagging subscriber drops events rather than stalling
    /// the publisher.
    pub fn publish(&self, envelope: Envelope) -> usize {
        trace!(channel = %self.key, "Publishing event");
        self.sender.send(Arc::new(envelope)).unwrap_or_default()
    }

    /// Check if the channel is empty (no subscribers).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_protocol::ServerEvent;

    #[test]
    fn test_channel_creation() {
        let channel = Channel::new(ChannelKey::Conversation(7));
        assert_eq!(channel.key(), ChannelKey::Conversation(7));
        assert_eq!(channel.subscriber_count(), 0);
        assert!(channel.is_empty());
    }

    #[test]
    fn test_channel_key_display() {
        assert_eq!(ChannelKey::Conversation(7).to_string(), "conversation:7");
        assert_eq!(ChannelKey::User(3).to_string(), "user:3");
    }

    #[test]
    fn test_channel_subscribe_unsubscribe() {
        let mut channel = Channel::new(ChannelKey::Conversation(1));

        let _rx = channel.subscribe("conn-1".into());
        assert_eq!(channel.subscriber_count(), 1);
        assert!(channel.is_subscribed(&"conn-1".into()));

        let _rx2 = channel.subscribe("conn-2".into());
        assert_eq!(channel.subscriber_count(), 2);

        assert!(channel.unsubscribe(&"conn-1".into()));
        assert_eq!(channel.subscriber_count(), 1);
        assert!(!channel.is_subscribed(&"conn-1".into()));

        // Unsubscribing non-existent connection
        assert!(!channel.unsubscribe(&"conn-1".into()));
    }

    #[tokio::test]
    async fn test_channel_publish() {
        let mut channel = Channel::new(ChannelKey::User(1));
        let mut rx = channel.subscribe("conn-1".into());

        let count = channel.publish(Envelope::to_all(ServerEvent::error("oops")));
        assert_eq!(count, 1);

        let envelope = rx.recv().await.unwrap();
        assert!(matches!(envelope.event, ServerEvent::Error { .. }));
    }
}
