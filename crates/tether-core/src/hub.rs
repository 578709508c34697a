//! Connection hub for Tether.
//!
//! The hub is the server's explicit shared context: the channel table, the
//! per-connection subscription table, and the presence registry. It is
//! constructed once at startup and handed to every connection task. All
//! tables are dashmap-backed; where a connection-keyed and a channel-keyed
//! entry are held together, the connection entry is always taken first.

use crate::channel::{Channel, ChannelKey};
use crate::envelope::{ConnectionId, Envelope};
use crate::presence::PresenceRegistry;
use dashmap::{DashMap, DashSet};
use std::sync::Arc;
use tether_protocol::{ServerEvent, UserId};
use tokio::sync::broadcast;
use tracing::{debug, info, trace};

/// Hub configuration.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Broadcast capacity of each channel.
    pub channel_capacity: usize,
    /// Whether to delete channel entries once the last subscriber leaves.
    pub auto_delete_empty_channels: bool,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1024,
            auto_delete_empty_channels: true,
        }
    }
}

/// The central connection hub.
pub struct Hub {
    /// Channels indexed by key.
    channels: DashMap<ChannelKey, Channel>,
    /// Connection subscriptions (connection -> set of channel keys).
    subscriptions: DashMap<ConnectionId, DashSet<ChannelKey>>,
    /// Owning user of each live connection.
    connections: DashMap<ConnectionId, UserId>,
    /// Live connections per user.
    presence: PresenceRegistry,
    /// Configuration.
    config: HubConfig,
}

impl Hub {
    /// Create a new hub with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(HubConfig::default())
    }

    /// Create a new hub with custom configuration.
    #[must_use]
    pub fn with_config(config: HubConfig) -> Self {
        info!("Creating hub with config: {:?}", config);
        Self {
            channels: DashMap::new(),
            subscriptions: DashMap::new(),
            connections: DashMap::new(),
            presence: PresenceRegistry::new(),
            config,
        }
    }

    /// Get hub statistics.
    #[must_use]
    pub fn stats(&self) -> HubStats {
        HubStats {
            channel_count: self.channels.len(),
            connection_count: self.connections.len(),
            online_users: self.presence.online_count(),
        }
    }

    /// Access the presence registry.
    #[must_use]
    pub fn presence(&self) -> &PresenceRegistry {
        &self.presence
    }

    /// Register an authenticated connection.
    ///
    /// Adds the connection under the user's presence bucket and subscribes
    /// it to the user's private channel. Returns the private channel
    /// receiver.
    pub fn register(
        &self,
        connection_id: &ConnectionId,
        user: UserId,
    ) -> broadcast::Receiver<Arc<Envelope>> {
        self.connections.insert(connection_id.clone(), user);
        self.presence.add(user, connection_id.clone());
        let receiver = self.subscribe_channel(connection_id, ChannelKey::User(user));
        debug!(connection = %connection_id, user, "Connection registered");
        receiver
    }

    /// Deregister a connection: remove it from every subscribed channel and
    /// from its user's presence bucket.
    pub fn deregister(&self, connection_id: &ConnectionId) {
        if let Some((_, keys)) = self.subscriptions.remove(connection_id) {
            for key in keys {
                if let Some(mut channel) = self.channels.get_mut(&key) {
                    channel.unsubscribe(connection_id);

                    if self.config.auto_delete_empty_channels && channel.is_empty() {
                        drop(channel);
                        if self.channels.remove_if(&key, |_, c| c.is_empty()).is_some() {
                            debug!(channel = %key, "Deleted empty channel");
                        }
                    }
                }
            }
        }

        if let Some((_, user)) = self.connections.remove(connection_id) {
            self.presence.remove(user, connection_id);
        }

        debug!(connection = %connection_id, "Connection deregistered");
    }

    /// Subscribe a connection to a channel.
    ///
    /// Idempotent: returns `None` without side effects if the connection is
    /// already subscribed, otherwise a receiver for the channel's events.
    pub fn subscribe(
        &self,
        connection_id: &ConnectionId,
        key: ChannelKey,
    ) -> Option<broadcast::Receiver<Arc<Envelope>>> {
        if self.is_subscribed(connection_id, key) {
            return None;
        }
        Some(self.subscribe_channel(connection_id, key))
    }

    fn subscribe_channel(
        &self,
        connection_id: &ConnectionId,
        key: ChannelKey,
    ) -> broadcast::Receiver<Arc<Envelope>> {
        let conn_subs = self
            .subscriptions
            .entry(connection_id.clone())
            .or_default();

        let mut channel = self.channels.entry(key).or_insert_with(|| {
            debug!(channel = %key, "Creating channel");
            Channel::with_capacity(key, self.config.channel_capacity)
        });

        let receiver = channel.subscribe(connection_id.clone());
        conn_subs.insert(key);

        debug!(
            channel = %key,
            connection = %connection_id,
            subscribers = channel.subscriber_count(),
            "Subscribed"
        );

        receiver
    }

    /// Check whether a connection is subscribed to a channel.
    #[must_use]
    pub fn is_subscribed(&self, connection_id: &ConnectionId, key: ChannelKey) -> bool {
        self.subscriptions
            .get(connection_id)
            .map(|s| s.contains(&key))
            .unwrap_or(false)
    }

    /// Publish an envelope to a channel.
    ///
    /// Returns the number of subscribers that received it.
    pub fn publish(&self, key: ChannelKey, envelope: Envelope) -> usize {
        if let Some(channel) = self.channels.get(&key) {
            let count = channel.publish(envelope);
            trace!(channel = %key, recipients = count, "Published event");
            count
        } else {
            trace!(channel = %key, "Publish to absent channel");
            0
        }
    }

    /// Deliver an event to every live connection of a user via their
    /// private channel. If the user has no live connection the event is
    /// dropped.
    pub fn notify_user(&self, user: UserId, event: ServerEvent) -> usize {
        let delivered = self.publish(ChannelKey::User(user), Envelope::to_all(event));
        if delivered == 0 {
            trace!(user, "Notification dropped, no live connections");
        }
        delivered
    }

    /// Check if a channel exists.
    #[must_use]
    pub fn channel_exists(&self, key: ChannelKey) -> bool {
        self.channels.contains_key(&key)
    }

    /// Get the subscriber count for a channel.
    #[must_use]
    pub fn subscriber_count(&self, key: ChannelKey) -> usize {
        self.channels
            .get(&key)
            .map(|c| c.subscriber_count())
            .unwrap_or(0)
    }

    /// Get the channels a connection is subscribed to.
    #[must_use]
    pub fn connection_channels(&self, connection_id: &ConnectionId) -> Vec<ChannelKey> {
        self.subscriptions
            .get(connection_id)
            .map(|s| s.iter().map(|k| *k).collect())
            .unwrap_or_default()
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}

/// Hub statistics.
#[derive(Debug, Clone)]
pub struct HubStats {
    /// Number of active channels.
    pub channel_count: usize,
    /// Number of live connections.
    pub connection_count: usize,
    /// Number of users with at least one live connection.
    pub online_users: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn(id: &str) -> ConnectionId {
        id.into()
    }

    #[test]
    fn test_register_subscribes_private_channel() {
        let hub = Hub::new();

        let _rx = hub.register(&conn("c1"), 1);

        assert!(hub.channel_exists(ChannelKey::User(1)));
        assert!(hub.is_subscribed(&conn("c1"), ChannelKey::User(1)));
        assert!(hub.presence().is_online(1));
    }

    #[test]
    fn test_deregister_cleans_up_everything() {
        let hub = Hub::new();

        let _rx = hub.register(&conn("c1"), 1);
        let _sub = hub.subscribe(&conn("c1"), ChannelKey::Conversation(7)).unwrap();

        hub.deregister(&conn("c1"));

        assert!(!hub.presence().is_online(1));
        assert!(!hub.channel_exists(ChannelKey::Conversation(7)));
        assert!(!hub.channel_exists(ChannelKey::User(1)));
        assert!(hub.connection_channels(&conn("c1")).is_empty());
    }

    #[test]
    fn test_subscribe_is_idempotent() {
        let hub = Hub::new();

        assert!(hub.subscribe(&conn("c1"), ChannelKey::Conversation(7)).is_some());
        assert!(hub.subscribe(&conn("c1"), ChannelKey::Conversation(7)).is_none());
        assert_eq!(hub.subscriber_count(ChannelKey::Conversation(7)), 1);
    }

    #[test]
    fn test_publish_reaches_subscribers() {
        let hub = Hub::new();

        let mut rx1 = hub.subscribe(&conn("c1"), ChannelKey::Conversation(7)).unwrap();
        let mut rx2 = hub.subscribe(&conn("c2"), ChannelKey::Conversation(7)).unwrap();

        let count = hub.publish(
            ChannelKey::Conversation(7),
            Envelope::to_all(ServerEvent::error("x")),
        );
        assert_eq!(count, 2);

        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());
    }

    #[test]
    fn test_publish_after_deregister_misses_connection() {
        let hub = Hub::new();

        let mut rx1 = hub.subscribe(&conn("c1"), ChannelKey::Conversation(7)).unwrap();
        let _rx2 = hub.subscribe(&conn("c2"), ChannelKey::Conversation(7)).unwrap();

        hub.deregister(&conn("c2"));

        let count = hub.publish(
            ChannelKey::Conversation(7),
            Envelope::to_all(ServerEvent::error("x")),
        );
        assert_eq!(count, 1);
        assert!(rx1.try_recv().is_ok());
    }

    #[test]
    fn test_notify_user_reaches_all_connections() {
        let hub = Hub::new();

        let mut rx1 = hub.register(&conn("c1"), 2);
        let mut rx2 = hub.register(&conn("c2"), 2);

        let delivered = hub.notify_user(2, ServerEvent::error("ping"));
        assert_eq!(delivered, 2);

        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());
    }

    #[test]
    fn test_notify_offline_user_is_dropped() {
        let hub = Hub::new();
        assert_eq!(hub.notify_user(9, ServerEvent::error("ping")), 0);
    }

    #[test]
    fn test_stats() {
        let hub = Hub::new();

        let _rx1 = hub.register(&conn("c1"), 1);
        let _rx2 = hub.register(&conn("c2"), 2);
        let _sub = hub.subscribe(&conn("c1"), ChannelKey::Conversation(7)).unwrap();

        let stats = hub.stats();
        assert_eq!(stats.channel_count, 3);
        assert_eq!(stats.connection_count, 2);
        assert_eq!(stats.online_users, 2);
    }
}
