//! Presence tracking for Tether.
//!
//! The registry maps each user to the set of their live connections. A
//! user is online exactly while at least one connection exists in their
//! bucket; nothing is persisted. Each bucket is mutated under its dashmap
//! entry lock, so concurrent registration and deregistration for the same
//! user are linearized through a single mutation point.

use crate::envelope::ConnectionId;
use dashmap::DashMap;
use std::collections::HashSet;
use tether_protocol::UserId;
use tracing::debug;

/// Process-wide registry of live connections per user.
#[derive(Debug, Default)]
pub struct PresenceRegistry {
    /// Map of user ID to that user's live connections.
    users: DashMap<UserId, HashSet<ConnectionId>>,
}

impl PresenceRegistry {
    /// Create a new presence registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection under a user's bucket.
    ///
    /// Returns `true` if the user had no prior live connection and just
    /// came online.
    pub fn add(&self, user: UserId, connection_id: ConnectionId) -> bool {
        let mut bucket = self.users.entry(user).or_default();
        let was_offline = bucket.is_empty();
        bucket.insert(connection_id);
        if was_offline {
            debug!(user, "Presence: user online");
        }
        was_offline
    }

    /// Remove a connection from a user's bucket.
    ///
    /// Returns `true` if this was the user's last connection and they are
    /// now offline.
    pub fn remove(&self, user: UserId, connection_id: &ConnectionId) -> bool {
        if let Some(mut bucket) = self.users.get_mut(&user) {
            bucket.remove(connection_id);
            if bucket.is_empty() {
                drop(bucket);
                // Re-check under the entry lock; another connection may have
                // registered in the meantime.
                if self.users.remove_if(&user, |_, b| b.is_empty()).is_some() {
                    debug!(user, "Presence: user offline");
                    return true;
                }
            }
        }
        false
    }

    /// Check if a user has at least one live connection.
    #[must_use]
    pub fn is_online(&self, user: UserId) -> bool {
        self.users
            .get(&user)
            .map(|b| !b.is_empty())
            .unwrap_or(false)
    }

    /// Number of live connections for a user.
    #[must_use]
    pub fn connection_count(&self, user: UserId) -> usize {
        self.users.get(&user).map(|b| b.len()).unwrap_or(0)
    }

    /// Number of users currently online.
    #[must_use]
    pub fn online_count(&self) -> usize {
        self.users.len()
    }
}
