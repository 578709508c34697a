//! Delivery envelope and connection identity.
//!
//! An [`Envelope`] wraps a server event for broadcast over a channel.
//! Broadcast delivers to every subscriber; events that must skip the
//! originating connection (typing indicators, read receipts) carry the
//! source id so each connection task can filter on receipt.

use std::fmt;
use tether_protocol::ServerEvent;
use uuid::Uuid;

/// Unique identifier for a live connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Create a new connection ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a random connection ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("conn_{}", Uuid::new_v4().simple()))
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ConnectionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ConnectionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A server event addressed to a channel's subscribers.
#[derive(Debug, Clone)]
pub struct Envelope {
    /// The event to deliver.
    pub event: ServerEvent,
    /// Connection excluded from delivery, if any.
    pub skip: Option<ConnectionId>,
}

impl Envelope {
    /// An envelope delivered to every subscriber.
    #[must_use]
    pub fn to_all(event: ServerEvent) -> Self {
        Self { event, skip: None }
    }

    /// An envelope delivered to every subscriber except `skip`.
    #[must_use]
    pub fn excluding(event: ServerEvent, skip: ConnectionId) -> Self {
        Self {
            event,
            skip: Some(skip),
        }
    }

    /// Whether this envelope should be delivered to `connection`.
    #[must_use]
    pub fn delivers_to(&self, connection: &ConnectionId) -> bool {
        self.skip.as_ref() != Some(connection)
    }
}
