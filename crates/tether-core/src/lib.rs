//! # tether-core
//!
//! Presence, channel membership, and the message pipeline for the Tether
//! realtime messaging core.
//!
//! This crate provides the fundamental building blocks:
//!
//! - **Hub** - Shared server context: channels, subscriptions, presence
//! - **Channel** - Broadcast group, one per conversation or per user
//! - **PresenceRegistry** - Track which users have live connections
//! - **MessagePipeline** - Authorize, persist, and fan out chat traffic
//! - **Authenticator** - Admit connections by bearer credential
//! - Store traits - Interfaces to the platform's users/conversations/messages
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  Connection │────▶│  Pipeline   │────▶│    Hub      │
//! └─────────────┘     └─────────────┘     └─────────────┘
//!        │                   │                   │
//!        ▼                   ▼                   ▼
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │ Authenticator│    │   Stores    │     │  Presence   │
//! └─────────────┘     └─────────────┘     └─────────────┘
//! ```

pub mod auth;
pub mod channel;
pub mod envelope;
pub mod error;
pub mod hub;
pub mod jwt;
pub mod memory;
pub mod pipeline;
pub mod presence;
pub mod store;

pub use auth::Authenticator;
pub use channel::{Channel, ChannelKey};
pub use envelope::{ConnectionId, Envelope};
pub use error::CoreError;
pub use hub::{Hub, HubConfig, HubStats};
pub use jwt::{Claims, JwtVerifier};
pub use memory::MemoryStore;
pub use pipeline::MessagePipeline;
pub use presence::PresenceRegistry;
pub use store::{
    ConversationRecord, ConversationStatus, ConversationStore, MessageStore, StoreError,
    TokenError, TokenVerifier, UserRecord, UserStore,
};
