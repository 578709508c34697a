//! # tether-protocol
//!
//! Wire event definitions for the Tether realtime messaging core.
//!
//! This crate defines the binary protocol used for communication between
//! chat clients and the server: the client and server event sets, the
//! broadcast message payload, and the length-prefixed MessagePack codec.
//!
//! ## Events
//!
//! - `Authenticate` / `Authenticated` - Connection handshake
//! - `JoinConversation` - Conversation channel membership
//! - `SendMessage` / `NewMessage` / `MessageNotification` - Chat delivery
//! - `TypingStart` / `TypingStop` / `UserTyping` / `UserStoppedTyping` - Typing indicators
//! - `MarkMessagesRead` / `MessagesRead` - Read receipts
//!
//! ## Example
//!
//! ```rust
//! use tether_protocol::{codec, ClientEvent};
//!
//! let event = ClientEvent::SendMessage {
//!     conversation_id: 7,
//!     content: "Hello, world!".to_string(),
//! };
//!
//! // Encode and decode
//! let encoded = codec::encode(&event).unwrap();
//! let decoded: ClientEvent = codec::decode(&encoded).unwrap();
//! ```

pub mod codec;
pub mod events;

pub use codec::ProtocolError;
pub use events::{ClientEvent, ConversationId, MessageId, MessagePayload, ServerEvent, UserId};
