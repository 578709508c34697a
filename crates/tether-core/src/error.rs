//! Error taxonomy for the messaging core.

use crate::store::StoreError;
use thiserror::Error;

/// Errors surfaced by core operations.
///
/// Authentication errors are terminal for the connection attempt; every
/// other variant is converted to a scoped `error` event for the
/// originating connection and never reaches other subscribers.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Bad, expired, or unverifiable credential. The connection is refused.
    #[error("authentication error")]
    Authentication,

    /// Caller is not a participant, or the conversation is not accepted.
    #[error("not authorized for this conversation")]
    Unauthorized,

    /// Empty or oversized message content.
    #[error("invalid message: {0}")]
    InvalidMessage(&'static str),

    /// The message store failed; the operation was aborted before any
    /// broadcast.
    #[error("storage failure: {0}")]
    Persistence(String),
}

impl From<StoreError> for CoreError {
    fn from(err: StoreError) -> Self {
        match err {
            // A missing record reads the same as a forbidden one, so callers
            // cannot probe for existence.
            StoreError::NotFound => CoreError::Unauthorized,
            StoreError::Unavailable(reason) => CoreError::Persistence(reason),
        }
    }
}
