//! Session authentication.
//!
//! Every inbound connection presents a bearer credential before it is
//! admitted. The credential is verified and the account re-fetched from
//! the user store; the resulting record is cached on the connection for
//! the session's lifetime.

use crate::error::CoreError;
use crate::store::{TokenVerifier, UserRecord, UserStore};
use std::sync::Arc;
use tracing::debug;

/// Validates connection credentials against the verifier and user store.
pub struct Authenticator {
    verifier: Arc<dyn TokenVerifier>,
    users: Arc<dyn UserStore>,
}

impl Authenticator {
    /// Create a new authenticator.
    pub fn new(verifier: Arc<dyn TokenVerifier>, users: Arc<dyn UserStore>) -> Self {
        Self { verifier, users }
    }

    /// Resolve a bearer credential to a user record.
    ///
    /// Malformed tokens, expired tokens, and missing accounts all collapse
    /// to the same generic authentication error; the caller closes the
    /// connection and the client must reconnect with a fresh credential.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Authentication` on any failure.
    pub async fn authenticate(&self, token: &str) -> Result<UserRecord, CoreError> {
        let user_id = self.verifier.verify(token).await.map_err(|err| {
            debug!(error = %err, "Token rejected");
            CoreError::Authentication
        })?;

        let user = self.users.user_by_id(user_id).await.map_err(|err| {
            debug!(user = user_id, error = %err, "Account lookup failed");
            CoreError::Authentication
        })?;

        debug!(user = user.id, username = %user.username, "Connection authenticated");
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::store::TokenError;
    use async_trait::async_trait;
    use tether_protocol::UserId;

    struct StaticVerifier(Result<UserId, TokenError>);

    #[async_trait]
    impl TokenVerifier for StaticVerifier {
        async fn verify(&self, _token: &str) -> Result<UserId, TokenError> {
            match &self.0 {
                Ok(id) => Ok(*id),
                Err(TokenError::Invalid) => Err(TokenError::Invalid),
                Err(TokenError::Expired) => Err(TokenError::Expired),
            }
        }
    }

    fn store_with_alice() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store.add_user(UserRecord {
            id: 1,
            username: "alice".to_string(),
            display_name: "Alice".to_string(),
            role: "member".to_string(),
        });
        store
    }

    #[tokio::test]
    async fn test_authenticate_success() {
        let authenticator =
            Authenticator::new(Arc::new(StaticVerifier(Ok(1))), store_with_alice());

        let user = authenticator.authenticate("token").await.unwrap();
        assert_eq!(user.id, 1);
        assert_eq!(user.username, "alice");
    }

    #[tokio::test]
    async fn test_bad_token_is_generic_error() {
        let authenticator = Authenticator::new(
            Arc::new(StaticVerifier(Err(TokenError::Invalid))),
            store_with_alice(),
        );

        assert!(matches!(
            authenticator.authenticate("garbage").await,
            Err(CoreError::Authentication)
        ));
    }

    #[tokio::test]
    async fn test_expired_token_is_generic_error() {
        let authenticator = Authenticator::new(
            Arc::new(StaticVerifier(Err(TokenError::Expired))),
            store_with_alice(),
        );

        assert!(matches!(
            authenticator.authenticate("stale").await,
            Err(CoreError::Authentication)
        ));
    }

    #[tokio::test]
    async fn test_missing_account_is_generic_error() {
        // Token verifies but the account no longer exists.
        let authenticator = Authenticator::new(
            Arc::new(StaticVerifier(Ok(42))),
            store_with_alice(),
        );

        assert!(matches!(
            authenticator.authenticate("token").await,
            Err(CoreError::Authentication)
        ));
    }
}
