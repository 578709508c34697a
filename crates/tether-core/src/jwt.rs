//! JWT-backed credential verification.
//!
//! Tokens are issued elsewhere on the platform; this side only validates
//! signature and expiry and extracts the subject.

use crate::store::{TokenError, TokenVerifier};
use async_trait::async_trait;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use tether_protocol::UserId;

/// Claims carried by a platform session token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id the token was issued for.
    pub sub: UserId,
    /// Account name at issue time.
    pub username: String,
    /// Expiry, seconds since the Unix epoch.
    pub exp: u64,
}

/// Verifies HS256-signed platform tokens.
pub struct JwtVerifier {
    decoding: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    /// Create a verifier for tokens signed with `secret`.
    #[must_use]
    pub fn new(secret: &str) -> Self {
        Self {
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }
}

#[async_trait]
impl TokenVerifier for JwtVerifier {
    async fn verify(&self, token: &str) -> Result<UserId, TokenError> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation).map_err(|err| {
            match err.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid,
            }
        })?;

        Ok(data.claims.sub)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, get_current_timestamp, EncodingKey, Header};

    const SECRET: &str = "test-secret";

    fn token_for(sub: UserId, exp: u64) -> String {
        let claims = Claims {
            sub,
            username: "alice".to_string(),
            exp,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_valid_token() {
        let verifier = JwtVerifier::new(SECRET);
        let token = token_for(1, get_current_timestamp() + 3600);

        assert_eq!(verifier.verify(&token).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_expired_token() {
        let verifier = JwtVerifier::new(SECRET);
        // Past the default validation leeway.
        let token = token_for(1, get_current_timestamp() - 3600);

        assert!(matches!(
            verifier.verify(&token).await,
            Err(TokenError::Expired)
        ));
    }

    #[tokio::test]
    async fn test_wrong_secret() {
        let verifier = JwtVerifier::new("other-secret");
        let token = token_for(1, get_current_timestamp() + 3600);

        assert!(matches!(
            verifier.verify(&token).await,
            Err(TokenError::Invalid)
        ));
    }

    #[tokio::test]
    async fn test_garbage_token() {
        let verifier = JwtVerifier::new(SECRET);

        assert!(matches!(
            verifier.verify("not-a-jwt").await,
            Err(TokenError::Invalid)
        ));
    }
}
