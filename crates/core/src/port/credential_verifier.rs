// Credential Verifier Port
// Shared by HTTP authentication and the push-channel handshake

use crate::domain::OwnerId;
use thiserror::Error;

/// Verified identity carried by a credential
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claims {
    pub owner_id: OwnerId,
    pub issued_at: Option<i64>,
    pub expires_at: Option<i64>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Missing credentials")]
    MissingCredentials,

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Token expired")]
    Expired,

    #[error("Token does not belong to the claimed user")]
    OwnerMismatch,
}

/// Credential Verifier trait
///
/// Implementations:
/// - JwtCredentialVerifier: HS256 bearer tokens
#[cfg_attr(test, mockall::automock)]
pub trait CredentialVerifier: Send + Sync {
    /// Decode and validate a bearer token
    fn verify(&self, token: &str) -> Result<Claims, AuthError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::collections::HashMap;

    /// Verifier backed by a fixed token -> owner table
    #[derive(Default)]
    pub struct StaticCredentialVerifier {
        tokens: HashMap<String, OwnerId>,
    }

    impl StaticCredentialVerifier {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_token(mut self, token: impl Into<String>, owner_id: impl Into<String>) -> Self {
            self.tokens.insert(token.into(), owner_id.into());
            self
        }
    }

    impl CredentialVerifier for StaticCredentialVerifier {
        fn verify(&self, token: &str) -> Result<Claims, AuthError> {
            self.tokens
                .get(token)
                .map(|owner_id| Claims {
                    owner_id: owner_id.clone(),
                    issued_at: None,
                    expires_at: None,
                })
                .ok_or_else(|| AuthError::InvalidToken("unknown token".to_string()))
        }
    }
}
