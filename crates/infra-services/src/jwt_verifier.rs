// HS256 bearer token verification
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use fatura_core::port::{AuthError, Claims, CredentialVerifier, TimeProvider};

/// Token payload; older tokens carry the owner as `id` instead of `uid`
#[derive(Debug, Serialize, Deserialize)]
struct TokenClaims {
    #[serde(alias = "id")]
    uid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    iat: Option<i64>,
    exp: i64,
}

pub struct JwtCredentialVerifier {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    time_provider: Arc<dyn TimeProvider>,
}

impl JwtCredentialVerifier {
    pub fn new(secret: &str, time_provider: Arc<dyn TimeProvider>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            time_provider,
        }
    }

    /// Sign a token for `owner_id` valid for `ttl`
    pub fn issue(&self, owner_id: &str, ttl: Duration) -> Result<String, AuthError> {
        let now = self.time_provider.now_millis() / 1000;
        let claims = TokenClaims {
            uid: owner_id.to_string(),
            iat: Some(now),
            exp: now + ttl.as_secs() as i64,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AuthError::InvalidToken(e.to_string()))
    }
}

impl CredentialVerifier for JwtCredentialVerifier {
    fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        if token.is_empty() {
            return Err(AuthError::MissingCredentials);
        }
        let data = decode::<TokenClaims>(token, &self.decoding_key, &self.validation).map_err(
            |e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::Expired,
                _ => AuthError::InvalidToken(e.to_string()),
            },
        )?;

        let claims = data.claims;
        if claims.uid.is_empty() {
            return Err(AuthError::InvalidToken("empty subject".to_string()));
        }
        Ok(Claims {
            owner_id: claims.uid,
            issued_at: claims.iat,
            expires_at: Some(claims.exp),
        })
    }
}
