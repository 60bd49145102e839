//! Bearer token authentication for `/api` routes

use crate::error::ApiError;
use crate::state::AppState;
use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use fatura_core::error::AppError;
use fatura_core::port::AuthError;
use tracing::debug;

/// Owner resolved from `Authorization: Bearer <token>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub owner_id: String,
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok());
        let token = bearer_token(header)
            .ok_or_else(|| ApiError::from(AppError::Auth(AuthError::MissingCredentials)))?;

        let claims = state.verifier().verify(token).map_err(|e| {
            debug!(path = %parts.uri.path(), error = %e, "Bearer token rejected");
            ApiError::from(AppError::Auth(e))
        })?;

        Ok(AuthUser {
            owner_id: claims.owner_id,
        })
    }
}

fn bearer_token(header: Option<&str>) -> Option<&str> {
    header?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bearer_token() {
        assert_eq!(bearer_token(Some("Bearer abc")), Some("abc"));
        assert_eq!(bearer_token(Some("Bearer  abc ")), Some("abc"));
        assert_eq!(bearer_token(Some("Bearer ")), None);
        assert_eq!(bearer_token(Some("Basic abc")), None);
        assert_eq!(bearer_token(None), None);
    }
}
