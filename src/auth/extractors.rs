use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{request::Parts, HeaderMap},
};
use tracing::warn;

use super::{
    claims::Identity,
    cookie::read_cookie,
    jwt::{JwtKeys, TokenError},
};
use crate::{config::SESSION_COOKIE, error::AppError};

/// Session token from the auth cookie, falling back to `Authorization: Bearer`.
pub fn session_token(headers: &HeaderMap) -> Option<&str> {
    read_cookie(headers, SESSION_COOKIE).or_else(|| {
        let auth = headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())?;
        auth.strip_prefix("Bearer ")
            .or_else(|| auth.strip_prefix("bearer "))
            .filter(|t| !t.is_empty())
    })
}

/// Any signed-in account.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser(pub Identity);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = session_token(&parts.headers)
            .ok_or_else(|| AppError::Unauthorized("Not authenticated".into()))?;

        let keys = JwtKeys::from_ref(state);
        match keys.verify(token) {
            Ok(claims) => Ok(AuthUser(Identity::from(&claims))),
            Err(TokenError::Expired) => {
                warn!("expired session token");
                Err(AppError::Unauthorized("Session expired".into()))
            }
            Err(_) => {
                warn!("invalid session token");
                Err(AppError::Unauthorized("Invalid session".into()))
            }
        }
    }
}

/// Signed-in account holding the `ADMIN` role.
#[derive(Debug, Clone, Copy)]
pub struct AdminUser(pub Identity);

#[async_trait]
impl<S> FromRequestParts<S> for AdminUser
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let AuthUser(identity) = AuthUser::from_request_parts(parts, state).await?;
        if !identity.role.is_admin() {
            warn!(user_id = %identity.user_id, "admin route denied");
            return Err(AppError::Forbidden("Admin access required".into()));
        }
        Ok(AdminUser(identity))
    }
}
