use crate::error::AppError;
use axum::{extract::FromRequestParts, http::request::Parts};
use types::ids::UserId;

/// Header set by the upstream auth layer once the caller is authenticated.
pub const USER_HEADER: &str = "X-User-Id";

pub struct AuthenticatedUser {
    pub user_id: UserId,
}

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(USER_HEADER)
            .ok_or_else(|| AppError::Unauthorized("Missing X-User-Id header".into()))?;
        let raw = header
            .to_str()
            .map_err(|_| AppError::Unauthorized("Invalid header string".into()))?;
        let user_id = raw
            .trim()
            .parse::<UserId>()
            .map_err(|e| AppError::Unauthorized(format!("Invalid user id: {}", e)))?;

        Ok(AuthenticatedUser { user_id })
    }
}
