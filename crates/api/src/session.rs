//! Session extraction from request headers.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use common::SessionId;

use crate::error::ApiError;

/// Header carrying the opaque session id.
pub const SESSION_HEADER: &str = "x-session-id";

/// The session a request belongs to.
#[derive(Debug, Clone)]
pub struct Session(pub SessionId);

impl<S> FromRequestParts<S> for Session
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(SESSION_HEADER)
            .ok_or_else(|| ApiError::Unauthorized(format!("Missing {SESSION_HEADER} header")))?;

        let id = value
            .to_str()
            .ok()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ApiError::Unauthorized(format!("Invalid {SESSION_HEADER} header")))?;

        Ok(Session(SessionId::new(id)))
    }
}
