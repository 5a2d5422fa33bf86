//! Session authentication middleware
//!
//! Protected routes expect an opaque bearer token in the Authorization
//! header. The middleware validates it against the session store (hot path,
//! unique-index lookup) and injects the authenticated user into request
//! extensions.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
    middleware::Next,
    response::Response,
    Json,
};
use uuid::Uuid;

use crate::{
    services::{AuthService, SessionService},
    utils::ErrorResponse,
    AppState,
};

/// Authenticated caller information attached to the request
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub company_id: Option<Uuid>,
    /// The session the bearer token belongs to (used by logout)
    pub session_id: Uuid,
}

/// Extractor for AuthUser from request extensions
///
/// Allows using AuthUser as a handler parameter after the auth middleware
/// has run.
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, Json<ErrorResponse>);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<AuthUser>().cloned().ok_or_else(|| {
            (
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse::new(
                    "unauthorized",
                    "Authentication required",
                )),
            )
        })
    }
}

/// Extract bearer token from an Authorization header value
pub fn extract_bearer_token(auth_header: &str) -> Option<&str> {
    auth_header
        .strip_prefix("Bearer ")
        .or_else(|| auth_header.strip_prefix("bearer "))
        .filter(|t| !t.is_empty())
}

/// Authentication middleware
///
/// Validates the bearer token and loads the owning user. Validation updates
/// the session's last-activity timestamp as a side effect.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, crate::utils::AppError> {
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(extract_bearer_token)
        .ok_or_else(|| {
            crate::utils::AppError::Unauthorized("Missing bearer token".to_string())
        })?
        .to_string();

    let sessions = SessionService::new(state.db.clone(), state.config.auth.clone());
    let session = sessions.validate(&token).await?;

    let accounts = AuthService::new(state.db.clone(), state.config.auth.clone());
    let user = accounts
        .get_user_by_id(session.user_id)
        .await?
        .filter(|u| u.is_active)
        .ok_or(crate::utils::AppError::SessionNotFound)?;

    request.extensions_mut().insert(AuthUser {
        id: user.id,
        email: user.email,
        first_name: user.first_name,
        last_name: user.last_name,
        company_id: user.company_id,
        session_id: session.id,
    });

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_bearer_token() {
        assert_eq!(extract_bearer_token("Bearer abc123"), Some("abc123"));
        assert_eq!(extract_bearer_token("bearer abc123"), Some("abc123"));
        assert_eq!(extract_bearer_token("Basic abc123"), None);
        assert_eq!(extract_bearer_token("Bearer "), None);
    }
}
