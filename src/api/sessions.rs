//! Session management endpoints
//!
//! Lets a user see their active sessions ("your devices") and revoke any of
//! them individually.

use axum::{
    extract::{Path, State},
    routing::{delete, get},
    Json, Router,
};
use serde::Serialize;
use uuid::Uuid;

use crate::{
    middleware::AuthUser,
    models::SessionPublic,
    services::{AuditEvent, SessionService},
    utils::{AppError, AppResult},
    AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_sessions))
        .route("/{id}", delete(revoke_session))
}

#[derive(Debug, Serialize)]
pub struct SessionListResponse {
    pub sessions: Vec<SessionView>,
}

#[derive(Debug, Serialize)]
pub struct SessionView {
    #[serde(flatten)]
    pub session: SessionPublic,
    /// Whether this row backs the token used for this request
    pub current: bool,
}

/// GET /api/v1/sessions
async fn list_sessions(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> AppResult<Json<SessionListResponse>> {
    let sessions = SessionService::new(state.db.clone(), state.config.auth.clone());
    let rows = sessions.list_for_user(auth_user.id).await?;

    let sessions = rows
        .into_iter()
        .map(|s| {
            let current = s.id == auth_user.session_id;
            SessionView {
                session: s.into(),
                current,
            }
        })
        .collect();

    Ok(Json(SessionListResponse { sessions }))
}

/// DELETE /api/v1/sessions/{id}
///
/// Revokes one of the caller's own sessions. Another user's session id
/// answers 404; revocation itself is idempotent.
async fn revoke_session(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(session_id): Path<Uuid>,
) -> AppResult<Json<serde_json::Value>> {
    let sessions = SessionService::new(state.db.clone(), state.config.auth.clone());

    let session = sessions
        .get(session_id)
        .await?
        .filter(|s| s.user_id == auth_user.id)
        .ok_or(AppError::NotFound("Session not found".to_string()))?;

    sessions.revoke(session.id).await?;

    state
        .audit
        .record_best_effort(
            AuditEvent::new("session_revoked", "session")
                .user(auth_user.id)
                .resource(session.id.to_string()),
        )
        .await;

    Ok(Json(serde_json::json!({ "message": "Session revoked" })))
}
