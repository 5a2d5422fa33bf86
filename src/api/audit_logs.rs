//! Audit log endpoints
//!
//! Read-only view over the append-only trail, scoped to the caller's own
//! records.

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::Serialize;

use crate::{
    middleware::AuthUser,
    models::{AuditLogEntry, AuditLogQuery},
    utils::AppResult,
    AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new().route("/", get(list_audit_logs))
}

#[derive(Debug, Serialize)]
pub struct AuditLogListResponse {
    pub entries: Vec<AuditLogEntry>,
}

/// GET /api/v1/audit-logs
///
/// Filters by action and resource type come from the query string; the
/// user filter is always forced to the caller.
async fn list_audit_logs(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Query(mut query): Query<AuditLogQuery>,
) -> AppResult<Json<AuditLogListResponse>> {
    query.user_id = Some(auth_user.id);
    query.company_id = None;

    let entries = state.audit.list(&query).await?;
    Ok(Json(AuditLogListResponse { entries }))
}
