//! API routes and handlers

use axum::{routing::get, Router};

use crate::AppState;

mod audit_logs;
mod auth;
mod health;
mod sessions;

pub use health::*;

/// Health endpoints
///
/// Mounted outside the rate-limited nests so load balancers and monitors
/// can poll freely.
pub fn health_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/health/detailed", get(health::health_check_detailed))
}

/// Public API routes (no authentication required)
pub fn public_routes() -> Router<AppState> {
    Router::new().nest("/auth", auth::public_routes())
}

/// Protected API routes (bearer token required)
pub fn protected_routes() -> Router<AppState> {
    Router::new()
        .nest("/auth", auth::protected_routes())
        .nest("/sessions", sessions::routes())
        .nest("/audit-logs", audit_logs::routes())
}
