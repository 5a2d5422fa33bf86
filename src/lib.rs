//! StaySpot Identity
//!
//! Authentication and session backbone for the StaySpot property management
//! platform: ingress policy (security headers, origin allow-listing, tiered
//! rate limits), opaque-token sessions, an append-only audit trail, and
//! lifecycle email.

use std::sync::Arc;

pub mod api;
pub mod config;
pub mod db;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

pub use config::AppConfig;
pub use db::DbPool;
pub use middleware::{auth_middleware, AuthUser};
use services::{AuditRecorder, Mailer};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<AppConfig>,
    /// Database connection pool
    pub db: DbPool,
    /// Audit trail recorder
    pub audit: AuditRecorder,
    /// Mail dispatcher (None when SMTP is not configured)
    pub mailer: Option<Arc<Mailer>>,
}
