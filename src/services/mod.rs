//! Business logic services

pub mod audit;
pub mod auth;
pub mod mailer;
pub mod session;

pub use audit::{AuditEvent, AuditRecorder};
pub use auth::AuthService;
pub use mailer::Mailer;
pub use session::{spawn_session_sweep, SessionService};
