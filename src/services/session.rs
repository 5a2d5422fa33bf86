//! Session issuance and validation
//!
//! The authoritative source of truth for "is this caller authenticated, and
//! as whom". Bearer and refresh tokens are opaque random values; only their
//! hashes are stored, and the hot-path lookup in `validate` goes through the
//! unique token_hash index.

use chrono::{Duration, Utc};
use sqlx::Row;
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::db::DbPool;
use crate::models::{parse_db_timestamp, Session, SessionTokens};
use crate::utils::{
    tokens::{generate_token, hash_token},
    AppError,
};

/// Session service backed by the relational store
pub struct SessionService {
    pool: DbPool,
    config: AuthConfig,
}

const SESSION_COLUMNS: &str = "id, user_id, token_hash, refresh_token_hash, device_info, \
     ip_address, user_agent, expires_at, refresh_expires_at, last_activity, is_active, created_at";

impl SessionService {
    pub fn new(pool: DbPool, config: AuthConfig) -> Self {
        Self { pool, config }
    }

    /// Issue a new session for a user
    ///
    /// Token uniqueness is guaranteed by entropy (256 bits from the OS
    /// random source), not by coordination against the store.
    pub async fn issue(
        &self,
        user_id: Uuid,
        device_info: Option<&str>,
        ip_address: Option<&str>,
        user_agent: Option<&str>,
    ) -> Result<SessionTokens, AppError> {
        let token = generate_token();
        let refresh_token = generate_token();

        let now = Utc::now();
        let expires_at = now + Duration::hours(self.config.session_expiry_hours as i64);
        let refresh_expires_at = now + Duration::days(self.config.refresh_expiry_days as i64);
        let session_id = Uuid::new_v4();

        sqlx::query(
            "INSERT INTO sessions (id, user_id, token_hash, refresh_token_hash, device_info, \
             ip_address, user_agent, expires_at, refresh_expires_at, last_activity, is_active, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 1, ?)",
        )
        .bind(session_id.to_string())
        .bind(user_id.to_string())
        .bind(hash_token(&token))
        .bind(hash_token(&refresh_token))
        .bind(device_info)
        .bind(ip_address)
        .bind(user_agent)
        .bind(expires_at.to_rfc3339())
        .bind(refresh_expires_at.to_rfc3339())
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(SessionTokens {
            session_id,
            token,
            refresh_token,
            expires_at,
        })
    }

    /// Validate a bearer token and return the owning session
    ///
    /// Called on every protected request. Updates last_activity on success;
    /// concurrent updates race benignly (last write wins). Expiry is checked
    /// lazily here; an expired row is flipped inactive on the failure path.
    pub async fn validate(&self, token: &str) -> Result<Session, AppError> {
        let token_hash = hash_token(token);

        let row = sqlx::query(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE token_hash = ?"
        ))
        .bind(&token_hash)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(AppError::SessionNotFound)?;

        let session = row_to_session(&row);
        let now = Utc::now();

        if session.is_expired(now) {
            // Fold the sweep into the failure path so an expired session is
            // dead even if the background sweep never runs.
            let _ = sqlx::query("UPDATE sessions SET is_active = 0 WHERE id = ?")
                .bind(session.id.to_string())
                .execute(&self.pool)
                .await;
            return Err(AppError::SessionExpired);
        }

        if !session.is_active {
            return Err(AppError::SessionExpired);
        }

        sqlx::query("UPDATE sessions SET last_activity = ? WHERE id = ?")
            .bind(now.to_rfc3339())
            .bind(session.id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(session)
    }

    /// Exchange a refresh token for a new bearer token
    ///
    /// Preserves the session identity and rotates both tokens, so a stolen
    /// refresh token stops working after its first legitimate use.
    pub async fn refresh(&self, refresh_token: &str) -> Result<SessionTokens, AppError> {
        let refresh_hash = hash_token(refresh_token);

        let row = sqlx::query(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE refresh_token_hash = ?"
        ))
        .bind(&refresh_hash)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(AppError::RefreshTokenInvalid)?;

        let session = row_to_session(&row);
        let now = Utc::now();

        if !session.is_active {
            return Err(AppError::RefreshTokenInvalid);
        }
        match session.refresh_expires_at {
            Some(refresh_expires_at) if now < refresh_expires_at => {}
            _ => return Err(AppError::RefreshTokenInvalid),
        }

        let token = generate_token();
        let new_refresh_token = generate_token();
        let expires_at = now + Duration::hours(self.config.session_expiry_hours as i64);
        let refresh_expires_at = now + Duration::days(self.config.refresh_expiry_days as i64);

        sqlx::query(
            "UPDATE sessions SET token_hash = ?, refresh_token_hash = ?, expires_at = ?, \
             refresh_expires_at = ?, last_activity = ? WHERE id = ?",
        )
        .bind(hash_token(&token))
        .bind(hash_token(&new_refresh_token))
        .bind(expires_at.to_rfc3339())
        .bind(refresh_expires_at.to_rfc3339())
        .bind(now.to_rfc3339())
        .bind(session.id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(SessionTokens {
            session_id: session.id,
            token,
            refresh_token: new_refresh_token,
            expires_at,
        })
    }

    /// Mark a session inactive
    ///
    /// Idempotent: revoking an already-inactive or unknown session is a
    /// no-op success.
    pub async fn revoke(&self, session_id: Uuid) -> Result<(), AppError> {
        sqlx::query("UPDATE sessions SET is_active = 0 WHERE id = ?")
            .bind(session_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Mark every session for a user inactive (logout everywhere)
    pub async fn revoke_all_for_user(&self, user_id: Uuid) -> Result<u64, AppError> {
        let result = sqlx::query("UPDATE sessions SET is_active = 0 WHERE user_id = ? AND is_active = 1")
            .bind(user_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Mark every session for a user inactive except one
    ///
    /// Used after a password change: whoever holds an old token is logged
    /// out, while the session that made the change keeps working.
    pub async fn revoke_others_for_user(&self, user_id: Uuid, keep: Uuid) -> Result<u64, AppError> {
        let result = sqlx::query(
            "UPDATE sessions SET is_active = 0 WHERE user_id = ? AND id != ? AND is_active = 1",
        )
        .bind(user_id.to_string())
        .bind(keep.to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Mark expired sessions inactive
    ///
    /// An optimization only; `validate` checks expiry lazily and is the
    /// correctness path.
    pub async fn sweep_expired(&self) -> Result<u64, AppError> {
        let now = Utc::now().to_rfc3339();
        let result =
            sqlx::query("UPDATE sessions SET is_active = 0 WHERE is_active = 1 AND expires_at <= ?")
                .bind(&now)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }

    /// Active sessions for a user, most recent activity first
    pub async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Session>, AppError> {
        let rows = sqlx::query(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE user_id = ? AND is_active = 1 \
             ORDER BY last_activity DESC"
        ))
        .bind(user_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(row_to_session).collect())
    }

    /// Fetch a session by its identifier
    pub async fn get(&self, session_id: Uuid) -> Result<Option<Session>, AppError> {
        let row = sqlx::query(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?"
        ))
        .bind(session_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(row_to_session))
    }
}

fn row_to_session(row: &sqlx::sqlite::SqliteRow) -> Session {
    let id_str: String = row.get("id");
    let user_id_str: String = row.get("user_id");
    let expires_at: String = row.get("expires_at");
    let refresh_expires_at: Option<String> = row.get("refresh_expires_at");
    let last_activity: String = row.get("last_activity");
    let created_at: String = row.get("created_at");

    Session {
        id: Uuid::parse_str(&id_str).unwrap_or_else(|_| Uuid::nil()),
        user_id: Uuid::parse_str(&user_id_str).unwrap_or_else(|_| Uuid::nil()),
        token_hash: row.get("token_hash"),
        refresh_token_hash: row.get("refresh_token_hash"),
        device_info: row.get("device_info"),
        ip_address: row.get("ip_address"),
        user_agent: row.get("user_agent"),
        expires_at: parse_db_timestamp(&expires_at),
        refresh_expires_at: refresh_expires_at.as_deref().map(parse_db_timestamp),
        last_activity: parse_db_timestamp(&last_activity),
        is_active: row.get("is_active"),
        created_at: parse_db_timestamp(&created_at),
    }
}

/// Spawn the hourly expiry sweep
pub fn spawn_session_sweep(pool: DbPool, config: AuthConfig) {
    tokio::spawn(async move {
        let service = SessionService::new(pool, config);
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(3600));
        loop {
            interval.tick().await;
            match service.sweep_expired().await {
                Ok(0) => {}
                Ok(n) => tracing::info!(sessions = n, "Expiry sweep marked sessions inactive"),
                Err(e) => tracing::error!(error = %e, "Session expiry sweep failed"),
            }
        }
    });
}
