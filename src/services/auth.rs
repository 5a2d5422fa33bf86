//! Account and credential management
//!
//! Password hashing uses Argon2id with per-hash random salts. Password reset
//! tokens follow the same opaque-token scheme as sessions: the caller gets
//! the raw value once, the store only ever sees the hash.

use anyhow::{bail, Context, Result};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{Duration, Utc};
use sqlx::Row;
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::db::DbPool;
use crate::models::{parse_db_timestamp, User};
use crate::utils::tokens::{generate_token, hash_token};

/// Account service backed by the relational store
pub struct AuthService {
    pool: DbPool,
    config: AuthConfig,
}

impl AuthService {
    pub fn new(pool: DbPool, config: AuthConfig) -> Self {
        Self { pool, config }
    }

    /// Hash a password with Argon2id
    pub fn hash_password(password: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let argon2 = Argon2::default();
        let hash = argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?;
        Ok(hash.to_string())
    }

    /// Verify a password against a stored hash
    pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
        let parsed = PasswordHash::new(hash)
            .map_err(|e| anyhow::anyhow!("Invalid password hash: {}", e))?;
        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok())
    }

    /// Create a new account
    pub async fn create_user(
        &self,
        email: &str,
        password: &str,
        first_name: &str,
        last_name: &str,
        company_id: Option<Uuid>,
    ) -> Result<User> {
        let email = email.trim().to_lowercase();

        let existing = sqlx::query("SELECT id FROM users WHERE email = ?")
            .bind(&email)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to check for existing user")?;
        if existing.is_some() {
            bail!("Email already registered");
        }

        let user = User::new(
            email,
            Self::hash_password(password)?,
            first_name.to_string(),
            last_name.to_string(),
            company_id,
        );

        sqlx::query(
            "INSERT INTO users (id, email, password_hash, first_name, last_name, company_id, \
             is_active, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(user.id.to_string())
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(user.company_id.map(|id| id.to_string()))
        .bind(user.is_active)
        .bind(user.created_at.to_rfc3339())
        .bind(user.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .context("Failed to insert user")?;

        Ok(user)
    }

    /// Check credentials and return the user on success
    ///
    /// Returns None for an unknown email, a wrong password, or a deactivated
    /// account; callers report all three identically.
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<Option<User>> {
        let email = email.trim().to_lowercase();
        let Some(user) = self.get_user_by_email(&email).await? else {
            return Ok(None);
        };

        if !user.is_active || !Self::verify_password(password, &user.password_hash)? {
            return Ok(None);
        }

        Ok(Some(user))
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let row = sqlx::query(
            "SELECT id, email, password_hash, first_name, last_name, company_id, is_active, \
             created_at, updated_at FROM users WHERE email = ?",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to query user by email")?;

        Ok(row.as_ref().map(row_to_user))
    }

    pub async fn get_user_by_id(&self, user_id: Uuid) -> Result<Option<User>> {
        let row = sqlx::query(
            "SELECT id, email, password_hash, first_name, last_name, company_id, is_active, \
             created_at, updated_at FROM users WHERE id = ?",
        )
        .bind(user_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to query user by id")?;

        Ok(row.as_ref().map(row_to_user))
    }

    /// Change a password, checking the current one first
    ///
    /// Returns false when the current password does not match.
    pub async fn change_password(
        &self,
        user_id: Uuid,
        current_password: &str,
        new_password: &str,
    ) -> Result<bool> {
        let Some(user) = self.get_user_by_id(user_id).await? else {
            return Ok(false);
        };

        if !Self::verify_password(current_password, &user.password_hash)? {
            return Ok(false);
        }

        self.set_password(user_id, new_password).await?;
        Ok(true)
    }

    /// Create a password reset token for an account
    ///
    /// Returns None when no active account has the email, so callers can
    /// respond identically either way and not leak which addresses exist.
    pub async fn create_reset_token(&self, email: &str) -> Result<Option<(User, String)>> {
        let email = email.trim().to_lowercase();
        let Some(user) = self.get_user_by_email(&email).await? else {
            return Ok(None);
        };
        if !user.is_active {
            return Ok(None);
        }

        let token = generate_token();
        let expires_at =
            Utc::now() + Duration::minutes(self.config.reset_token_expiry_minutes as i64);

        sqlx::query(
            "INSERT INTO password_reset_tokens (id, user_id, token_hash, expires_at, created_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(user.id.to_string())
        .bind(hash_token(&token))
        .bind(expires_at.to_rfc3339())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .context("Failed to store reset token")?;

        Ok(Some((user, token)))
    }

    /// Consume a reset token and set the new password
    ///
    /// Single use: the token row is deleted before the password is updated.
    /// Returns the user id on success, None for an unknown or expired token.
    pub async fn reset_password(&self, token: &str, new_password: &str) -> Result<Option<Uuid>> {
        let token_hash = hash_token(token);

        let row = sqlx::query(
            "SELECT id, user_id, expires_at FROM password_reset_tokens WHERE token_hash = ?",
        )
        .bind(&token_hash)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to query reset token")?;

        let Some(row) = row else {
            return Ok(None);
        };

        let token_id: String = row.get("id");
        let user_id_str: String = row.get("user_id");
        let expires_at: String = row.get("expires_at");

        sqlx::query("DELETE FROM password_reset_tokens WHERE id = ?")
            .bind(&token_id)
            .execute(&self.pool)
            .await
            .context("Failed to consume reset token")?;

        if Utc::now() >= parse_db_timestamp(&expires_at) {
            return Ok(None);
        }

        let user_id = Uuid::parse_str(&user_id_str).context("Malformed user id on reset token")?;
        self.set_password(user_id, new_password).await?;
        Ok(Some(user_id))
    }

    /// Update the caller-editable profile fields
    pub async fn update_profile(
        &self,
        user_id: Uuid,
        first_name: &str,
        last_name: &str,
    ) -> Result<Option<User>> {
        sqlx::query("UPDATE users SET first_name = ?, last_name = ?, updated_at = ? WHERE id = ?")
            .bind(first_name)
            .bind(last_name)
            .bind(Utc::now().to_rfc3339())
            .bind(user_id.to_string())
            .execute(&self.pool)
            .await
            .context("Failed to update profile")?;

        self.get_user_by_id(user_id).await
    }

    /// Invite an email address to join the platform
    ///
    /// Returns the raw invitation token exactly once; only the hash is
    /// stored. An address that already has an account cannot be invited.
    pub async fn create_invitation(
        &self,
        inviter: &User,
        email: &str,
    ) -> Result<String> {
        let email = email.trim().to_lowercase();
        if self.get_user_by_email(&email).await?.is_some() {
            bail!("Email already registered");
        }

        let token = generate_token();
        let expires_at = Utc::now() + Duration::days(self.config.invitation_expiry_days as i64);

        sqlx::query(
            "INSERT INTO invitations (id, email, inviter_id, company_id, token_hash, expires_at, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&email)
        .bind(inviter.id.to_string())
        .bind(inviter.company_id.map(|id| id.to_string()))
        .bind(hash_token(&token))
        .bind(expires_at.to_rfc3339())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .context("Failed to store invitation")?;

        Ok(token)
    }

    /// Consume an invitation and create the invited account
    ///
    /// Single use: the invitation row is deleted before the account is
    /// created. The account inherits the inviter's company. Returns None
    /// for an unknown or expired token.
    pub async fn accept_invitation(
        &self,
        token: &str,
        password: &str,
        first_name: &str,
        last_name: &str,
    ) -> Result<Option<User>> {
        let token_hash = hash_token(token);

        let row = sqlx::query(
            "SELECT id, email, company_id, expires_at FROM invitations WHERE token_hash = ?",
        )
        .bind(&token_hash)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to query invitation")?;

        let Some(row) = row else {
            return Ok(None);
        };

        let invitation_id: String = row.get("id");
        let email: String = row.get("email");
        let company_id: Option<String> = row.get("company_id");
        let expires_at: String = row.get("expires_at");

        sqlx::query("DELETE FROM invitations WHERE id = ?")
            .bind(&invitation_id)
            .execute(&self.pool)
            .await
            .context("Failed to consume invitation")?;

        if Utc::now() >= parse_db_timestamp(&expires_at) {
            return Ok(None);
        }

        let company_id = company_id.and_then(|id| Uuid::parse_str(&id).ok());
        let user = self
            .create_user(&email, password, first_name, last_name, company_id)
            .await?;
        Ok(Some(user))
    }

    /// Drop reset tokens past their expiry
    pub async fn cleanup_expired_reset_tokens(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM password_reset_tokens WHERE expires_at <= ?")
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await
            .context("Failed to clean up reset tokens")?;
        Ok(result.rows_affected())
    }

    async fn set_password(&self, user_id: Uuid, new_password: &str) -> Result<()> {
        sqlx::query("UPDATE users SET password_hash = ?, updated_at = ? WHERE id = ?")
            .bind(Self::hash_password(new_password)?)
            .bind(Utc::now().to_rfc3339())
            .bind(user_id.to_string())
            .execute(&self.pool)
            .await
            .context("Failed to update password")?;
        Ok(())
    }
}

fn row_to_user(row: &sqlx::sqlite::SqliteRow) -> User {
    let id_str: String = row.get("id");
    let company_id: Option<String> = row.get("company_id");
    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");

    User {
        id: Uuid::parse_str(&id_str).unwrap_or_else(|_| Uuid::nil()),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        first_name: row.get("first_name"),
        last_name: row.get("last_name"),
        company_id: company_id.and_then(|id| Uuid::parse_str(&id).ok()),
        is_active: row.get("is_active"),
        created_at: parse_db_timestamp(&created_at),
        updated_at: parse_db_timestamp(&updated_at),
    }
}
