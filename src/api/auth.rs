//! Authentication endpoints
//!
//! Login, registration, token refresh, logout, and the password lifecycle.
//! Session issuance goes through the session service; every state change
//! leaves a best-effort audit record. Email dispatch is spawned off the
//! request path so a slow or failing SMTP relay never blocks a response.

use axum::{
    extract::{ConnectInfo, State},
    http::{header::USER_AGENT, HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tracing::warn;
use uuid::Uuid;
use validator::Validate;

use crate::{
    middleware::AuthUser,
    models::{SessionTokens, UserPublic},
    services::{AuditEvent, AuthService, SessionService},
    utils::{AppError, AppResult},
    AppState,
};

/// Routes that require no authentication
pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/refresh", post(refresh))
        .route("/forgot-password", post(forgot_password))
        .route("/reset-password", post(reset_password))
        .route("/accept-invitation", post(accept_invitation))
}

/// Routes that require a valid bearer token
pub fn protected_routes() -> Router<AppState> {
    Router::new()
        .route("/logout", post(logout))
        .route("/change-password", post(change_password))
        .route("/me", get(me).put(update_profile))
        .route("/invitations", post(create_invitation))
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
    #[validate(length(min = 1))]
    pub first_name: String,
    #[validate(length(min = 1))]
    pub last_name: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email)]
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ForgotPasswordRequest {
    #[validate(email)]
    pub email: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    pub token: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub new_password: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub current_password: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub new_password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    pub expires_at: chrono::DateTime<chrono::Utc>,
    pub user: UserPublic,
}

impl AuthResponse {
    fn new(tokens: SessionTokens, user: UserPublic) -> Self {
        Self {
            token: tokens.token,
            refresh_token: tokens.refresh_token,
            token_type: "Bearer",
            expires_at: tokens.expires_at,
            user,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    pub expires_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Client address and user agent, for session records and the audit trail
fn client_meta(addr: &SocketAddr, headers: &HeaderMap) -> (Option<String>, Option<String>) {
    let ip = Some(addr.ip().to_string());
    let user_agent = headers
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());
    (ip, user_agent)
}

/// POST /api/v1/auth/register
async fn register(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(payload): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<AuthResponse>)> {
    payload.validate()?;

    let accounts = AuthService::new(state.db.clone(), state.config.auth.clone());
    let user = accounts
        .create_user(
            &payload.email,
            &payload.password,
            &payload.first_name,
            &payload.last_name,
            None,
        )
        .await
        .map_err(|e| {
            if e.to_string().contains("already registered") {
                AppError::Conflict("Email already registered".to_string())
            } else {
                AppError::from(e)
            }
        })?;

    let (ip, user_agent) = client_meta(&addr, &headers);
    let sessions = SessionService::new(state.db.clone(), state.config.auth.clone());
    let tokens = sessions
        .issue(user.id, None, ip.as_deref(), user_agent.as_deref())
        .await?;

    state
        .audit
        .record_best_effort(
            AuditEvent::new("register", "user")
                .user(user.id)
                .resource(user.id.to_string())
                .client(ip, user_agent),
        )
        .await;

    if let Some(mailer) = state.mailer.clone() {
        let email = user.email.clone();
        let first_name = user.first_name.clone();
        tokio::spawn(async move {
            if let Err(e) = mailer.send_welcome(&email, &first_name).await {
                warn!(error = %e, "Welcome email delivery failed");
            }
        });
    }

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse::new(tokens, user.into())),
    ))
}

/// POST /api/v1/auth/login
async fn login(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(payload): Json<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    payload.validate()?;
    let (ip, user_agent) = client_meta(&addr, &headers);

    let accounts = AuthService::new(state.db.clone(), state.config.auth.clone());
    let Some(user) = accounts
        .authenticate(&payload.email, &payload.password)
        .await?
    else {
        // Brute-force attempts must leave a trail even though the caller
        // only sees a generic rejection
        state
            .audit
            .record_best_effort(
                AuditEvent::new("login_failed", "session")
                    .client(ip, user_agent)
                    .metadata(serde_json::json!({ "email": payload.email })),
            )
            .await;
        return Err(AppError::Unauthorized(
            "Invalid email or password".to_string(),
        ));
    };

    let sessions = SessionService::new(state.db.clone(), state.config.auth.clone());
    let tokens = sessions
        .issue(user.id, None, ip.as_deref(), user_agent.as_deref())
        .await?;

    state
        .audit
        .record_best_effort(
            AuditEvent::new("login", "session")
                .user(user.id)
                .resource(tokens.session_id.to_string())
                .client(ip, user_agent),
        )
        .await;

    Ok(Json(AuthResponse::new(tokens, user.into())))
}

/// POST /api/v1/auth/refresh
async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> AppResult<Json<TokenResponse>> {
    let sessions = SessionService::new(state.db.clone(), state.config.auth.clone());
    let tokens = sessions.refresh(&payload.refresh_token).await?;

    Ok(Json(TokenResponse {
        token: tokens.token,
        refresh_token: tokens.refresh_token,
        token_type: "Bearer",
        expires_at: tokens.expires_at,
    }))
}

#[derive(Debug, Deserialize, Default)]
pub struct LogoutQuery {
    /// Revoke every session for the user, not just the current one
    #[serde(default)]
    pub everywhere: bool,
}

/// POST /api/v1/auth/logout
async fn logout(
    State(state): State<AppState>,
    auth_user: AuthUser,
    axum::extract::Query(query): axum::extract::Query<LogoutQuery>,
) -> AppResult<Json<MessageResponse>> {
    let sessions = SessionService::new(state.db.clone(), state.config.auth.clone());

    let message = if query.everywhere {
        let revoked = sessions.revoke_all_for_user(auth_user.id).await?;
        format!("Logged out of {} sessions", revoked)
    } else {
        sessions.revoke(auth_user.session_id).await?;
        "Logged out".to_string()
    };

    state
        .audit
        .record_best_effort(
            AuditEvent::new("logout", "session")
                .user(auth_user.id)
                .resource(auth_user.session_id.to_string()),
        )
        .await;

    Ok(Json(MessageResponse { message }))
}

/// POST /api/v1/auth/forgot-password
///
/// Always answers with the same message so the endpoint does not reveal
/// which email addresses have accounts.
async fn forgot_password(
    State(state): State<AppState>,
    Json(payload): Json<ForgotPasswordRequest>,
) -> AppResult<Json<MessageResponse>> {
    payload.validate()?;

    let accounts = AuthService::new(state.db.clone(), state.config.auth.clone());
    if let Some((user, token)) = accounts.create_reset_token(&payload.email).await? {
        state
            .audit
            .record_best_effort(
                AuditEvent::new("password_reset_requested", "user")
                    .user(user.id)
                    .resource(user.id.to_string()),
            )
            .await;

        if let Some(mailer) = state.mailer.clone() {
            tokio::spawn(async move {
                if let Err(e) = mailer
                    .send_password_reset(&user.email, &user.first_name, &token)
                    .await
                {
                    warn!(error = %e, "Password reset email delivery failed");
                }
            });
        }
    }

    Ok(Json(MessageResponse {
        message: "If the address has an account, a reset link is on its way".to_string(),
    }))
}

/// POST /api/v1/auth/reset-password
///
/// Consumes the single-use token and revokes every existing session for the
/// user; whoever held the old password is logged out everywhere.
async fn reset_password(
    State(state): State<AppState>,
    Json(payload): Json<ResetPasswordRequest>,
) -> AppResult<Json<MessageResponse>> {
    payload.validate()?;

    let accounts = AuthService::new(state.db.clone(), state.config.auth.clone());
    let user_id = accounts
        .reset_password(&payload.token, &payload.new_password)
        .await?
        .ok_or_else(|| {
            AppError::Unauthorized("Invalid or expired reset token".to_string())
        })?;

    let sessions = SessionService::new(state.db.clone(), state.config.auth.clone());
    sessions.revoke_all_for_user(user_id).await?;

    state
        .audit
        .record_best_effort(
            AuditEvent::new("password_reset", "user")
                .user(user_id)
                .resource(user_id.to_string()),
        )
        .await;

    Ok(Json(MessageResponse {
        message: "Password updated".to_string(),
    }))
}

/// POST /api/v1/auth/change-password
async fn change_password(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(payload): Json<ChangePasswordRequest>,
) -> AppResult<Json<MessageResponse>> {
    payload.validate()?;

    let accounts = AuthService::new(state.db.clone(), state.config.auth.clone());
    let changed = accounts
        .change_password(
            auth_user.id,
            &payload.current_password,
            &payload.new_password,
        )
        .await?;
    if !changed {
        return Err(AppError::Unauthorized(
            "Current password is incorrect".to_string(),
        ));
    }

    // A stolen token must not survive the password change; only the session
    // that made the change stays alive
    let sessions = SessionService::new(state.db.clone(), state.config.auth.clone());
    sessions
        .revoke_others_for_user(auth_user.id, auth_user.session_id)
        .await?;

    state
        .audit
        .record_best_effort(
            AuditEvent::new("password_changed", "user")
                .user(auth_user.id)
                .resource(auth_user.id.to_string()),
        )
        .await;

    Ok(Json(MessageResponse {
        message: "Password updated".to_string(),
    }))
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub user: UserPublic,
    #[serde(rename = "sessionId")]
    pub session_id: Uuid,
}

/// GET /api/v1/auth/me
async fn me(State(state): State<AppState>, auth_user: AuthUser) -> AppResult<Json<MeResponse>> {
    let accounts = AuthService::new(state.db.clone(), state.config.auth.clone());
    let user = accounts
        .get_user_by_id(auth_user.id)
        .await?
        .ok_or(AppError::NotFound("User not found".to_string()))?;

    Ok(Json(MeResponse {
        user: user.into(),
        session_id: auth_user.session_id,
    }))
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    #[validate(length(min = 1))]
    pub first_name: String,
    #[validate(length(min = 1))]
    pub last_name: String,
}

/// PUT /api/v1/auth/me
async fn update_profile(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(payload): Json<UpdateProfileRequest>,
) -> AppResult<Json<MeResponse>> {
    payload.validate()?;

    let accounts = AuthService::new(state.db.clone(), state.config.auth.clone());
    let user = accounts
        .update_profile(auth_user.id, &payload.first_name, &payload.last_name)
        .await?
        .ok_or(AppError::NotFound("User not found".to_string()))?;

    state
        .audit
        .record_best_effort(
            AuditEvent::new("profile_updated", "user")
                .user(auth_user.id)
                .resource(auth_user.id.to_string()),
        )
        .await;

    Ok(Json(MeResponse {
        user: user.into(),
        session_id: auth_user.session_id,
    }))
}

#[derive(Debug, Deserialize, Validate)]
pub struct InviteRequest {
    #[validate(email)]
    pub email: String,
}

/// POST /api/v1/auth/invitations
///
/// Mints a single-use invitation link for the address and emails it. The
/// invited account will inherit the inviter's company on acceptance.
async fn create_invitation(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(payload): Json<InviteRequest>,
) -> AppResult<(StatusCode, Json<MessageResponse>)> {
    payload.validate()?;

    let accounts = AuthService::new(state.db.clone(), state.config.auth.clone());
    let inviter = accounts
        .get_user_by_id(auth_user.id)
        .await?
        .ok_or(AppError::NotFound("User not found".to_string()))?;

    let token = accounts
        .create_invitation(&inviter, &payload.email)
        .await
        .map_err(|e| {
            if e.to_string().contains("already registered") {
                AppError::Conflict("Email already registered".to_string())
            } else {
                AppError::from(e)
            }
        })?;

    state
        .audit
        .record_best_effort(
            AuditEvent::new("invitation_sent", "invitation")
                .user(auth_user.id)
                .metadata(serde_json::json!({ "email": payload.email })),
        )
        .await;

    if let Some(mailer) = state.mailer.clone() {
        let email = payload.email.clone();
        let inviter_name = inviter.full_name();
        tokio::spawn(async move {
            if let Err(e) = mailer.send_invitation(&email, &inviter_name, &token).await {
                warn!(error = %e, "Invitation email delivery failed");
            }
        });
    }

    Ok((
        StatusCode::CREATED,
        Json(MessageResponse {
            message: "Invitation sent".to_string(),
        }),
    ))
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AcceptInvitationRequest {
    pub token: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
    #[validate(length(min = 1))]
    pub first_name: String,
    #[validate(length(min = 1))]
    pub last_name: String,
}

/// POST /api/v1/auth/accept-invitation
///
/// Consumes the single-use invitation, creates the account, and signs the
/// new user in.
async fn accept_invitation(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(payload): Json<AcceptInvitationRequest>,
) -> AppResult<(StatusCode, Json<AuthResponse>)> {
    payload.validate()?;

    let accounts = AuthService::new(state.db.clone(), state.config.auth.clone());
    let user = accounts
        .accept_invitation(
            &payload.token,
            &payload.password,
            &payload.first_name,
            &payload.last_name,
        )
        .await?
        .ok_or_else(|| {
            AppError::Unauthorized("Invalid or expired invitation".to_string())
        })?;

    let (ip, user_agent) = client_meta(&addr, &headers);
    let sessions = SessionService::new(state.db.clone(), state.config.auth.clone());
    let tokens = sessions
        .issue(user.id, None, ip.as_deref(), user_agent.as_deref())
        .await?;

    state
        .audit
        .record_best_effort(
            AuditEvent::new("invitation_accepted", "invitation")
                .user(user.id)
                .resource(user.id.to_string())
                .client(ip, user_agent),
        )
        .await;

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse::new(tokens, user.into())),
    ))
}
