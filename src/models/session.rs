//! Session model
//!
//! One row per authenticated device/browser context. The bearer and refresh
//! tokens themselves are never persisted, only their hashes. A session flips
//! active to inactive exactly once (revocation or expiry) and never back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Persisted session record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
    #[serde(skip_serializing)]
    pub token_hash: String,
    #[serde(skip_serializing)]
    pub refresh_token_hash: Option<String>,
    /// Free-form device/client description
    pub device_info: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub refresh_expires_at: Option<DateTime<Utc>>,
    pub last_activity: DateTime<Utc>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Whether the bearer token has passed its absolute expiry
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Session data safe to show on a "your devices" surface
#[derive(Debug, Clone, Serialize)]
pub struct SessionPublic {
    pub id: Uuid,
    pub device_info: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub last_activity: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl From<Session> for SessionPublic {
    fn from(session: Session) -> Self {
        Self {
            id: session.id,
            device_info: session.device_info,
            ip_address: session.ip_address,
            user_agent: session.user_agent,
            last_activity: session.last_activity,
            created_at: session.created_at,
        }
    }
}

/// Token pair handed to the client at issuance or refresh
#[derive(Debug, Clone, Serialize)]
pub struct SessionTokens {
    pub session_id: Uuid,
    pub token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample_session(expires_at: DateTime<Utc>) -> Session {
        Session {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            token_hash: "h".to_string(),
            refresh_token_hash: None,
            device_info: None,
            ip_address: None,
            user_agent: None,
            expires_at,
            refresh_expires_at: None,
            last_activity: Utc::now(),
            is_active: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_expiry_check() {
        let now = Utc::now();
        assert!(sample_session(now - Duration::seconds(1)).is_expired(now));
        assert!(!sample_session(now + Duration::hours(1)).is_expired(now));
    }

    #[test]
    fn test_serialization_hides_hashes() {
        let session = sample_session(Utc::now());
        let json = serde_json::to_string(&session).unwrap();
        assert!(!json.contains("token_hash"));
    }
}
