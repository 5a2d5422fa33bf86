//! Audit trail
//!
//! Append-only record of security-relevant events. Rows are never updated
//! or deleted. Recording must not take the primary operation down with it,
//! so callers use `record_best_effort` which logs failures and returns.

use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::Row;
use uuid::Uuid;

use crate::db::DbPool;
use crate::models::{parse_db_timestamp, AuditLogEntry, AuditLogQuery};

/// Input for one audit record
#[derive(Debug, Default, Clone)]
pub struct AuditEvent {
    pub user_id: Option<Uuid>,
    pub action: String,
    pub resource_type: String,
    pub resource_id: Option<String>,
    pub company_id: Option<Uuid>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub prior_state: Option<serde_json::Value>,
    pub new_state: Option<serde_json::Value>,
    pub metadata: Option<serde_json::Value>,
}

impl AuditEvent {
    pub fn new(action: impl Into<String>, resource_type: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            resource_type: resource_type.into(),
            ..Default::default()
        }
    }

    pub fn user(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn resource(mut self, resource_id: impl Into<String>) -> Self {
        self.resource_id = Some(resource_id.into());
        self
    }

    pub fn client(mut self, ip_address: Option<String>, user_agent: Option<String>) -> Self {
        self.ip_address = ip_address;
        self.user_agent = user_agent;
        self
    }

    pub fn metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Append-only audit recorder
#[derive(Clone)]
pub struct AuditRecorder {
    pool: DbPool,
}

impl AuditRecorder {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Append an audit record
    pub async fn record(&self, event: AuditEvent) -> Result<Uuid> {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO audit_logs (id, user_id, action, resource_type, resource_id, company_id, \
             ip_address, user_agent, prior_state, new_state, metadata, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(id.to_string())
        .bind(event.user_id.map(|u| u.to_string()))
        .bind(&event.action)
        .bind(&event.resource_type)
        .bind(&event.resource_id)
        .bind(event.company_id.map(|c| c.to_string()))
        .bind(&event.ip_address)
        .bind(&event.user_agent)
        .bind(event.prior_state.as_ref().map(|v| v.to_string()))
        .bind(event.new_state.as_ref().map(|v| v.to_string()))
        .bind(event.metadata.as_ref().map(|v| v.to_string()))
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .context("Failed to append audit record")?;

        Ok(id)
    }

    /// Append an audit record without propagating failures
    ///
    /// The audit trail never takes its caller down; a failed append is
    /// logged and swallowed.
    pub async fn record_best_effort(&self, event: AuditEvent) {
        let action = event.action.clone();
        if let Err(e) = self.record(event).await {
            tracing::error!(action = %action, error = %e, "Failed to append audit record");
        }
    }

    /// Query the trail, newest first
    pub async fn list(&self, query: &AuditLogQuery) -> Result<Vec<AuditLogEntry>> {
        let mut sql = String::from(
            "SELECT id, user_id, action, resource_type, resource_id, company_id, ip_address, \
             user_agent, prior_state, new_state, metadata, created_at FROM audit_logs WHERE 1=1",
        );
        let mut binds: Vec<String> = Vec::new();

        if let Some(user_id) = query.user_id {
            sql.push_str(" AND user_id = ?");
            binds.push(user_id.to_string());
        }
        if let Some(action) = &query.action {
            sql.push_str(" AND action = ?");
            binds.push(action.clone());
        }
        if let Some(resource_type) = &query.resource_type {
            sql.push_str(" AND resource_type = ?");
            binds.push(resource_type.clone());
        }
        if let Some(company_id) = query.company_id {
            sql.push_str(" AND company_id = ?");
            binds.push(company_id.to_string());
        }

        sql.push_str(" ORDER BY created_at DESC LIMIT ? OFFSET ?");

        let mut q = sqlx::query(&sql);
        for bind in &binds {
            q = q.bind(bind);
        }
        q = q
            .bind(query.limit.unwrap_or(100).min(1000) as i64)
            .bind(query.offset.unwrap_or(0) as i64);

        let rows = q
            .fetch_all(&self.pool)
            .await
            .context("Failed to query audit records")?;

        Ok(rows.iter().map(row_to_entry).collect())
    }
}

fn row_to_entry(row: &sqlx::sqlite::SqliteRow) -> AuditLogEntry {
    let id_str: String = row.get("id");
    let user_id: Option<String> = row.get("user_id");
    let company_id: Option<String> = row.get("company_id");
    let prior_state: Option<String> = row.get("prior_state");
    let new_state: Option<String> = row.get("new_state");
    let metadata: Option<String> = row.get("metadata");
    let created_at: String = row.get("created_at");

    AuditLogEntry {
        id: Uuid::parse_str(&id_str).unwrap_or_else(|_| Uuid::nil()),
        user_id: user_id.and_then(|u| Uuid::parse_str(&u).ok()),
        action: row.get("action"),
        resource_type: row.get("resource_type"),
        resource_id: row.get("resource_id"),
        company_id: company_id.and_then(|c| Uuid::parse_str(&c).ok()),
        ip_address: row.get("ip_address"),
        user_agent: row.get("user_agent"),
        prior_state: prior_state.and_then(|s| serde_json::from_str(&s).ok()),
        new_state: new_state.and_then(|s| serde_json::from_str(&s).ok()),
        metadata: metadata.and_then(|s| serde_json::from_str(&s).ok()),
        created_at: parse_db_timestamp(&created_at),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;
    use serde_json::json;

    async fn test_recorder() -> AuditRecorder {
        let pool = crate::db::init_pool(&DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
        })
        .await
        .expect("in-memory database");
        AuditRecorder::new(pool)
    }

    #[tokio::test]
    async fn test_record_and_list() {
        let recorder = test_recorder().await;
        let user_id = Uuid::new_v4();

        recorder
            .record(
                AuditEvent::new("login", "session")
                    .user(user_id)
                    .client(Some("1.2.3.4".to_string()), Some("curl/8".to_string()))
                    .metadata(json!({"device": "laptop"})),
            )
            .await
            .unwrap();
        recorder
            .record(AuditEvent::new("logout", "session").user(user_id))
            .await
            .unwrap();
        recorder
            .record(AuditEvent::new("login", "session").user(Uuid::new_v4()))
            .await
            .unwrap();

        let all = recorder.list(&AuditLogQuery::default()).await.unwrap();
        assert_eq!(all.len(), 3);

        let mine = recorder
            .list(&AuditLogQuery {
                user_id: Some(user_id),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(mine.len(), 2);

        let logins = recorder
            .list(&AuditLogQuery {
                user_id: Some(user_id),
                action: Some("login".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(logins.len(), 1);
        assert_eq!(logins[0].ip_address.as_deref(), Some("1.2.3.4"));
        assert_eq!(logins[0].metadata, Some(json!({"device": "laptop"})));
    }

    #[tokio::test]
    async fn test_best_effort_never_panics_on_failure() {
        let recorder = test_recorder().await;
        // Close the pool so the insert fails; the call must still return.
        recorder.pool.close().await;
        recorder
            .record_best_effort(AuditEvent::new("login", "session"))
            .await;
    }

    #[tokio::test]
    async fn test_list_respects_limit_and_offset() {
        let recorder = test_recorder().await;
        for i in 0..5 {
            recorder
                .record(AuditEvent::new(format!("action-{i}"), "session"))
                .await
                .unwrap();
        }

        let page = recorder
            .list(&AuditLogQuery {
                limit: Some(2),
                offset: Some(2),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page.len(), 2);
    }
}
