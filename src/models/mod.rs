//! Data models

mod audit;
mod session;
mod user;

pub use audit::{AuditLogEntry, AuditLogQuery};
pub use session::{Session, SessionPublic, SessionTokens};
pub use user::{User, UserPublic};

use chrono::{DateTime, Utc};

/// Parse a timestamp stored as text in the database
///
/// Rows written by this application are RFC 3339; the second format covers
/// values inserted by SQLite defaults. A malformed value falls back to the
/// Unix epoch so anything gated on it (session expiry in particular) reads
/// as long past, never as fresh.
pub(crate) fn parse_db_timestamp(ts: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(ts) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(ts, "%Y-%m-%d %H:%M:%S") {
        return DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc);
    }
    tracing::warn!(value = ts, "Malformed timestamp in database");
    DateTime::UNIX_EPOCH
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_db_timestamp_formats() {
        let rfc3339 = parse_db_timestamp("2026-08-29T10:30:00+00:00");
        assert_eq!(rfc3339.to_rfc3339(), "2026-08-29T10:30:00+00:00");

        let sqlite = parse_db_timestamp("2026-08-29 10:30:00");
        assert_eq!(sqlite, rfc3339);
    }

    #[test]
    fn test_malformed_timestamp_reads_as_long_past() {
        // Garbage must not read as "now": a session row with a corrupt
        // expiry has to come out expired, not freshly active
        assert_eq!(parse_db_timestamp("not a date"), DateTime::UNIX_EPOCH);
        assert!(parse_db_timestamp("") < Utc::now());
    }
}
