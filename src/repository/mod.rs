//! Repository layer for database persistence.
//!
//! All database access uses Diesel ORM over an async SQLite connection
//! (SyncConnectionWrapper). Concurrency correctness comes from the schema's
//! unique constraints plus conflict-and-requery, never from in-process locks.

pub mod asset;
pub mod context;
pub mod entity;
pub mod job;
pub mod pool;
pub mod records;
pub mod util;

pub use asset::AssetRepository;
pub use context::DbContext;
pub use entity::EntityRepository;
pub use job::JobRepository;
pub use pool::{AsyncSqliteConnection, DieselError, SqlitePool};

use chrono::{DateTime, Utc};

/// Parse a datetime string from the database, defaulting to Unix epoch on error.
pub fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::UNIX_EPOCH)
}

/// Parse an optional datetime string from the database.
pub fn parse_datetime_opt(s: &Option<String>) -> Option<DateTime<Utc>> {
    s.as_deref()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

/// Format a datetime for storage (RFC 3339 TEXT columns).
pub fn format_datetime(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn datetime_round_trip() {
        let now = Utc::now();
        let parsed = parse_datetime(&format_datetime(now));
        assert_eq!(parsed.timestamp_micros(), now.timestamp_micros());
    }

    #[test]
    fn invalid_datetime_falls_back_to_epoch() {
        assert_eq!(parse_datetime("not a date"), DateTime::UNIX_EPOCH);
        assert_eq!(parse_datetime_opt(&Some("nope".to_string())), None);
        assert_eq!(parse_datetime_opt(&None), None);
    }
}
