//! Async SQLite connection factory.
//!
//! Uses diesel-async's SyncConnectionWrapper to provide an async interface
//! for SQLite. SQLite connections are lightweight, so a new connection is
//! created per request rather than pooled.

use diesel::sqlite::SqliteConnection;
use diesel_async::sync_connection_wrapper::SyncConnectionWrapper;
use diesel_async::{AsyncConnection, SimpleAsyncConnection};

/// Diesel error type alias.
pub type DieselError = diesel::result::Error;

/// Async SQLite connection using SyncConnectionWrapper.
pub type AsyncSqliteConnection = SyncConnectionWrapper<SqliteConnection>;

/// A simple async connection factory for SQLite.
///
/// The SyncConnectionWrapper internally uses spawn_blocking, so repository
/// calls never block the async runtime.
#[derive(Clone)]
pub struct SqlitePool {
    database_url: String,
}

impl SqlitePool {
    /// Create a new pool for a database URL.
    pub fn new(database_url: &str) -> Self {
        // Strip sqlite:// or sqlite: prefix; diesel wants a bare path
        let url = database_url
            .strip_prefix("sqlite://")
            .or_else(|| database_url.strip_prefix("sqlite:"))
            .unwrap_or(database_url);
        Self {
            database_url: url.to_string(),
        }
    }

    /// Get a new connection with the standard pragmas applied.
    ///
    /// busy_timeout keeps concurrent writers from surfacing SQLITE_BUSY as
    /// errors; foreign_keys is off by default in SQLite and the schema
    /// relies on it.
    pub async fn get(&self) -> Result<AsyncSqliteConnection, DieselError> {
        let mut conn = AsyncSqliteConnection::establish(&self.database_url)
            .await
            .map_err(super::util::to_diesel_error)?;
        conn.batch_execute(
            "PRAGMA busy_timeout = 5000;\n\
             PRAGMA foreign_keys = ON;\n\
             PRAGMA journal_mode = WAL;",
        )
        .await?;
        Ok(conn)
    }

    /// The database URL (path form) this pool connects to.
    pub fn database_url(&self) -> &str {
        &self.database_url
    }
}
