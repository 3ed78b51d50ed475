//! Database context: connection pool, media root, and repository access.

use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use diesel_async::SimpleAsyncConnection;

use super::asset::AssetRepository;
use super::entity::EntityRepository;
use super::job::JobRepository;
use super::pool::{AsyncSqliteConnection, DieselError, SqlitePool};

/// Unified entry point for database operations.
///
/// Create one context per process, then use it to access repositories.
#[derive(Clone)]
pub struct DbContext {
    pool: SqlitePool,
    media_root: PathBuf,
}

impl DbContext {
    /// Open a context for a database URL, creating the schema if needed.
    pub async fn new(database_url: &str, media_root: impl Into<PathBuf>) -> Result<Self> {
        let ctx = Self {
            pool: SqlitePool::new(database_url),
            media_root: media_root.into(),
        };
        ctx.init_schema()
            .await
            .with_context(|| format!("initializing schema at {database_url}"))?;
        Ok(ctx)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Directory media-asset paths are relative to.
    pub fn media_root(&self) -> &Path {
        &self.media_root
    }

    pub fn jobs(&self) -> JobRepository {
        JobRepository::new(self.pool.clone())
    }

    pub fn entities(&self) -> EntityRepository {
        EntityRepository::new(self.pool.clone())
    }

    pub fn assets(&self) -> AssetRepository {
        AssetRepository::new(self.pool.clone(), self.media_root.clone())
    }

    /// Create all tables and indexes if they don't exist.
    pub async fn init_schema(&self) -> Result<(), DieselError> {
        let mut conn = self.pool.get().await?;
        Self::create_tables(&mut conn).await
    }

    async fn create_tables(conn: &mut AsyncSqliteConnection) -> Result<(), DieselError> {
        conn.batch_execute(
            r#"
            CREATE TABLE IF NOT EXISTS platforms (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                display_name TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS creators (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                platform_id INTEGER NOT NULL,
                platform_account_id TEXT NOT NULL,
                username TEXT,
                display_name TEXT,
                profile_pic_asset_id INTEGER,
                profile_pic_url TEXT,
                profile_pic_updated_at TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE(platform_id, platform_account_id),
                FOREIGN KEY (platform_id) REFERENCES platforms(id),
                FOREIGN KEY (profile_pic_asset_id) REFERENCES media_assets(id)
            );

            CREATE TABLE IF NOT EXISTS posts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                platform_id INTEGER NOT NULL,
                creator_id INTEGER NOT NULL,
                platform_post_id TEXT NOT NULL,
                post_type TEXT NOT NULL DEFAULT 'unknown',
                url TEXT NOT NULL,
                share_url TEXT NOT NULL,
                title TEXT,
                caption_text TEXT,
                platform_created_at TEXT,
                thumbnail_asset_id INTEGER,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE(platform_id, platform_post_id),
                FOREIGN KEY (platform_id) REFERENCES platforms(id),
                FOREIGN KEY (creator_id) REFERENCES creators(id),
                FOREIGN KEY (thumbnail_asset_id) REFERENCES media_assets(id)
            );

            CREATE TABLE IF NOT EXISTS media_assets (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                media_type TEXT NOT NULL DEFAULT 'unknown',
                file_format TEXT,
                source_url TEXT,
                file_size INTEGER NOT NULL,
                file_path TEXT NOT NULL UNIQUE,
                checksum_sha256 TEXT NOT NULL,
                created_at TEXT NOT NULL,
                UNIQUE(checksum_sha256, file_size)
            );

            CREATE TABLE IF NOT EXISTS post_media (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                post_id INTEGER NOT NULL,
                media_asset_id INTEGER NOT NULL,
                position INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                UNIQUE(post_id, media_asset_id),
                FOREIGN KEY (post_id) REFERENCES posts(id) ON DELETE CASCADE,
                FOREIGN KEY (media_asset_id) REFERENCES media_assets(id)
            );

            CREATE TABLE IF NOT EXISTS jobs (
                id TEXT PRIMARY KEY,
                share_text TEXT NOT NULL,
                share_url TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                post_id INTEGER,
                error_history TEXT NOT NULL DEFAULT '[]',
                next_retry_at TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (post_id) REFERENCES posts(id)
            );

            CREATE INDEX IF NOT EXISTS idx_jobs_share_url_status
                ON jobs(share_url, status);
            CREATE INDEX IF NOT EXISTS idx_jobs_status_retry
                ON jobs(status, next_retry_at);
            CREATE INDEX IF NOT EXISTS idx_post_media_post
                ON post_media(post_id);
            "#,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn schema_init_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("test.db").display());
        let ctx = DbContext::new(&url, dir.path().join("media")).await.unwrap();
        // Second init must be a no-op, not an error
        ctx.init_schema().await.unwrap();
    }
}
