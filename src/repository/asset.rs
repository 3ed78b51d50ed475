//! Content-addressed media asset store.
//!
//! Assets are identified by (SHA-256, size); `file_path` is stored relative
//! to the media root. `get_or_create` is the only write path, so two
//! workers downloading the same bytes always converge on one row.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::Utc;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use tracing::debug;

use super::pool::SqlitePool;
use super::records::{MediaAssetRecord, NewMediaAsset};
use super::util::is_unique_violation;
use super::{format_datetime, parse_datetime};
use crate::models::{MediaAsset, MediaType};
use crate::schema::media_assets;
use crate::utils::hash_file;

pub struct AssetRepository {
    pool: SqlitePool,
    media_root: PathBuf,
}

impl AssetRepository {
    pub fn new(pool: SqlitePool, media_root: PathBuf) -> Self {
        Self { pool, media_root }
    }

    /// Register a downloaded file, deduplicating by content.
    ///
    /// Returns the surviving row: the existing asset when the same path was
    /// already registered or identical bytes exist under another path, a
    /// fresh row otherwise. The file must exist; `local_path` must be under
    /// the media root. Callers that receive an asset whose path differs
    /// from `local_path` hold a duplicate file and may remove it.
    pub async fn get_or_create(
        &self,
        local_path: &Path,
        media_type: MediaType,
        source_url: Option<&str>,
    ) -> Result<MediaAsset> {
        if !local_path.is_file() {
            bail!("media file does not exist: {}", local_path.display());
        }
        let relative = self.relative_path(local_path)?;

        let mut conn = self.pool.get().await?;

        // Fast path: this exact path is already registered
        let by_path: Option<MediaAssetRecord> = media_assets::table
            .filter(media_assets::file_path.eq(&relative))
            .first(&mut conn)
            .await
            .optional()?;
        if let Some(record) = by_path {
            return Ok(asset_from_record(record));
        }

        let (checksum, size) = hash_file(local_path)
            .await
            .with_context(|| format!("hashing {}", local_path.display()))?;

        // Same bytes under a different path
        let by_content: Option<MediaAssetRecord> = media_assets::table
            .filter(media_assets::checksum_sha256.eq(&checksum))
            .filter(media_assets::file_size.eq(size as i64))
            .first(&mut conn)
            .await
            .optional()?;
        if let Some(record) = by_content {
            debug!(
                checksum = %checksum,
                path = %relative,
                existing = %record.file_path,
                "duplicate content, reusing existing asset"
            );
            return Ok(asset_from_record(record));
        }

        let file_format = local_path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());

        let insert = diesel::insert_into(media_assets::table)
            .values(NewMediaAsset {
                media_type: media_type.as_str(),
                file_format: file_format.as_deref(),
                source_url,
                file_size: size as i64,
                file_path: &relative,
                checksum_sha256: &checksum,
                created_at: format_datetime(Utc::now()),
            })
            .execute(&mut conn)
            .await;

        match insert {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => {
                debug!(path = %relative, "asset insert lost race, requerying");
            }
            Err(e) => return Err(e.into()),
        }

        // Whichever unique key the race was on, the content key finds the
        // surviving row
        let record: MediaAssetRecord = media_assets::table
            .filter(
                media_assets::file_path.eq(&relative).or(media_assets::checksum_sha256
                    .eq(&checksum)
                    .and(media_assets::file_size.eq(size as i64))),
            )
            .first(&mut conn)
            .await?;
        Ok(asset_from_record(record))
    }

    pub async fn get(&self, asset_id: i64) -> Result<Option<MediaAsset>> {
        let mut conn = self.pool.get().await?;
        let record: Option<MediaAssetRecord> = media_assets::table
            .find(asset_id)
            .first(&mut conn)
            .await
            .optional()?;
        Ok(record.map(asset_from_record))
    }

    /// Absolute on-disk path of an asset.
    pub fn resolve_path(&self, asset: &MediaAsset) -> PathBuf {
        self.media_root.join(&asset.file_path)
    }

    fn relative_path(&self, local_path: &Path) -> Result<String> {
        let relative = local_path.strip_prefix(&self.media_root).with_context(|| {
            format!(
                "{} is not under the media root {}",
                local_path.display(),
                self.media_root.display()
            )
        })?;
        Ok(relative.to_string_lossy().into_owned())
    }
}

fn asset_from_record(record: MediaAssetRecord) -> MediaAsset {
    MediaAsset {
        id: record.id,
        media_type: MediaType::from_str(&record.media_type),
        file_format: record.file_format,
        source_url: record.source_url,
        file_size: record.file_size,
        file_path: record.file_path,
        checksum_sha256: record.checksum_sha256,
        created_at: parse_datetime(&record.created_at),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::DbContext;

    async fn test_ctx() -> (tempfile::TempDir, DbContext) {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("test.db").display());
        let ctx = DbContext::new(&url, dir.path().join("media")).await.unwrap();
        tokio::fs::create_dir_all(ctx.media_root()).await.unwrap();
        (dir, ctx)
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        let (_dir, ctx) = test_ctx().await;
        let missing = ctx.media_root().join("nope.mp4");
        let result = ctx
            .assets()
            .get_or_create(&missing, MediaType::Video, None)
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn same_path_returns_same_row() {
        let (_dir, ctx) = test_ctx().await;
        let path = ctx.media_root().join("a.jpg");
        tokio::fs::write(&path, b"jpeg bytes").await.unwrap();

        let repo = ctx.assets();
        let a = repo.get_or_create(&path, MediaType::Image, None).await.unwrap();
        let b = repo.get_or_create(&path, MediaType::Image, None).await.unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(a.file_path, "a.jpg");
        assert_eq!(a.file_format.as_deref(), Some("jpg"));
    }

    #[tokio::test]
    async fn identical_bytes_dedup_across_paths() {
        let (_dir, ctx) = test_ctx().await;
        let first = ctx.media_root().join("one.mp4");
        let second = ctx.media_root().join("two.mp4");
        tokio::fs::write(&first, b"same video bytes").await.unwrap();
        tokio::fs::write(&second, b"same video bytes").await.unwrap();

        let repo = ctx.assets();
        let a = repo.get_or_create(&first, MediaType::Video, None).await.unwrap();
        let b = repo.get_or_create(&second, MediaType::Video, None).await.unwrap();
        assert_eq!(a.id, b.id);
        // The surviving row keeps the first path
        assert_eq!(b.file_path, "one.mp4");
    }

    #[tokio::test]
    async fn different_bytes_get_distinct_rows() {
        let (_dir, ctx) = test_ctx().await;
        let first = ctx.media_root().join("one.jpg");
        let second = ctx.media_root().join("two.jpg");
        tokio::fs::write(&first, b"aaaa").await.unwrap();
        tokio::fs::write(&second, b"bbbb").await.unwrap();

        let repo = ctx.assets();
        let a = repo.get_or_create(&first, MediaType::Image, None).await.unwrap();
        let b = repo.get_or_create(&second, MediaType::Image, None).await.unwrap();
        assert_ne!(a.id, b.id);
    }
}
