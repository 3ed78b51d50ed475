//! Media service: the facade adapters fetch media through.
//!
//! Ties the download engine to the asset store and link table: download a
//! URL, register the file content-addressed, remove the local copy when it
//! turned out to be a duplicate, link the surviving asset to its post.

use std::path::PathBuf;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::download::{DownloadError, DownloadOptions, Downloader};
use crate::models::{Creator, MediaAsset, MediaDescriptor, MediaType, Post, PostMedia};
use crate::repository::DbContext;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error(transparent)]
    Download(#[from] DownloadError),
    /// Database or filesystem trouble around the store; retryable.
    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

impl MediaError {
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Download(e) => e.is_transient(),
            Self::Storage(_) => true,
        }
    }
}

#[derive(Clone)]
pub struct MediaService {
    ctx: DbContext,
    downloader: Downloader,
}

impl MediaService {
    pub fn new(ctx: DbContext, downloader: Downloader) -> Self {
        Self { ctx, downloader }
    }

    pub fn context(&self) -> &DbContext {
        &self.ctx
    }

    /// Download one media item of a post, dedup it into the asset store,
    /// and link it at the given position.
    pub async fn fetch_post_media(
        &self,
        post: &Post,
        item: &MediaDescriptor,
        position: i32,
    ) -> Result<PostMedia, MediaError> {
        let dir = self.post_dir(post).await?;
        let options = DownloadOptions {
            name_hint: Some(format!("{}-{}", post.platform_post_id, position)),
            extension_fallback: item.extension_hint.clone(),
            use_cookies: true,
            ..DownloadOptions::default()
        };

        let path = self.downloader.download_file(&item.url, &dir, &options).await?;
        let asset = self
            .ctx
            .assets()
            .get_or_create(&path, item.media_type, Some(&item.url))
            .await?;
        self.discard_duplicate(&path, &asset).await;

        let link = self
            .ctx
            .entities()
            .link_post_media(post.id, asset.id, position)
            .await
            .map_err(anyhow::Error::from)?;

        info!(
            post_id = post.id,
            asset_id = asset.id,
            position,
            path = %asset.file_path,
            "media stored"
        );
        Ok(link)
    }

    /// Download a standalone attachment (profile picture, thumbnail) into
    /// the asset store without linking it to a post.
    pub async fn fetch_attachment(
        &self,
        url: &str,
        media_type: MediaType,
        subdir: &str,
        name_hint: &str,
    ) -> Result<MediaAsset, MediaError> {
        let dir = self.ctx.media_root().join(subdir);
        let options = DownloadOptions {
            name_hint: Some(name_hint.to_string()),
            extension_fallback: Some("jpg".to_string()),
            use_cookies: true,
            ..DownloadOptions::default()
        };

        let path = self.downloader.download_file(url, &dir, &options).await?;
        let asset = self
            .ctx
            .assets()
            .get_or_create(&path, media_type, Some(url))
            .await?;
        self.discard_duplicate(&path, &asset).await;
        Ok(asset)
    }

    /// Cache a creator's profile picture. Best-effort: failures are
    /// reported, not fatal to the job.
    pub async fn cache_profile_pic(
        &self,
        platform_name: &str,
        creator: &Creator,
        url: &str,
    ) -> Result<(), MediaError> {
        // Already cached from this exact URL
        if creator.profile_pic_asset_id.is_some() && creator.profile_pic_url.as_deref() == Some(url)
        {
            return Ok(());
        }
        let subdir = format!("{platform_name}/profiles");
        let asset = self
            .fetch_attachment(url, MediaType::ProfilePic, &subdir, &creator.platform_account_id)
            .await?;
        self.ctx
            .entities()
            .set_creator_profile_pic(creator.id, asset.id, url)
            .await
            .map_err(anyhow::Error::from)?;
        Ok(())
    }

    /// Cache a post's thumbnail. Best-effort like the profile picture.
    pub async fn cache_thumbnail(
        &self,
        platform_name: &str,
        post: &Post,
        url: &str,
    ) -> Result<(), MediaError> {
        if post.thumbnail_asset_id.is_some() {
            return Ok(());
        }
        let subdir = format!("{platform_name}/thumbs");
        let asset = self
            .fetch_attachment(url, MediaType::Thumbnail, &subdir, &post.platform_post_id)
            .await?;
        self.ctx
            .entities()
            .set_post_thumbnail(post.id, asset.id)
            .await
            .map_err(anyhow::Error::from)?;
        Ok(())
    }

    /// Whether every asset linked to the post is present on disk.
    ///
    /// A post with no links yet counts as incomplete.
    pub async fn post_files_complete(&self, post_id: i64) -> Result<bool, MediaError> {
        let links = self
            .ctx
            .entities()
            .list_post_media(post_id)
            .await
            .map_err(anyhow::Error::from)?;
        if links.is_empty() {
            return Ok(false);
        }

        let assets = self.ctx.assets();
        for link in &links {
            let Some(asset) = assets
                .get(link.media_asset_id)
                .await
                .map_err(MediaError::Storage)?
            else {
                return Ok(false);
            };
            if !assets.resolve_path(&asset).is_file() {
                debug!(post_id, path = %asset.file_path, "linked asset missing on disk");
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Directory a post's media lands in: `<root>/<platform>/<post id>`.
    async fn post_dir(&self, post: &Post) -> Result<PathBuf, MediaError> {
        let platform = self
            .ctx
            .entities()
            .get_platform(post.platform_id)
            .await
            .map_err(anyhow::Error::from)?
            .ok_or_else(|| {
                MediaError::Storage(anyhow::anyhow!("post {} has no platform row", post.id))
            })?;
        Ok(self
            .ctx
            .media_root()
            .join(platform.name)
            .join(&post.platform_post_id))
    }

    /// Remove a freshly downloaded file that deduplicated onto an existing
    /// asset stored elsewhere.
    async fn discard_duplicate(&self, downloaded: &std::path::Path, asset: &MediaAsset) {
        let canonical = self.ctx.assets().resolve_path(asset);
        if canonical != downloaded {
            debug!(
                downloaded = %downloaded.display(),
                kept = %asset.file_path,
                "removing duplicate download"
            );
            if let Err(e) = tokio::fs::remove_file(downloaded).await {
                warn!(path = %downloaded.display(), error = %e, "could not remove duplicate");
            }
        }
    }
}
