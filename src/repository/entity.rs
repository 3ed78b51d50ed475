//! Race-safe upsert layer for platforms, creators, posts and media links.
//!
//! Every get-or-create follows the same shape: query, insert on miss, and
//! when the insert loses a race (unique violation from a concurrent
//! worker) requery the winner. Callers always receive the surviving row.

use chrono::Utc;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use tracing::debug;

use super::pool::{DieselError, SqlitePool};
use super::records::{
    CreatorRecord, NewCreator, NewPost, NewPostMedia, NewPlatform, PlatformRecord,
    PostMediaRecord, PostRecord,
};
use super::util::is_unique_violation;
use super::{format_datetime, parse_datetime, parse_datetime_opt};
use crate::models::{Creator, Platform, Post, PostMedia, PostType};
use crate::schema::{creators, platforms, post_media, posts};

pub struct EntityRepository {
    pool: SqlitePool,
}

impl EntityRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get_or_create_platform(
        &self,
        name: &str,
        display_name: &str,
    ) -> Result<Platform, DieselError> {
        let mut conn = self.pool.get().await?;

        let existing: Option<PlatformRecord> = platforms::table
            .filter(platforms::name.eq(name))
            .first(&mut conn)
            .await
            .optional()?;
        if let Some(record) = existing {
            return Ok(platform_from_record(record));
        }

        let insert = diesel::insert_into(platforms::table)
            .values(NewPlatform {
                name,
                display_name,
                created_at: format_datetime(Utc::now()),
            })
            .execute(&mut conn)
            .await;

        match insert {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => {
                debug!(name, "platform insert lost race, requerying");
            }
            Err(e) => return Err(e),
        }

        let record: PlatformRecord = platforms::table
            .filter(platforms::name.eq(name))
            .first(&mut conn)
            .await?;
        Ok(platform_from_record(record))
    }

    /// Get or create a creator keyed by (platform, account id).
    ///
    /// Identity fields on an existing row are left untouched; only a newly
    /// observed profile-pic URL is refreshed.
    pub async fn get_or_create_creator(
        &self,
        platform_id: i64,
        platform_account_id: &str,
        username: Option<&str>,
        display_name: Option<&str>,
        profile_pic_url: Option<&str>,
    ) -> Result<Creator, DieselError> {
        let mut conn = self.pool.get().await?;

        let existing: Option<CreatorRecord> = creators::table
            .filter(creators::platform_id.eq(platform_id))
            .filter(creators::platform_account_id.eq(platform_account_id))
            .first(&mut conn)
            .await
            .optional()?;
        if let Some(record) = existing {
            return Ok(creator_from_record(record));
        }

        let now = format_datetime(Utc::now());
        let insert = diesel::insert_into(creators::table)
            .values(NewCreator {
                platform_id,
                platform_account_id,
                username,
                display_name,
                profile_pic_url,
                created_at: now.clone(),
                updated_at: now,
            })
            .execute(&mut conn)
            .await;

        match insert {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => {
                debug!(platform_account_id, "creator insert lost race, requerying");
            }
            Err(e) => return Err(e),
        }

        let record: CreatorRecord = creators::table
            .filter(creators::platform_id.eq(platform_id))
            .filter(creators::platform_account_id.eq(platform_account_id))
            .first(&mut conn)
            .await?;
        Ok(creator_from_record(record))
    }

    /// Get or create a post keyed by (platform, platform post id).
    #[allow(clippy::too_many_arguments)]
    pub async fn get_or_create_post(
        &self,
        platform_id: i64,
        creator_id: i64,
        platform_post_id: &str,
        post_type: PostType,
        url: &str,
        share_url: &str,
        title: Option<&str>,
        caption_text: Option<&str>,
        platform_created_at: Option<chrono::DateTime<Utc>>,
    ) -> Result<Post, DieselError> {
        let mut conn = self.pool.get().await?;

        let existing: Option<PostRecord> = posts::table
            .filter(posts::platform_id.eq(platform_id))
            .filter(posts::platform_post_id.eq(platform_post_id))
            .first(&mut conn)
            .await
            .optional()?;
        if let Some(record) = existing {
            return Ok(post_from_record(record));
        }

        let now = format_datetime(Utc::now());
        let insert = diesel::insert_into(posts::table)
            .values(NewPost {
                platform_id,
                creator_id,
                platform_post_id,
                post_type: post_type.as_str(),
                url,
                share_url,
                title,
                caption_text,
                platform_created_at: platform_created_at.map(format_datetime),
                created_at: now.clone(),
                updated_at: now,
            })
            .execute(&mut conn)
            .await;

        match insert {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => {
                debug!(platform_post_id, "post insert lost race, requerying");
            }
            Err(e) => return Err(e),
        }

        let record: PostRecord = posts::table
            .filter(posts::platform_id.eq(platform_id))
            .filter(posts::platform_post_id.eq(platform_post_id))
            .first(&mut conn)
            .await?;
        Ok(post_from_record(record))
    }

    /// Link an asset to a post at a display position. Relinking the same
    /// asset is a no-op returning the existing link.
    pub async fn link_post_media(
        &self,
        post_id: i64,
        media_asset_id: i64,
        position: i32,
    ) -> Result<PostMedia, DieselError> {
        let mut conn = self.pool.get().await?;

        let insert = diesel::insert_into(post_media::table)
            .values(NewPostMedia {
                post_id,
                media_asset_id,
                position,
                created_at: format_datetime(Utc::now()),
            })
            .execute(&mut conn)
            .await;

        match insert {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => {
                debug!(post_id, media_asset_id, "post-media link already exists");
            }
            Err(e) => return Err(e),
        }

        let record: PostMediaRecord = post_media::table
            .filter(post_media::post_id.eq(post_id))
            .filter(post_media::media_asset_id.eq(media_asset_id))
            .first(&mut conn)
            .await?;
        Ok(post_media_from_record(record))
    }

    pub async fn get_platform(&self, platform_id: i64) -> Result<Option<Platform>, DieselError> {
        let mut conn = self.pool.get().await?;
        let record: Option<PlatformRecord> = platforms::table
            .find(platform_id)
            .first(&mut conn)
            .await
            .optional()?;
        Ok(record.map(platform_from_record))
    }

    pub async fn get_post(&self, post_id: i64) -> Result<Option<Post>, DieselError> {
        let mut conn = self.pool.get().await?;
        let record: Option<PostRecord> = posts::table
            .find(post_id)
            .first(&mut conn)
            .await
            .optional()?;
        Ok(record.map(post_from_record))
    }

    /// A post's media links in display order.
    pub async fn list_post_media(&self, post_id: i64) -> Result<Vec<PostMedia>, DieselError> {
        let mut conn = self.pool.get().await?;
        let records: Vec<PostMediaRecord> = post_media::table
            .filter(post_media::post_id.eq(post_id))
            .order(post_media::position.asc())
            .load(&mut conn)
            .await?;
        Ok(records.into_iter().map(post_media_from_record).collect())
    }

    /// Attach a cached profile picture to a creator.
    pub async fn set_creator_profile_pic(
        &self,
        creator_id: i64,
        asset_id: i64,
        source_url: &str,
    ) -> Result<(), DieselError> {
        let mut conn = self.pool.get().await?;
        let now = format_datetime(Utc::now());
        diesel::update(creators::table.find(creator_id))
            .set((
                creators::profile_pic_asset_id.eq(Some(asset_id)),
                creators::profile_pic_url.eq(Some(source_url)),
                creators::profile_pic_updated_at.eq(Some(now.clone())),
                creators::updated_at.eq(now),
            ))
            .execute(&mut conn)
            .await?;
        Ok(())
    }

    /// Attach a cached thumbnail to a post.
    pub async fn set_post_thumbnail(
        &self,
        post_id: i64,
        asset_id: i64,
    ) -> Result<(), DieselError> {
        let mut conn = self.pool.get().await?;
        diesel::update(posts::table.find(post_id))
            .set((
                posts::thumbnail_asset_id.eq(Some(asset_id)),
                posts::updated_at.eq(format_datetime(Utc::now())),
            ))
            .execute(&mut conn)
            .await?;
        Ok(())
    }
}

fn platform_from_record(record: PlatformRecord) -> Platform {
    Platform {
        id: record.id,
        name: record.name,
        display_name: record.display_name,
        created_at: parse_datetime(&record.created_at),
    }
}

fn creator_from_record(record: CreatorRecord) -> Creator {
    Creator {
        id: record.id,
        platform_id: record.platform_id,
        platform_account_id: record.platform_account_id,
        username: record.username,
        display_name: record.display_name,
        profile_pic_asset_id: record.profile_pic_asset_id,
        profile_pic_url: record.profile_pic_url,
        profile_pic_updated_at: parse_datetime_opt(&record.profile_pic_updated_at),
        created_at: parse_datetime(&record.created_at),
        updated_at: parse_datetime(&record.updated_at),
    }
}

fn post_from_record(record: PostRecord) -> Post {
    Post {
        id: record.id,
        platform_id: record.platform_id,
        creator_id: record.creator_id,
        platform_post_id: record.platform_post_id,
        post_type: PostType::from_str(&record.post_type),
        url: record.url,
        share_url: record.share_url,
        title: record.title,
        caption_text: record.caption_text,
        platform_created_at: parse_datetime_opt(&record.platform_created_at),
        thumbnail_asset_id: record.thumbnail_asset_id,
        created_at: parse_datetime(&record.created_at),
        updated_at: parse_datetime(&record.updated_at),
    }
}

fn post_media_from_record(record: PostMediaRecord) -> PostMedia {
    PostMedia {
        id: record.id,
        post_id: record.post_id,
        media_asset_id: record.media_asset_id,
        position: record.position,
        created_at: parse_datetime(&record.created_at),
    }
}
