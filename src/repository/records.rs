//! Diesel row structs.
//!
//! `*Record` types map table rows one-to-one; `New*` types are the
//! insertable subsets. Conversion into domain models lives with the
//! repository that owns each table.

use diesel::prelude::*;

use crate::schema::{creators, jobs, media_assets, platforms, post_media, posts};

#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = platforms)]
pub struct PlatformRecord {
    pub id: i64,
    pub name: String,
    pub display_name: String,
    pub created_at: String,
}

#[derive(Insertable)]
#[diesel(table_name = platforms)]
pub struct NewPlatform<'a> {
    pub name: &'a str,
    pub display_name: &'a str,
    pub created_at: String,
}

#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = creators)]
pub struct CreatorRecord {
    pub id: i64,
    pub platform_id: i64,
    pub platform_account_id: String,
    pub username: Option<String>,
    pub display_name: Option<String>,
    pub profile_pic_asset_id: Option<i64>,
    pub profile_pic_url: Option<String>,
    pub profile_pic_updated_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Insertable)]
#[diesel(table_name = creators)]
pub struct NewCreator<'a> {
    pub platform_id: i64,
    pub platform_account_id: &'a str,
    pub username: Option<&'a str>,
    pub display_name: Option<&'a str>,
    pub profile_pic_url: Option<&'a str>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = posts)]
pub struct PostRecord {
    pub id: i64,
    pub platform_id: i64,
    pub creator_id: i64,
    pub platform_post_id: String,
    pub post_type: String,
    pub url: String,
    pub share_url: String,
    pub title: Option<String>,
    pub caption_text: Option<String>,
    pub platform_created_at: Option<String>,
    pub thumbnail_asset_id: Option<i64>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Insertable)]
#[diesel(table_name = posts)]
pub struct NewPost<'a> {
    pub platform_id: i64,
    pub creator_id: i64,
    pub platform_post_id: &'a str,
    pub post_type: &'a str,
    pub url: &'a str,
    pub share_url: &'a str,
    pub title: Option<&'a str>,
    pub caption_text: Option<&'a str>,
    pub platform_created_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = media_assets)]
pub struct MediaAssetRecord {
    pub id: i64,
    pub media_type: String,
    pub file_format: Option<String>,
    pub source_url: Option<String>,
    pub file_size: i64,
    pub file_path: String,
    pub checksum_sha256: String,
    pub created_at: String,
}

#[derive(Insertable)]
#[diesel(table_name = media_assets)]
pub struct NewMediaAsset<'a> {
    pub media_type: &'a str,
    pub file_format: Option<&'a str>,
    pub source_url: Option<&'a str>,
    pub file_size: i64,
    pub file_path: &'a str,
    pub checksum_sha256: &'a str,
    pub created_at: String,
}

#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = post_media)]
pub struct PostMediaRecord {
    pub id: i64,
    pub post_id: i64,
    pub media_asset_id: i64,
    pub position: i32,
    pub created_at: String,
}

#[derive(Insertable)]
#[diesel(table_name = post_media)]
pub struct NewPostMedia {
    pub post_id: i64,
    pub media_asset_id: i64,
    pub position: i32,
    pub created_at: String,
}

#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = jobs)]
pub struct JobRecord {
    pub id: String,
    pub share_text: String,
    pub share_url: String,
    pub status: String,
    pub post_id: Option<i64>,
    pub error_history: String,
    pub next_retry_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Insertable)]
#[diesel(table_name = jobs)]
pub struct NewJob<'a> {
    pub id: &'a str,
    pub share_text: &'a str,
    pub share_url: &'a str,
    pub status: &'a str,
    pub error_history: &'a str,
    pub created_at: String,
    pub updated_at: String,
}
