//! Platform, creator, post and media-asset models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A social-media platform a post can come from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Platform {
    pub id: i64,
    /// Stable machine name, unique (e.g. "douyin").
    pub name: String,
    pub display_name: String,
    pub created_at: DateTime<Utc>,
}

/// The author of a post, unique per (platform, platform_account_id).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Creator {
    pub id: i64,
    pub platform_id: i64,
    /// The platform's own identifier for this account.
    pub platform_account_id: String,
    /// Handle, when the platform exposes one.
    pub username: Option<String>,
    pub display_name: Option<String>,
    pub profile_pic_asset_id: Option<i64>,
    pub profile_pic_url: Option<String>,
    pub profile_pic_updated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Shape of a post's media.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostType {
    Video,
    Carousel,
    Unknown,
}

impl PostType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Carousel => "carousel",
            Self::Unknown => "unknown",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "video" => Self::Video,
            "carousel" => Self::Carousel,
            _ => Self::Unknown,
        }
    }
}

/// A canonical post, unique per (platform, platform_post_id).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: i64,
    pub platform_id: i64,
    pub creator_id: i64,
    /// The platform's own identifier for this post.
    pub platform_post_id: String,
    pub post_type: PostType,
    /// Canonical post URL.
    pub url: String,
    /// The share URL this post was first resolved from.
    pub share_url: String,
    pub title: Option<String>,
    pub caption_text: Option<String>,
    /// When the platform says the post was published.
    pub platform_created_at: Option<DateTime<Utc>>,
    pub thumbnail_asset_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Kind of a stored media file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    Image,
    Video,
    LivePhoto,
    LiveVideo,
    ProfilePic,
    Thumbnail,
    Unknown,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
            Self::LivePhoto => "live_photo",
            Self::LiveVideo => "live_video",
            Self::ProfilePic => "profile_pic",
            Self::Thumbnail => "thumbnail",
            Self::Unknown => "unknown",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "image" => Self::Image,
            "video" => Self::Video,
            "live_photo" => Self::LivePhoto,
            "live_video" => Self::LiveVideo,
            "profile_pic" => Self::ProfilePic,
            "thumbnail" => Self::Thumbnail,
            _ => Self::Unknown,
        }
    }
}

/// A stored media file, identified by (checksum, size).
///
/// `file_path` is relative to the configured media root so the whole store
/// can be relocated without rewriting rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaAsset {
    pub id: i64,
    pub media_type: MediaType,
    /// Lowercase extension without the dot (e.g. "mp4").
    pub file_format: Option<String>,
    /// URL the bytes were fetched from, when known.
    pub source_url: Option<String>,
    pub file_size: i64,
    pub file_path: String,
    pub checksum_sha256: String,
    pub created_at: DateTime<Utc>,
}

/// Ordered link between a post and one of its media assets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostMedia {
    pub id: i64,
    pub post_id: i64,
    pub media_asset_id: i64,
    /// Zero-based position within the post (carousel order).
    pub position: i32,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_type_round_trip() {
        for t in [
            MediaType::Image,
            MediaType::Video,
            MediaType::LivePhoto,
            MediaType::LiveVideo,
            MediaType::ProfilePic,
            MediaType::Thumbnail,
        ] {
            assert_eq!(MediaType::from_str(t.as_str()), t);
        }
        assert_eq!(MediaType::from_str("something-else"), MediaType::Unknown);
    }

    #[test]
    fn post_type_defaults_to_unknown() {
        assert_eq!(PostType::from_str("video"), PostType::Video);
        assert_eq!(PostType::from_str("carousel"), PostType::Carousel);
        assert_eq!(PostType::from_str(""), PostType::Unknown);
    }
}
