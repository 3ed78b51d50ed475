//! Platform-neutral post description produced by adapters.

use chrono::{DateTime, Utc};

use super::{MediaType, PostType};

/// One downloadable media item within a post.
#[derive(Debug, Clone)]
pub struct MediaDescriptor {
    pub url: String,
    pub media_type: MediaType,
    /// Extension to fall back to when the response gives no better answer.
    pub extension_hint: Option<String>,
}

/// Everything the pipeline needs to know about a post, as extracted by a
/// platform adapter. Field meanings are platform-neutral; adapters map
/// their platform's payload into this shape.
#[derive(Debug, Clone)]
pub struct PostInfo {
    /// Stable platform machine name (e.g. "douyin").
    pub platform: String,
    pub platform_post_id: String,
    /// Canonical post URL.
    pub url: String,
    pub post_type: PostType,
    pub title: Option<String>,
    pub caption_text: Option<String>,
    pub platform_created_at: Option<DateTime<Utc>>,
    pub thumbnail_url: Option<String>,
    /// Author identity.
    pub account_id: String,
    pub username: Option<String>,
    pub author_display_name: Option<String>,
    pub profile_pic_url: Option<String>,
    /// Media items in display order.
    pub media: Vec<MediaDescriptor>,
}
