//! Platform adapter contract.
//!
//! Adapters own everything platform-specific: recognizing URLs, resolving
//! a share to the canonical post, extracting a [`PostInfo`], and fetching
//! media through the [`MediaService`]. The pipeline only ever talks to the
//! trait. Production adapters ship separately; the registry here is a
//! fixed, ordered list where the first `supports` match wins.

use std::sync::Arc;
use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use thiserror::Error;

use crate::download::DownloadError;
use crate::models::{Post, PostInfo, PostMedia};
use crate::services::{MediaError, MediaService};

#[derive(Debug, Error)]
pub enum AdapterError {
    /// The request can never succeed (bad reference, platform refusal).
    #[error("{0}")]
    Permanent(String),
    #[error(transparent)]
    Download(#[from] DownloadError),
    #[error(transparent)]
    Media(#[from] MediaError),
    /// Anything else; assumed worth retrying.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AdapterError {
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Permanent(_) => false,
            Self::Download(e) => e.is_transient(),
            Self::Media(e) => e.is_transient(),
            Self::Other(_) => true,
        }
    }
}

/// A share resolved to its canonical post plus whatever platform payload
/// the adapter needs to keep around between `extract_info` and `download`.
#[derive(Debug, Clone)]
pub struct ResolvedShare {
    /// The share URL as submitted.
    pub share_url: String,
    /// Canonical URL after redirects.
    pub resolved_url: String,
    /// Opaque platform payload (adapter-defined shape).
    pub payload: serde_json::Value,
}

#[async_trait]
pub trait PlatformAdapter: Send + Sync {
    /// Stable machine name ("douyin").
    fn platform_name(&self) -> &'static str;

    /// Human-readable platform name ("Douyin").
    fn display_name(&self) -> &'static str;

    /// Whether this adapter handles the given URL.
    fn supports(&self, url: &str) -> bool;

    /// Resolve a share URL to the canonical post.
    async fn load(&self, share_url: &str) -> Result<ResolvedShare, AdapterError>;

    /// Extract post metadata from a resolved share. `None` means the post
    /// does not exist (deleted or private); that is final, not retryable.
    fn extract_info(&self, share: &ResolvedShare) -> Result<Option<PostInfo>, AdapterError>;

    /// Fetch the post's media and link it through the media service.
    ///
    /// The default walks `extract_info`'s media list in order; adapters
    /// with platform-specific fetch quirks override it.
    async fn download(
        &self,
        share: &ResolvedShare,
        post: &Post,
        media: &MediaService,
    ) -> Result<Vec<PostMedia>, AdapterError> {
        let info = self
            .extract_info(share)?
            .ok_or_else(|| AdapterError::Permanent("post vanished while downloading".into()))?;

        let mut links = Vec::with_capacity(info.media.len());
        for (position, item) in info.media.iter().enumerate() {
            let link = media.fetch_post_media(post, item, position as i32).await?;
            links.push(link);
        }
        Ok(links)
    }
}

/// Ordered adapter list; dispatch is a linear scan, first match wins.
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: Vec<Arc<dyn PlatformAdapter>>,
}

impl AdapterRegistry {
    pub fn new(adapters: Vec<Arc<dyn PlatformAdapter>>) -> Self {
        Self { adapters }
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    /// The adapter handling this URL, if any.
    pub fn adapter_for(&self, url: &str) -> Option<Arc<dyn PlatformAdapter>> {
        self.adapters.iter().find(|a| a.supports(url)).cloned()
    }

    /// Pull the first supported URL out of free-form share text.
    ///
    /// Share sheets wrap the link in promotional text, so every URL in the
    /// text is tried against every adapter in order.
    pub fn extract_share(&self, share_text: &str) -> Option<(Arc<dyn PlatformAdapter>, String)> {
        for url in extract_urls(share_text) {
            if let Some(adapter) = self.adapter_for(&url) {
                return Some((adapter, url));
            }
        }
        None
    }
}

/// All http(s) URLs in a piece of text, in order.
pub fn extract_urls(text: &str) -> Vec<String> {
    static URL_RE: OnceLock<Regex> = OnceLock::new();
    let re = URL_RE.get_or_init(|| {
        Regex::new(r"https?://[-A-Za-z0-9+&@#/%?=~_|!:,.;]*[-A-Za-z0-9+&@#/%=~_|]").unwrap()
    });
    re.find_iter(text).map(|m| m.as_str().to_string()).collect()
}
