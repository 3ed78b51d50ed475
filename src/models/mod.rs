//! Domain models.

mod entity;
mod job;
mod post_info;

pub use entity::{Creator, MediaAsset, MediaType, Platform, Post, PostMedia, PostType};
pub use job::{ErrorRecord, Job, JobStatus};
pub use post_info::{MediaDescriptor, PostInfo};
