//! Service layer.

mod media;

pub use media::{MediaError, MediaService};
