//! Media storage and preview generation for attachments.

mod store;
mod thumbnail;

pub use store::{MediaSource, MediaStore, MediaStoreOptions, StoredMedia, VideoFrameExtractor};
pub use thumbnail::{generate_thumbnail, ThumbnailImage, ThumbnailOptions};
