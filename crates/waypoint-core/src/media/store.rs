//! Managed storage for attachment media.
//!
//! Turns raw media payloads into durably stored, retrievable units with a
//! lightweight preview. Small images embed inline in the attachment record;
//! videos and large images become files under the managed media directory.

use std::ffi::OsStr;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use uuid::Uuid;

use crate::models::MediaRef;
use crate::{Error, Result};

use super::thumbnail::{generate_thumbnail, ThumbnailOptions};

/// Configuration for the media store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaStoreOptions {
    /// Largest image payload (in bytes) stored inline instead of as a file.
    pub inline_image_max_bytes: usize,
    /// Thumbnail generation settings.
    pub thumbnail: ThumbnailOptions,
}

impl Default for MediaStoreOptions {
    fn default() -> Self {
        Self {
            inline_image_max_bytes: 256 * 1024,
            thumbnail: ThumbnailOptions::default(),
        }
    }
}

/// Result of persisting one media payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMedia {
    /// Handle the attachment record keeps for later retrieval.
    pub media: MediaRef,
    /// Derived JPEG preview; `None` when generation failed.
    pub thumbnail: Option<Vec<u8>>,
}

/// Readable handle to previously stored media.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaSource {
    /// Inline media returned as bytes.
    Bytes(Vec<u8>),
    /// File-backed media returned as an on-disk path.
    File(PathBuf),
}

/// Collaborator that decodes one frame near the start of a video file.
///
/// Video decoding is platform territory (AVFoundation, MediaCodec, ffmpeg);
/// the store only asks for encoded image bytes of a frame at roughly half a
/// second in and turns them into a thumbnail itself.
pub trait VideoFrameExtractor: Send + Sync {
    fn extract_frame(&self, path: &Path) -> io::Result<Vec<u8>>;
}

/// File-system backed store for attachment media.
#[derive(Clone)]
pub struct MediaStore {
    root: PathBuf,
    options: MediaStoreOptions,
    frame_extractor: Option<Arc<dyn VideoFrameExtractor>>,
}

impl std::fmt::Debug for MediaStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaStore")
            .field("root", &self.root)
            .field("options", &self.options)
            .field("frame_extractor", &self.frame_extractor.is_some())
            .finish()
    }
}

impl MediaStore {
    /// Create a store rooted at the given directory, creating it if needed.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        Self::with_options(root, MediaStoreOptions::default())
    }

    /// Create a store with explicit options.
    pub fn with_options(root: impl Into<PathBuf>, options: MediaStoreOptions) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            options,
            frame_extractor: None,
        })
    }

    /// Attach a video frame extractor collaborator.
    #[must_use]
    pub fn with_frame_extractor(mut self, extractor: Arc<dyn VideoFrameExtractor>) -> Self {
        self.frame_extractor = Some(extractor);
        self
    }

    /// Directory holding managed media files.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Persist image bytes and derive a preview.
    ///
    /// Payloads at or under the inline threshold embed in the record;
    /// anything larger is written to a managed file. Undecodable bytes still
    /// store (the declared kind is trusted), they just get no thumbnail.
    pub async fn store_image(&self, bytes: &[u8]) -> Result<StoredMedia> {
        if bytes.is_empty() {
            return Err(Error::MediaWrite("Image payload is empty".to_string()));
        }

        let thumbnail = self.try_thumbnail(bytes);

        let media = if bytes.len() <= self.options.inline_image_max_bytes {
            MediaRef::Inline(bytes.to_vec())
        } else {
            let file_name = format!("{}.jpg", Uuid::now_v7());
            let path = self.root.join(&file_name);
            tokio::fs::write(&path, bytes).await.map_err(|error| {
                Error::MediaWrite(format!(
                    "Failed to write image {}: {error}",
                    path.display()
                ))
            })?;
            MediaRef::File(file_name)
        };

        Ok(StoredMedia { media, thumbnail })
    }

    /// Copy a source video into the managed area under a fresh unique name
    /// and derive a preview from an early frame.
    pub async fn store_video(&self, source: &Path) -> Result<StoredMedia> {
        let extension = source
            .extension()
            .and_then(OsStr::to_str)
            .unwrap_or("mp4");
        let file_name = format!("{}.{extension}", Uuid::now_v7());
        let dest = self.root.join(&file_name);

        tokio::fs::copy(source, &dest).await.map_err(|error| {
            Error::MediaWrite(format!(
                "Failed to copy video {}: {error}",
                source.display()
            ))
        })?;

        let thumbnail = match &self.frame_extractor {
            Some(extractor) => match extractor.extract_frame(&dest) {
                Ok(frame) => self.try_thumbnail(&frame),
                Err(error) => {
                    tracing::warn!(%error, video = %file_name, "video frame extraction failed, storing without preview");
                    None
                }
            },
            None => {
                tracing::debug!(video = %file_name, "no video frame extractor configured, storing without preview");
                None
            }
        };

        Ok(StoredMedia {
            media: MediaRef::File(file_name),
            thumbnail,
        })
    }

    /// Return a readable handle to stored media.
    ///
    /// Fails with [`Error::MediaNotFound`] when a file reference has gone
    /// stale (the backing file was removed externally).
    pub async fn resolve(&self, media: &MediaRef) -> Result<MediaSource> {
        match media {
            MediaRef::Inline(bytes) => Ok(MediaSource::Bytes(bytes.clone())),
            MediaRef::File(file_name) => {
                let path = self.root.join(file_name);
                match tokio::fs::metadata(&path).await {
                    Ok(metadata) if metadata.is_file() => Ok(MediaSource::File(path)),
                    Ok(_) => Err(Error::MediaNotFound(file_name.clone())),
                    Err(error) if error.kind() == io::ErrorKind::NotFound => {
                        Err(Error::MediaNotFound(file_name.clone()))
                    }
                    Err(error) => Err(error.into()),
                }
            }
        }
    }

    /// Remove backing storage for the given reference.
    ///
    /// Idempotent: deleting an already-absent file is not an error. Kept
    /// synchronous so rollback guards can run it from `Drop`.
    pub fn delete(&self, media: &MediaRef) -> Result<()> {
        let MediaRef::File(file_name) = media else {
            return Ok(());
        };
        let path = self.root.join(file_name);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(error) => Err(error.into()),
        }
    }

    fn try_thumbnail(&self, bytes: &[u8]) -> Option<Vec<u8>> {
        match generate_thumbnail(bytes, self.options.thumbnail) {
            Ok(thumbnail) => Some(thumbnail.bytes),
            Err(error) => {
                tracing::warn!(%error, "thumbnail generation failed, storing without preview");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, ImageFormat, Rgba};
    use std::io::Cursor;
    use tempfile::tempdir;

    fn source_png(width: u32, height: u32) -> Vec<u8> {
        let image = ImageBuffer::<Rgba<u8>, Vec<u8>>::from_fn(width, height, |_x, _y| {
            Rgba([10, 200, 30, 255])
        });

        let mut cursor = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgba8(image)
            .write_to(&mut cursor, ImageFormat::Png)
            .unwrap();
        cursor.into_inner()
    }

    fn store(dir: &tempfile::TempDir) -> MediaStore {
        MediaStore::new(dir.path().join("media")).unwrap()
    }

    struct PngFrameExtractor;

    impl VideoFrameExtractor for PngFrameExtractor {
        fn extract_frame(&self, _path: &Path) -> io::Result<Vec<u8>> {
            Ok(source_png(640, 360))
        }
    }

    struct FailingFrameExtractor;

    impl VideoFrameExtractor for FailingFrameExtractor {
        fn extract_frame(&self, _path: &Path) -> io::Result<Vec<u8>> {
            Err(io::Error::new(io::ErrorKind::InvalidData, "no decodable track"))
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn store_image_small_payload_embeds_inline() {
        let dir = tempdir().unwrap();
        let stored = store(&dir).store_image(&source_png(64, 64)).await.unwrap();

        assert!(matches!(stored.media, MediaRef::Inline(_)));
        assert!(stored.thumbnail.is_some());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn store_image_large_payload_becomes_file() {
        let dir = tempdir().unwrap();
        let media_store = MediaStore::with_options(
            dir.path().join("media"),
            MediaStoreOptions {
                inline_image_max_bytes: 16,
                thumbnail: ThumbnailOptions::default(),
            },
        )
        .unwrap();

        let bytes = source_png(64, 64);
        let stored = media_store.store_image(&bytes).await.unwrap();

        let MediaRef::File(file_name) = &stored.media else {
            panic!("expected file-backed media");
        };
        let on_disk = std::fs::read(media_store.root().join(file_name)).unwrap();
        assert_eq!(on_disk, bytes);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn store_image_threshold_is_inclusive() {
        let dir = tempdir().unwrap();
        let bytes = source_png(64, 64);
        let media_store = MediaStore::with_options(
            dir.path().join("media"),
            MediaStoreOptions {
                inline_image_max_bytes: bytes.len(),
                thumbnail: ThumbnailOptions::default(),
            },
        )
        .unwrap();

        let stored = media_store.store_image(&bytes).await.unwrap();
        assert!(matches!(stored.media, MediaRef::Inline(_)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn store_image_undecodable_bytes_stores_without_thumbnail() {
        let dir = tempdir().unwrap();
        let stored = store(&dir).store_image(b"definitely not an image").await.unwrap();

        assert!(matches!(stored.media, MediaRef::Inline(_)));
        assert!(stored.thumbnail.is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn store_image_rejects_empty_payload() {
        let dir = tempdir().unwrap();
        let err = store(&dir).store_image(&[]).await.unwrap_err();
        assert!(matches!(err, Error::MediaWrite(_)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn store_video_copies_source_and_keeps_extension() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("clip.mov");
        std::fs::write(&source, b"fake video payload").unwrap();

        let media_store = store(&dir);
        let stored = media_store.store_video(&source).await.unwrap();

        let MediaRef::File(file_name) = &stored.media else {
            panic!("expected file-backed media");
        };
        assert!(file_name.ends_with(".mov"));
        assert!(stored.thumbnail.is_none());
        assert!(media_store.root().join(file_name).is_file());
        // Source is untouched.
        assert!(source.is_file());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn store_video_missing_source_fails_with_media_write() {
        let dir = tempdir().unwrap();
        let err = store(&dir)
            .store_video(Path::new("/nonexistent/clip.mp4"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MediaWrite(_)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn store_video_with_extractor_derives_bounded_thumbnail() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("clip.mp4");
        std::fs::write(&source, b"fake video payload").unwrap();

        let media_store = store(&dir).with_frame_extractor(Arc::new(PngFrameExtractor));
        let stored = media_store.store_video(&source).await.unwrap();

        let thumbnail = stored.thumbnail.expect("frame extractor should yield a preview");
        let decoded = image::load_from_memory(&thumbnail).unwrap();
        assert!(decoded.width() <= 200 && decoded.height() <= 200);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn store_video_extractor_failure_is_non_fatal() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("clip.mp4");
        std::fs::write(&source, b"fake video payload").unwrap();

        let media_store = store(&dir).with_frame_extractor(Arc::new(FailingFrameExtractor));
        let stored = media_store.store_video(&source).await.unwrap();
        assert!(stored.thumbnail.is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn resolve_inline_returns_bytes() {
        let dir = tempdir().unwrap();
        let media_store = store(&dir);
        let media = MediaRef::Inline(vec![1, 2, 3]);

        let MediaSource::Bytes(bytes) = media_store.resolve(&media).await.unwrap() else {
            panic!("expected inline bytes");
        };
        assert_eq!(bytes, vec![1, 2, 3]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn resolve_stale_file_ref_fails_with_media_not_found() {
        let dir = tempdir().unwrap();
        let media_store = store(&dir);
        let media = MediaRef::File("gone.jpg".to_string());

        let err = media_store.resolve(&media).await.unwrap_err();
        assert!(matches!(err, Error::MediaNotFound(_)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn delete_is_idempotent() {
        let dir = tempdir().unwrap();
        let media_store = store(&dir);

        let path = media_store.root().join("clip.mp4");
        std::fs::write(&path, b"payload").unwrap();
        let media = MediaRef::File("clip.mp4".to_string());

        media_store.delete(&media).unwrap();
        assert!(!path.exists());
        // Second delete of the same ref is still Ok.
        media_store.delete(&media).unwrap();
        // Inline refs have no backing storage to remove.
        media_store.delete(&MediaRef::Inline(vec![1])).unwrap();
    }
}
