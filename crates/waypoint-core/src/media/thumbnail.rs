//! Thumbnail generation for image and video-frame previews.

use std::io::Cursor;

use image::{codecs::jpeg::JpegEncoder, GenericImageView};

use crate::{Error, Result};

/// Configuration for thumbnail generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThumbnailOptions {
    /// Maximum output size of the longest side, in pixels.
    pub max_dimension: u32,
    /// JPEG encoding quality.
    pub jpeg_quality: u8,
}

impl Default for ThumbnailOptions {
    fn default() -> Self {
        Self {
            max_dimension: 200,
            jpeg_quality: 70,
        }
    }
}

/// Generated thumbnail payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThumbnailImage {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Generate a JPEG thumbnail from source image bytes.
///
/// The image is resized so its longest side fits within `max_dimension`
/// while preserving aspect ratio. Images already inside the bound are not
/// upscaled, only re-encoded.
pub fn generate_thumbnail(source_bytes: &[u8], options: ThumbnailOptions) -> Result<ThumbnailImage> {
    if source_bytes.is_empty() {
        return Err(Error::Validation(
            "Thumbnail source bytes cannot be empty".to_string(),
        ));
    }
    if options.max_dimension == 0 {
        return Err(Error::Validation(
            "Thumbnail max dimension must be greater than zero".to_string(),
        ));
    }

    let source = image::load_from_memory(source_bytes).map_err(|error| {
        Error::Validation(format!(
            "Failed to decode source image for thumbnail generation: {error}"
        ))
    })?;

    let (source_width, source_height) = source.dimensions();
    let resized = if source_width <= options.max_dimension && source_height <= options.max_dimension
    {
        source
    } else {
        source.thumbnail(options.max_dimension, options.max_dimension)
    };
    let (width, height) = resized.dimensions();

    let mut cursor = Cursor::new(Vec::new());
    let mut encoder = JpegEncoder::new_with_quality(&mut cursor, options.jpeg_quality);
    encoder.encode_image(&resized).map_err(|error| {
        Error::Validation(format!("Failed to encode JPEG thumbnail: {error}"))
    })?;

    Ok(ThumbnailImage {
        bytes: cursor.into_inner(),
        width,
        height,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, ImageFormat, Rgba};

    fn source_png(width: u32, height: u32) -> Vec<u8> {
        let image = ImageBuffer::<Rgba<u8>, Vec<u8>>::from_fn(width, height, |_x, _y| {
            Rgba([120, 90, 240, 255])
        });

        let mut cursor = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgba8(image)
            .write_to(&mut cursor, ImageFormat::Png)
            .unwrap();
        cursor.into_inner()
    }

    #[test]
    fn generate_thumbnail_bounds_dimensions_and_preserves_ratio() {
        let source = source_png(800, 600);
        let result = generate_thumbnail(&source, ThumbnailOptions::default()).unwrap();

        assert_eq!(result.width, 200);
        assert_eq!(result.height, 150);
        assert!(!result.bytes.is_empty());
    }

    #[test]
    fn generate_thumbnail_does_not_upscale_small_images() {
        let source = source_png(80, 40);
        let result = generate_thumbnail(&source, ThumbnailOptions::default()).unwrap();

        assert_eq!(result.width, 80);
        assert_eq!(result.height, 40);
    }

    #[test]
    fn generate_thumbnail_output_decodes_as_jpeg() {
        let source = source_png(400, 400);
        let result = generate_thumbnail(&source, ThumbnailOptions::default()).unwrap();

        let decoded = image::load_from_memory(&result.bytes).unwrap();
        assert_eq!(decoded.dimensions(), (200, 200));
    }

    #[test]
    fn generate_thumbnail_rejects_invalid_source() {
        let err = generate_thumbnail(b"not-an-image", ThumbnailOptions::default()).unwrap_err();
        match err {
            Error::Validation(message) => {
                assert!(message.contains("decode"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
