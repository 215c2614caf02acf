//! Thumbnail generation for captured photos.

use std::io::Cursor;

use image::{codecs::jpeg::JpegEncoder, GenericImageView};

use crate::error::{Error, Result};

/// Configuration for thumbnail generation.
///
/// Output is always JPEG; thumbnails exist to keep list views and collection
/// covers cheap, not to preserve fidelity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThumbnailOptions {
    /// Maximum output edge length in pixels.
    pub max_dimension: u32,
    /// JPEG quality.
    pub jpeg_quality: u8,
}

impl Default for ThumbnailOptions {
    fn default() -> Self {
        Self {
            max_dimension: 512,
            jpeg_quality: 80,
        }
    }
}

/// Generated thumbnail payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thumbnail {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Generate a JPEG thumbnail from source image bytes.
///
/// The image is resized to fit within `max_dimension` on both edges while
/// preserving aspect ratio. Images already within bounds are not upscaled.
pub fn generate_thumbnail(source_bytes: &[u8], options: ThumbnailOptions) -> Result<Thumbnail> {
    if source_bytes.is_empty() {
        return Err(Error::InvalidInput(
            "Thumbnail source bytes cannot be empty".to_string(),
        ));
    }
    if options.max_dimension == 0 {
        return Err(Error::InvalidInput(
            "Thumbnail max dimension must be greater than zero".to_string(),
        ));
    }

    let source = image::load_from_memory(source_bytes).map_err(|error| {
        Error::InvalidInput(format!("Failed to decode source image: {error}"))
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
        Error::InvalidInput(format!("Failed to encode JPEG thumbnail: {error}"))
    })?;

    Ok(Thumbnail {
        bytes: cursor.into_inner(),
        width,
        height,
    })
}
