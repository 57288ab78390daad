//! Thumbnail processor - generates thumbnails from original images
//!
//! Takes an image, shrinks it to fit a bounding box while maintaining aspect
//! ratio, and re-encodes it in the requested output format. When no encodable
//! format is requested the detected source format is used. Images already
//! inside the box keep their dimensions.
//!
//! Uses `spawn_blocking` for CPU-intensive operations to avoid blocking the async runtime.

use crate::error::{AppError, Result};
use bytes::Bytes;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat, ImageOutputFormat};
use std::io::Cursor;
use std::sync::Arc;
use tracing::debug;

/// Configuration for thumbnail generation
#[derive(Clone, Debug)]
pub struct ThumbnailConfig {
    /// Bounding box width in pixels
    pub max_width: u32,
    /// Bounding box height in pixels
    pub max_height: u32,
    /// JPEG quality (1-100), used when the source is a JPEG
    pub jpeg_quality: u8,
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            max_width: 300,
            max_height: 300,
            jpeg_quality: 80,
        }
    }
}

/// Result of thumbnail generation
#[derive(Debug)]
pub struct ThumbnailResult {
    /// Encoded thumbnail, same format as the source
    pub data: Bytes,
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
}

impl ThumbnailResult {
    pub fn mime_type(&self) -> &'static str {
        self.format.to_mime_type()
    }
}

/// Thumbnail processor
pub struct ThumbnailProcessor {
    config: ThumbnailConfig,
}

impl ThumbnailProcessor {
    /// Create a new processor with the given configuration
    pub fn new(config: ThumbnailConfig) -> Self {
        Self { config }
    }

    /// Create a processor with default configuration
    pub fn with_defaults() -> Self {
        Self::new(ThumbnailConfig::default())
    }

    /// Generate a thumbnail from the given image data (blocking version)
    ///
    /// **Note:** This method performs CPU-intensive operations and should not be called
    /// directly from async code. Use `generate_async` instead.
    pub fn generate(
        &self,
        original_data: &[u8],
        requested: Option<ImageFormat>,
    ) -> Result<ThumbnailResult> {
        let detected = image::guess_format(original_data)
            .map_err(|e| AppError::Processing(format!("Unrecognized image format: {e}")))?;

        let img = image::load_from_memory_with_format(original_data, detected)
            .map_err(|e| AppError::Processing(format!("Failed to decode image: {e}")))?;

        let format = match requested {
            Some(format) if can_encode(format) => format,
            _ => detected,
        };

        let (orig_w, orig_h) = img.dimensions();
        debug!(
            original_width = orig_w,
            original_height = orig_h,
            source_format = ?detected,
            output_format = ?format,
            "Processing image for thumbnail"
        );

        let (new_w, new_h) = self.calculate_dimensions(orig_w, orig_h);

        // Never upscale; re-encode so the output is always a fresh, valid file
        let output = if (new_w, new_h) == (orig_w, orig_h) {
            debug!("Image already within bounding box, encoding as-is");
            img
        } else {
            img.resize_exact(new_w, new_h, FilterType::Triangle)
        };

        let data = self.encode(output, format)?;

        debug!(
            width = new_w,
            height = new_h,
            size = data.len(),
            "Thumbnail generated"
        );

        Ok(ThumbnailResult {
            data,
            width: new_w,
            height: new_h,
            format,
        })
    }

    /// Generate a thumbnail asynchronously using a blocking thread pool
    ///
    /// This method offloads the CPU-intensive image processing to a dedicated
    /// thread pool, preventing the async runtime from being blocked.
    pub async fn generate_async(
        self: Arc<Self>,
        original_data: Bytes,
        requested: Option<ImageFormat>,
    ) -> Result<ThumbnailResult> {
        let processor = self.clone();

        tokio::task::spawn_blocking(move || processor.generate(&original_data, requested))
            .await
            .map_err(|e| AppError::Internal(format!("Thumbnail task panicked: {e}")))?
    }

    /// Fit (width, height) inside the bounding box, preserving aspect ratio.
    /// Dimensions already inside the box are returned unchanged.
    pub fn calculate_dimensions(&self, width: u32, height: u32) -> (u32, u32) {
        let max_w = self.config.max_width.max(1);
        let max_h = self.config.max_height.max(1);

        if width <= max_w && height <= max_h {
            return (width, height);
        }

        let scale = f64::min(max_w as f64 / width as f64, max_h as f64 / height as f64);
        let new_w = ((width as f64) * scale).round() as u32;
        let new_h = ((height as f64) * scale).round() as u32;

        (new_w.clamp(1, max_w), new_h.clamp(1, max_h))
    }

    fn encode(&self, img: DynamicImage, format: ImageFormat) -> Result<Bytes> {
        let (img, output_format) = match format {
            // JPEG has no alpha channel
            ImageFormat::Jpeg if img.color().has_alpha() => (
                DynamicImage::ImageRgb8(img.to_rgb8()),
                ImageOutputFormat::Jpeg(self.config.jpeg_quality),
            ),
            ImageFormat::Jpeg => (img, ImageOutputFormat::Jpeg(self.config.jpeg_quality)),
            other => (img, ImageOutputFormat::from(other)),
        };

        let mut buf = Vec::new();
        let mut cursor = Cursor::new(&mut buf);

        img.write_to(&mut cursor, output_format)
            .map_err(|e| AppError::Processing(format!("Failed to encode {format:?}: {e}")))?;

        Ok(Bytes::from(buf))
    }
}

/// Whether this build of `image` can write `format`
pub fn can_encode(format: ImageFormat) -> bool {
    !matches!(
        ImageOutputFormat::from(format),
        ImageOutputFormat::Unsupported(_)
    )
}
