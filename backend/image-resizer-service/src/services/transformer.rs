//! Transformer - resizes a decoded image and re-encodes it
//!
//! Output dimensions are exactly those requested; aspect ratio is not kept.
//!
//! Encoding policy by source format:
//! - jpeg/jpg: JPEG at the configured quality
//! - png: PNG
//! - webp: PNG (no WebP encoder available)
//! - anything else: JPEG at the configured quality
//!
//! Uses `spawn_blocking` for the CPU-bound work to avoid blocking the async runtime.

use crate::error::{ResizeError, Result};
use crate::models::ResizedImage;
use bytes::Bytes;
use image::imageops::FilterType;
use image::{DynamicImage, ImageOutputFormat};
use std::io::Cursor;
use std::sync::Arc;
use tracing::debug;

pub const MIME_JPEG: &str = "image/jpeg";
pub const MIME_PNG: &str = "image/png";

#[derive(Clone, Debug)]
pub struct TransformerConfig {
    /// JPEG quality (0-100)
    pub jpeg_quality: u8,
    pub filter: FilterType,
}

impl Default for TransformerConfig {
    fn default() -> Self {
        Self {
            jpeg_quality: 85,
            filter: FilterType::Lanczos3,
        }
    }
}

pub struct ImageTransformer {
    config: TransformerConfig,
}

impl ImageTransformer {
    pub fn new(config: TransformerConfig) -> Self {
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self::new(TransformerConfig::default())
    }

    /// Resample to exactly `width` x `height`.
    pub fn resize(&self, img: &DynamicImage, width: u32, height: u32) -> DynamicImage {
        img.resize_exact(width, height, self.config.filter)
    }

    /// Encode according to the source format tag. Returns bytes and MIME type.
    pub fn encode(&self, img: &DynamicImage, format: &str) -> Result<(Bytes, &'static str)> {
        match format {
            "jpeg" | "jpg" => self.encode_jpeg(img),
            // Lossy substitution: WebP sources come back as PNG
            "png" | "webp" => self.encode_png(img),
            _ => self.encode_jpeg(img),
        }
    }

    /// Resize then encode (blocking version)
    ///
    /// **Note:** CPU-intensive; from async code use `transform_async`.
    pub fn transform(
        &self,
        img: &DynamicImage,
        format: &str,
        width: u32,
        height: u32,
    ) -> Result<ResizedImage> {
        let resized = self.resize(img, width, height);
        let (data, mime_type) = self.encode(&resized, format)?;

        debug!(
            source_format = %format,
            width,
            height,
            size = data.len(),
            mime_type,
            "Image resized"
        );

        Ok(ResizedImage {
            data,
            mime_type: mime_type.to_string(),
        })
    }

    /// Resize then encode on the blocking thread pool.
    pub async fn transform_async(
        self: Arc<Self>,
        img: DynamicImage,
        format: String,
        width: u32,
        height: u32,
    ) -> Result<ResizedImage> {
        tokio::task::spawn_blocking(move || self.transform(&img, &format, width, height))
            .await
            .map_err(|e| ResizeError::Transform(format!("resize task panicked: {e}")))?
    }

    fn encode_jpeg(&self, img: &DynamicImage) -> Result<(Bytes, &'static str)> {
        // JPEG has no alpha channel
        let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
        let data = Self::write(&rgb, ImageOutputFormat::Jpeg(self.config.jpeg_quality))?;
        Ok((data, MIME_JPEG))
    }

    fn encode_png(&self, img: &DynamicImage) -> Result<(Bytes, &'static str)> {
        let data = Self::write(img, ImageOutputFormat::Png)?;
        Ok((data, MIME_PNG))
    }

    fn write(img: &DynamicImage, format: ImageOutputFormat) -> Result<Bytes> {
        let mut buf = Vec::new();
        let mut cursor = Cursor::new(&mut buf);

        img.write_to(&mut cursor, format)
            .map_err(|e| ResizeError::Transform(format!("encoding image failed: {e}")))?;

        Ok(Bytes::from(buf))
    }
}

impl Default for ImageTransformer {
    fn default() -> Self {
        Self::with_defaults()
    }
}
