//! Image fetcher - downloads and decodes a remote image
//!
//! The body is streamed and cut off at `max_body_bytes`; a truncated image
//! then fails in the decoder, not in the download.

use crate::error::{ResizeError, Result};
use async_trait::async_trait;
use image::{DynamicImage, GenericImageView, ImageFormat};
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use std::io::Cursor;
use std::time::Duration;
use tracing::debug;

/// Upper bound on bytes read from an origin (10 MiB)
pub const MAX_BODY_BYTES: usize = 10 << 20;

/// Decoded source image and the format the codec detected
#[derive(Debug, Clone)]
pub struct FetchedImage {
    pub image: DynamicImage,
    /// Lower-case codec name, e.g. "jpeg", "png", "webp"
    pub format: String,
}

#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedImage>;
}

/// Fetcher over HTTP(S)
#[derive(Clone)]
pub struct HttpImageFetcher {
    client: Client,
    max_body_bytes: usize,
}

impl HttpImageFetcher {
    pub fn new(timeout: Duration) -> std::result::Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client))
    }

    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            max_body_bytes: MAX_BODY_BYTES,
        }
    }

    pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ResizeError::Fetch(format!("making HTTP request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ResizeError::Fetch(format!(
                "bad status from origin: {}",
                status.as_u16()
            )));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        if !content_type.starts_with("image/") {
            return Err(ResizeError::Fetch(format!(
                "URL did not return an image (got {content_type})"
            )));
        }

        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| ResizeError::Fetch(format!("reading response body failed: {e}")))?
        {
            let remaining = self.max_body_bytes - body.len();
            if chunk.len() >= remaining {
                body.extend_from_slice(&chunk[..remaining]);
                debug!(%url, limit = self.max_body_bytes, "Response body truncated at limit");
                break;
            }
            body.extend_from_slice(&chunk);
        }

        Ok(body)
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedImage> {
        let body = self.download(url).await?;
        let size = body.len();

        let fetched = tokio::task::spawn_blocking(move || decode(&body))
            .await
            .map_err(|e| ResizeError::Fetch(format!("decode task panicked: {e}")))??;

        let (width, height) = fetched.image.dimensions();
        debug!(
            %url,
            bytes = size,
            format = %fetched.format,
            width,
            height,
            "Fetched source image"
        );
        Ok(fetched)
    }
}

/// Decode raw bytes, sniffing the format from the content itself.
///
/// CPU-bound; call from a blocking thread.
pub fn decode(data: &[u8]) -> Result<FetchedImage> {
    let reader = image::io::Reader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(|e| ResizeError::Fetch(format!("decoding image failed: {e}")))?;

    let format = reader
        .format()
        .ok_or_else(|| ResizeError::Fetch("decoding image failed: unknown format".to_string()))?;

    let image = reader
        .decode()
        .map_err(|e| ResizeError::Fetch(format!("decoding image failed: {e}")))?;

    Ok(FetchedImage {
        image,
        format: format_tag(format).to_string(),
    })
}

/// Codec name for a detected format.
pub fn format_tag(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Jpeg => "jpeg",
        ImageFormat::Png => "png",
        ImageFormat::WebP => "webp",
        ImageFormat::Gif => "gif",
        ImageFormat::Bmp => "bmp",
        ImageFormat::Tiff => "tiff",
        ImageFormat::Ico => "ico",
        _ => "",
    }
}
