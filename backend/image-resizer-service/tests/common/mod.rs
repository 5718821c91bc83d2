//! Shared test doubles for the image resizer integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use image::{DynamicImage, ImageOutputFormat, Rgb, RgbImage};
use image_resizer_service::cache::InMemoryImageCache;
use image_resizer_service::error::{ResizeError, Result};
use image_resizer_service::services::{FetchedImage, ImageFetcher, ResizerService};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const IMAGE_URL: &str = "https://x/img.jpg";

pub fn source_image() -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_pixel(64, 32, Rgb([10, 120, 200])))
}

pub fn encode(img: &DynamicImage, format: ImageOutputFormat) -> Vec<u8> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), format)
        .expect("encode test image");
    buf
}

/// Fetcher that hands out an in-memory image and counts calls.
pub struct StubFetcher {
    calls: AtomicUsize,
    format: String,
    failure: Option<ResizeError>,
    delay: Duration,
}

impl StubFetcher {
    pub fn new(format: &str) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            format: format.to_string(),
            failure: None,
            delay: Duration::ZERO,
        })
    }

    pub fn failing(error: ResizeError) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            format: "jpeg".to_string(),
            failure: Some(error),
            delay: Duration::ZERO,
        })
    }

    pub fn slow(format: &str, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            format: format.to_string(),
            failure: None,
            delay,
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageFetcher for StubFetcher {
    async fn fetch(&self, _url: &str) -> Result<FetchedImage> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(error) = &self.failure {
            return Err(error.clone());
        }
        Ok(FetchedImage {
            image: source_image(),
            format: self.format.clone(),
        })
    }
}

/// Service over a stub fetcher and an in-memory cache
pub fn cached_service(
    fetcher: Arc<StubFetcher>,
) -> (ResizerService, Arc<InMemoryImageCache>) {
    let cache = Arc::new(InMemoryImageCache::default());
    let service = ResizerService::new(fetcher).with_cache(cache.clone());
    (service, cache)
}
