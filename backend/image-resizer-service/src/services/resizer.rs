//! Resize orchestration
//!
//! Per request: validate -> cache lookup -> (hit: return) -> fetch -> resize
//! -> encode -> cache store (best effort) -> return.
//!
//! Concurrent misses on the same key are coalesced, so one fetch serves all
//! callers that arrive while it is in flight.

use crate::cache::{cache_key, ImageCache};
use crate::error::{ResizeError, Result};
use crate::models::{ResizeRequest, ResizeTask, ResizedImage, RESIZE_TASK_KIND};
use crate::services::fetcher::ImageFetcher;
use crate::services::single_flight::SingleFlight;
use crate::services::transformer::ImageTransformer;
use std::sync::Arc;
use task_queue::{EnqueueOptions, TaskEnvelope, TaskProducer};
use tracing::{debug, info, warn};

/// Composes cache, fetcher and transformer; optionally submits async jobs.
pub struct ResizerService {
    fetcher: Arc<dyn ImageFetcher>,
    transformer: Arc<ImageTransformer>,
    cache: Option<Arc<dyn ImageCache>>,
    producer: Option<Arc<dyn TaskProducer>>,
    enqueue_options: EnqueueOptions,
    in_flight: SingleFlight<Result<ResizedImage>>,
}

impl ResizerService {
    /// Sync-only service without cache
    pub fn new(fetcher: Arc<dyn ImageFetcher>) -> Self {
        Self {
            fetcher,
            transformer: Arc::new(ImageTransformer::with_defaults()),
            cache: None,
            producer: None,
            enqueue_options: EnqueueOptions::default(),
            in_flight: SingleFlight::new(),
        }
    }

    pub fn with_cache(mut self, cache: Arc<dyn ImageCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_queue(mut self, producer: Arc<dyn TaskProducer>, options: EnqueueOptions) -> Self {
        self.producer = Some(producer);
        self.enqueue_options = options;
        self
    }

    pub fn with_transformer(mut self, transformer: ImageTransformer) -> Self {
        self.transformer = Arc::new(transformer);
        self
    }

    /// Whether a queue producer is attached
    pub fn supports_async(&self) -> bool {
        self.producer.is_some()
    }

    pub fn has_cache(&self) -> bool {
        self.cache.is_some()
    }

    /// Cache key of a request: imgcache:{sha1("url|width|height")}
    pub fn key_for(url: &str, width: i64, height: i64) -> String {
        cache_key(url, width, height)
    }

    /// Resize synchronously, serving from cache when possible.
    pub async fn get_resized(&self, req: &ResizeRequest) -> Result<ResizedImage> {
        info!(
            url = %req.url,
            width = req.width,
            height = req.height,
            "Resize request received"
        );

        req.validate()?;

        let key = Self::key_for(&req.url, req.width, req.height);

        if let Some(cache) = &self.cache {
            match cache.get(&key).await {
                Ok(Some(hit)) => {
                    info!(%key, "Served from cache");
                    return Ok(ResizedImage {
                        data: hit.payload,
                        mime_type: hit.content_type,
                    });
                }
                Ok(None) => debug!(%key, "Cache miss"),
                Err(e) => warn!(%key, error = %e, "Cache get failed, continuing without cache"),
            }
        }

        self.in_flight
            .run(&key, || self.produce(req, &key))
            .await
    }

    /// Fetch, resize, encode and store. Runs once per in-flight key.
    async fn produce(&self, req: &ResizeRequest, key: &str) -> Result<ResizedImage> {
        let (width, height) = req.dimensions();

        let source = self.fetcher.fetch(&req.url).await?;
        let resized = self
            .transformer
            .clone()
            .transform_async(source.image, source.format, width, height)
            .await?;

        match &self.cache {
            Some(cache) => match cache.set(key, &resized.data, &resized.mime_type).await {
                Ok(()) => info!(%key, bytes = resized.data.len(), "Image resized and cached"),
                Err(e) => warn!(%key, error = %e, "Cache set failed"),
            },
            None => info!(%key, bytes = resized.data.len(), "Image resized"),
        }

        Ok(resized)
    }

    /// Submit a resize job to the queue. Fire-and-forget.
    pub async fn enqueue_resize_task(&self, url: &str, width: i64, height: i64) -> Result<()> {
        let producer = self
            .producer
            .as_ref()
            .ok_or(ResizeError::QueueNotConfigured)?;

        let payload = serde_json::to_string(&ResizeTask {
            url: url.to_string(),
            width,
            height,
        })
        .map_err(|e| ResizeError::QueueSubmit(e.to_string()))?;

        let envelope = TaskEnvelope::new(RESIZE_TASK_KIND, payload, &self.enqueue_options);
        let task_id = envelope.id;

        producer
            .enqueue(envelope)
            .await
            .map_err(|e| ResizeError::QueueSubmit(e.to_string()))?;

        info!(%task_id, %url, width, height, "Resize task queued");
        Ok(())
    }
}
