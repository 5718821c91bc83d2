/// Caching layer for resized images
///
/// Each logical entry is two physical keys sharing one TTL: the encoded
/// payload and its content type. A payload without metadata is still a hit
/// (content type falls back to `application/octet-stream`); metadata without
/// a payload is a miss.
use crate::error::CacheError;
use async_trait::async_trait;
use bytes::Bytes;

pub mod keys;
mod memory;
mod redis_cache;

pub use keys::{cache_key, meta_key};
pub use memory::InMemoryImageCache;
pub use redis_cache::RedisImageCache;

/// Entry read back from the cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedImage {
    pub payload: Bytes,
    pub content_type: String,
}

/// TTL key-value store for resized images.
#[async_trait]
pub trait ImageCache: Send + Sync {
    /// `Ok(None)` is a clean miss. Only a payload read failure is an error.
    async fn get(&self, key: &str) -> Result<Option<CachedImage>, CacheError>;

    /// Write payload and content type together under the configured TTL.
    async fn set(&self, key: &str, payload: &Bytes, content_type: &str)
        -> Result<(), CacheError>;
}
