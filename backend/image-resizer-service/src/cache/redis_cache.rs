use super::{meta_key, CachedImage, ImageCache};
use crate::error::CacheError;
use crate::models::DEFAULT_CONTENT_TYPE;
use async_trait::async_trait;
use bytes::Bytes;
use redis::AsyncCommands;
use redis_utils::{checkout, SharedConnectionManager};
use std::time::Duration;
use tracing::{debug, warn};

const DEFAULT_TTL: Duration = Duration::from_secs(3600);

/// Redis-backed image cache
#[derive(Clone)]
pub struct RedisImageCache {
    conn: SharedConnectionManager,
    ttl: Duration,
}

impl RedisImageCache {
    pub fn new(conn: SharedConnectionManager, ttl: Duration) -> Self {
        let ttl = if ttl.as_secs() == 0 { DEFAULT_TTL } else { ttl };
        Self { conn, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

#[async_trait]
impl ImageCache for RedisImageCache {
    async fn get(&self, key: &str) -> Result<Option<CachedImage>, CacheError> {
        let mut conn = checkout(&self.conn).await;

        let payload: Option<Vec<u8>> = conn.get(key).await?;
        let Some(payload) = payload else {
            return Ok(None);
        };

        let content_type = match conn.get::<_, Option<String>>(meta_key(key)).await {
            Ok(Some(content_type)) if !content_type.is_empty() => content_type,
            Ok(_) => {
                debug!(%key, "Cache metadata missing, using default content type");
                DEFAULT_CONTENT_TYPE.to_string()
            }
            Err(e) => {
                warn!(%key, error = %e, "Cache metadata read failed, using default content type");
                DEFAULT_CONTENT_TYPE.to_string()
            }
        };

        Ok(Some(CachedImage {
            payload: Bytes::from(payload),
            content_type,
        }))
    }

    async fn set(
        &self,
        key: &str,
        payload: &Bytes,
        content_type: &str,
    ) -> Result<(), CacheError> {
        let ttl_secs = self.ttl.as_secs();
        let mut conn = checkout(&self.conn).await;

        redis::pipe()
            .atomic()
            .set_ex(key, payload.as_ref(), ttl_secs)
            .ignore()
            .set_ex(meta_key(key), content_type, ttl_secs)
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await?;

        debug!(%key, bytes = payload.len(), ttl_secs, "Cached resized image");
        Ok(())
    }
}
