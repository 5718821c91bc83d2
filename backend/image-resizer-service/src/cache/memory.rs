use super::{meta_key, CachedImage, ImageCache};
use crate::error::CacheError;
use crate::models::DEFAULT_CONTENT_TYPE;
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::Instant;

/// In-process cache with the same two-key layout and TTL semantics as Redis.
pub struct InMemoryImageCache {
    entries: DashMap<String, (Bytes, Instant)>,
    ttl: Duration,
    writes: AtomicUsize,
    failing: AtomicBool,
}

impl InMemoryImageCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            writes: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
        }
    }

    /// Number of successful `set` calls
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Make every subsequent call fail as an unreachable backend would.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Drop one physical key, e.g. only the metadata half of an entry.
    pub fn remove_raw(&self, physical_key: &str) {
        self.entries.remove(physical_key);
    }

    pub fn contains_raw(&self, physical_key: &str) -> bool {
        self.read(physical_key).is_some()
    }

    fn read(&self, physical_key: &str) -> Option<Bytes> {
        {
            let entry = self.entries.get(physical_key)?;
            if entry.1 > Instant::now() {
                return Some(entry.0.clone());
            }
        }
        self.entries
            .remove_if(physical_key, |_, (_, expires_at)| *expires_at <= Instant::now());
        None
    }

    fn check_available(&self) -> Result<(), CacheError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(CacheError::Unavailable("in-memory cache set to fail".into()));
        }
        Ok(())
    }
}

impl Default for InMemoryImageCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(3600))
    }
}

#[async_trait]
impl ImageCache for InMemoryImageCache {
    async fn get(&self, key: &str) -> Result<Option<CachedImage>, CacheError> {
        self.check_available()?;

        let Some(payload) = self.read(key) else {
            return Ok(None);
        };
        let content_type = self
            .read(&meta_key(key))
            .and_then(|raw| String::from_utf8(raw.to_vec()).ok())
            .filter(|content_type| !content_type.is_empty())
            .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());

        Ok(Some(CachedImage {
            payload,
            content_type,
        }))
    }

    async fn set(
        &self,
        key: &str,
        payload: &Bytes,
        content_type: &str,
    ) -> Result<(), CacheError> {
        self.check_available()?;

        let expires_at = Instant::now() + self.ttl;
        self.entries
            .insert(key.to_string(), (payload.clone(), expires_at));
        self.entries.insert(
            meta_key(key),
            (Bytes::copy_from_slice(content_type.as_bytes()), expires_at),
        );
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
