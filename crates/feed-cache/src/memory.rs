//! In-memory cache implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use feed_core::{Result, SeriesCache, SeriesKey};
use polars::prelude::DataFrame;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, instrument};

/// Cache entry with timestamp for TTL-based invalidation.
#[derive(Debug, Clone)]
struct CacheEntry {
    frame: DataFrame,
    cached_at: DateTime<Utc>,
}

impl CacheEntry {
    fn new(frame: DataFrame) -> Self {
        Self {
            frame,
            cached_at: Utc::now(),
        }
    }

    fn is_stale(&self, ttl: Duration) -> bool {
        let age = Utc::now().signed_duration_since(self.cached_at);
        age >= chrono::TimeDelta::from_std(ttl).unwrap_or(chrono::TimeDelta::MAX)
    }
}

/// Simple in-memory cache for testing and development.
///
/// Data is stored in an `RwLock`-protected `HashMap` and is lost when the
/// cache is dropped. Frames are cloned on get/put operations.
#[derive(Debug)]
pub struct InMemoryCache {
    entries: RwLock<HashMap<SeriesKey, CacheEntry>>,
    ttl: Duration,
}

impl InMemoryCache {
    /// Create a new empty in-memory cache with the given entry TTL.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }
}

#[async_trait]
impl SeriesCache for InMemoryCache {
    #[instrument(skip(self), fields(key = %key))]
    async fn get(&self, key: &SeriesKey) -> Result<Option<DataFrame>> {
        let entries = self.entries.read().await;
        match entries.get(key) {
            Some(entry) if !entry.is_stale(self.ttl) => {
                debug!("cache hit");
                Ok(Some(entry.frame.clone()))
            }
            Some(_) => {
                debug!("cached series is stale");
                Ok(None)
            }
            None => {
                debug!("cache miss");
                Ok(None)
            }
        }
    }

    #[instrument(skip(self, data), fields(key = %key, rows = data.height()))]
    async fn put(&self, key: &SeriesKey, data: &DataFrame) -> Result<()> {
        let mut entries = self.entries.write().await;
        entries.insert(key.clone(), CacheEntry::new(data.clone()));
        debug!("cached series stored");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn invalidate_stale(&self) -> Result<usize> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_stale(self.ttl));
        let removed = before - entries.len();
        if removed > 0 {
            debug!(removed, "invalidated stale cache entries");
        }
        Ok(removed)
    }

    #[instrument(skip(self))]
    async fn clear(&self) -> Result<()> {
        self.entries.write().await.clear();
        debug!("cleared all cache entries");
        Ok(())
    }
}
