//! Disk-backed cache implementation.

use async_trait::async_trait;
use feed_core::{FeedError, Result, SeriesCache, SeriesKey};
use polars::prelude::*;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, instrument, warn};

/// Disk-backed cache storing one parquet file per series key.
///
/// Writes go to a temp file in the cache directory under an exclusive
/// advisory lock and are atomically renamed over the target, so a concurrent
/// reader observes either the previous complete series or the new one, never
/// a torn intermediate state. Reads take a shared advisory lock; any number
/// of readers may proceed together, and a malformed file is treated as a miss
/// rather than an error (the next successful write heals it).
///
/// An entry is valid while `now - written_at < ttl`, where `written_at` is
/// the file modification time stamped by the rename.
#[derive(Debug)]
pub struct DiskCache {
    dir: PathBuf,
    ttl: Duration,
}

impl DiskCache {
    /// Default entry lifetime.
    pub const DEFAULT_TTL: Duration = Duration::from_secs(60);

    /// Create a cache rooted at `dir` with the given entry TTL.
    ///
    /// The directory is created if it does not exist.
    ///
    /// # Errors
    /// Returns an error if the directory cannot be created.
    pub fn new(dir: impl Into<PathBuf>, ttl: Duration) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| FeedError::Cache(e.to_string()))?;
        Ok(Self { dir, ttl })
    }

    /// Create a cache rooted at `dir` with [`Self::DEFAULT_TTL`].
    ///
    /// # Errors
    /// Returns an error if the directory cannot be created.
    pub fn with_default_ttl(dir: impl Into<PathBuf>) -> Result<Self> {
        Self::new(dir, Self::DEFAULT_TTL)
    }

    fn path_for(&self, key: &SeriesKey) -> PathBuf {
        self.dir.join(format!("{}.parquet", key.file_stem()))
    }

    fn entry_age(path: &Path) -> Option<Duration> {
        let written_at = fs::metadata(path).and_then(|m| m.modified()).ok()?;
        Some(
            SystemTime::now()
                .duration_since(written_at)
                .unwrap_or_default(),
        )
    }
}

#[async_trait]
impl SeriesCache for DiskCache {
    #[instrument(skip(self), fields(key = %key))]
    async fn get(&self, key: &SeriesKey) -> Result<Option<DataFrame>> {
        let path = self.path_for(key);

        let Some(age) = Self::entry_age(&path) else {
            debug!("no cached series on disk");
            return Ok(None);
        };
        if age >= self.ttl {
            debug!(age_secs = age.as_secs(), "cached series is stale");
            return Ok(None);
        }

        let file = match File::open(&path) {
            Ok(f) => f,
            Err(e) => {
                debug!(error = %e, "cached series vanished before read");
                return Ok(None);
            }
        };
        file.lock_shared()
            .map_err(|e| FeedError::Cache(e.to_string()))?;

        // Lock is released when `file` is dropped by the reader.
        match ParquetReader::new(file).finish() {
            Ok(df) => {
                debug!(rows = df.height(), "cache hit");
                Ok(Some(df))
            }
            Err(e) => {
                warn!(error = %e, "malformed cache file, treating as miss");
                let _ = fs::remove_file(&path);
                Ok(None)
            }
        }
    }

    #[instrument(skip(self, data), fields(key = %key, rows = data.height()))]
    async fn put(&self, key: &SeriesKey, data: &DataFrame) -> Result<()> {
        let path = self.path_for(key);

        let tmp = tempfile::Builder::new()
            .prefix(&format!("{}.", key.file_stem()))
            .suffix(".tmp")
            .tempfile_in(&self.dir)
            .map_err(|e| FeedError::Cache(e.to_string()))?;

        tmp.as_file()
            .lock()
            .map_err(|e| FeedError::Cache(e.to_string()))?;

        let mut frame = data.clone();
        ParquetWriter::new(tmp.as_file())
            .finish(&mut frame)
            .map_err(|e| FeedError::Cache(e.to_string()))?;

        // Atomic replace; the lock dies with the fd once persisted.
        tmp.persist(&path)
            .map_err(|e| FeedError::Cache(e.to_string()))?;

        debug!("cached series written");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn invalidate_stale(&self) -> Result<usize> {
        let entries = fs::read_dir(&self.dir).map_err(|e| FeedError::Cache(e.to_string()))?;

        let mut removed = 0usize;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("parquet") {
                continue;
            }
            if matches!(Self::entry_age(&path), Some(age) if age >= self.ttl)
                && fs::remove_file(&path).is_ok()
            {
                removed += 1;
            }
        }

        if removed > 0 {
            debug!(removed, "invalidated stale cache entries");
        }
        Ok(removed)
    }

    #[instrument(skip(self))]
    async fn clear(&self) -> Result<()> {
        let entries = fs::read_dir(&self.dir).map_err(|e| FeedError::Cache(e.to_string()))?;

        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("parquet") {
                fs::remove_file(&path).map_err(|e| FeedError::Cache(e.to_string()))?;
            }
        }

        debug!("cleared all cache entries");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use feed_core::{Symbol, Timeframe};
    use std::io::Write;
    use std::sync::Arc;

    fn sample_frame(rows: usize) -> DataFrame {
        let closes: Vec<f64> = (0..rows).map(|i| 100.0 + i as f64).collect();
        let volumes: Vec<f64> = (0..rows).map(|i| 1_000.0 * (i + 1) as f64).collect();
        DataFrame::new(vec![
            Column::new("symbol".into(), vec!["AAPL"; rows]),
            Column::new("close".into(), closes),
            Column::new("volume".into(), volumes),
        ])
        .unwrap()
    }

    fn key() -> SeriesKey {
        SeriesKey::new(Symbol::new("AAPL"), Timeframe::OneHour, 100)
    }

    #[tokio::test]
    async fn put_then_get_within_ttl() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(dir.path(), Duration::from_secs(60)).unwrap();
        let df = sample_frame(3);

        cache.put(&key(), &df).await.unwrap();
        let got = cache.get(&key()).await.unwrap().unwrap();
        assert!(got.equals(&df));
    }

    #[tokio::test]
    async fn expired_entry_is_a_miss_even_if_file_is_valid() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(dir.path(), Duration::ZERO).unwrap();
        let df = sample_frame(3);

        cache.put(&key(), &df).await.unwrap();
        // The file is on disk and readable, but its age is already >= TTL.
        assert!(cache.path_for(&key()).exists());
        assert!(cache.get(&key()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn missing_entry_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(dir.path(), Duration::from_secs(60)).unwrap();
        assert!(cache.get(&key()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn corrupt_file_is_a_miss_and_heals_on_next_put() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(dir.path(), Duration::from_secs(60)).unwrap();

        let path = cache.path_for(&key());
        let mut f = File::create(&path).unwrap();
        f.write_all(b"not a parquet file").unwrap();
        drop(f);

        assert!(cache.get(&key()).await.unwrap().is_none());

        let df = sample_frame(2);
        cache.put(&key(), &df).await.unwrap();
        assert!(cache.get(&key()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn concurrent_reader_never_sees_a_torn_series() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(DiskCache::new(dir.path(), Duration::from_secs(60)).unwrap());

        let old = sample_frame(2);
        let new = sample_frame(3);
        cache.put(&key(), &old).await.unwrap();

        let writer = {
            let cache = Arc::clone(&cache);
            let new = new.clone();
            tokio::spawn(async move {
                for _ in 0..20 {
                    cache.put(&key(), &new).await.unwrap();
                    tokio::task::yield_now().await;
                }
            })
        };

        let reader = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move {
                for _ in 0..50 {
                    if let Some(df) = cache.get(&key()).await.unwrap() {
                        // Either the old complete series or the new one.
                        assert!(df.height() == 2 || df.height() == 3);
                    }
                    tokio::task::yield_now().await;
                }
            })
        };

        writer.await.unwrap();
        reader.await.unwrap();
    }

    #[tokio::test]
    async fn invalidate_stale_removes_expired_files() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(dir.path(), Duration::ZERO).unwrap();

        cache.put(&key(), &sample_frame(1)).await.unwrap();
        let removed = cache.invalidate_stale().await.unwrap();
        assert_eq!(removed, 1);
        assert!(!cache.path_for(&key()).exists());
    }

    #[tokio::test]
    async fn clear_removes_everything() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(dir.path(), Duration::from_secs(60)).unwrap();

        cache.put(&key(), &sample_frame(1)).await.unwrap();
        cache.clear().await.unwrap();
        assert!(cache.get(&key()).await.unwrap().is_none());
    }
}
