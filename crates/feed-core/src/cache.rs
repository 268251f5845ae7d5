//! Cache trait and cache keys for fetched series.
//!
//! This module defines the [`SeriesCache`] trait that provides a unified
//! interface for memoizing fetched bar series, keyed by
//! `(symbol, timeframe, limit)`.

use async_trait::async_trait;
use polars::prelude::DataFrame;

use crate::{error::Result, timeframe::Timeframe, types::Symbol};

/// Key identifying one cached series.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SeriesKey {
    /// Symbol the series is for.
    pub symbol: Symbol,
    /// Bar granularity of the series.
    pub timeframe: Timeframe,
    /// Maximum number of bars requested.
    pub limit: usize,
}

impl SeriesKey {
    /// Creates a new series key.
    #[must_use]
    pub const fn new(symbol: Symbol, timeframe: Timeframe, limit: usize) -> Self {
        Self {
            symbol,
            timeframe,
            limit,
        }
    }

    /// Filesystem-safe stem for this key, e.g. `AAPL_1h_100`.
    ///
    /// Path separators that can appear in forex notation are flattened.
    #[must_use]
    pub fn file_stem(&self) -> String {
        let symbol = self.symbol.as_str().replace(['/', '\\'], "-");
        format!("{}_{}_{}", symbol, self.timeframe, self.limit)
    }
}

impl std::fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.symbol, self.timeframe, self.limit)
    }
}

/// Trait for memoizing fetched bar series.
///
/// Implementations decide their own storage backend and own their TTL; a
/// `get` must return `Ok(None)` for entries older than that TTL.
#[async_trait]
pub trait SeriesCache: Send + Sync + std::fmt::Debug {
    /// Retrieves a cached series.
    ///
    /// Returns `Ok(Some(df))` on a fresh hit, `Ok(None)` on a miss or a stale
    /// or unreadable entry.
    async fn get(&self, key: &SeriesKey) -> Result<Option<DataFrame>>;

    /// Stores a series, replacing any previous entry for the key.
    async fn put(&self, key: &SeriesKey, data: &DataFrame) -> Result<()>;

    /// Removes entries older than the backend's TTL.
    ///
    /// Returns the number of entries invalidated.
    async fn invalidate_stale(&self) -> Result<usize>;

    /// Clears all cached data.
    async fn clear(&self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_stem_flattens_separators() {
        let key = SeriesKey::new(Symbol::new("EUR/USD"), Timeframe::OneHour, 100);
        assert_eq!(key.file_stem(), "EUR-USD_1h_100");
    }

    #[test]
    fn file_stem_shape() {
        let key = SeriesKey::new(Symbol::new("aapl"), Timeframe::OneDay, 30);
        assert_eq!(key.file_stem(), "AAPL_1d_30");
    }
}
