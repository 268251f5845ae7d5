//! Core data types for financial market data.
//!
//! This module defines the fundamental data structures:
//!
//! - [`Symbol`] - Trading symbol/ticker
//! - [`OhlcvBar`] - OHLCV price bar
//! - [`QuoteRecord`] - Point-in-time quote snapshot
//! - [`ContractDetails`] - Instrument reference data from the gateway
//! - [`ScannerRow`] - One market scanner result
//! - [`ohlcv_frame`] - Bars-to-DataFrame conversion

use chrono::{DateTime, Utc};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::asset::AssetClass;
use crate::error::{FeedError, Result};

/// A trading symbol/ticker.
///
/// Symbols are automatically uppercased on creation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Symbol(String);

impl Symbol {
    /// Creates a new symbol from a string, converting to uppercase.
    #[must_use]
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into().to_uppercase())
    }

    /// Returns the symbol as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Symbol {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Symbol {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// OHLCV (Open, High, Low, Close, Volume) bar data.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OhlcvBar {
    /// Timestamp of the bar.
    pub timestamp: DateTime<Utc>,
    /// Opening price.
    pub open: f64,
    /// Highest price during the period.
    pub high: f64,
    /// Lowest price during the period.
    pub low: f64,
    /// Closing price.
    pub close: f64,
    /// Trading volume.
    pub volume: f64,
    /// Split/dividend adjusted closing price.
    pub adjusted_close: Option<f64>,
}

impl OhlcvBar {
    /// Creates a new OHLCV bar.
    #[must_use]
    pub const fn new(
        timestamp: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
            adjusted_close: None,
        }
    }

    /// Sets the adjusted close price.
    #[must_use]
    pub const fn with_adjusted_close(mut self, adjusted_close: f64) -> Self {
        self.adjusted_close = Some(adjusted_close);
        self
    }
}

/// A point-in-time quote snapshot for one instrument.
///
/// Providers that cannot serve live quotes derive this from the most recent
/// historical bars, with `change_percent` computed against the prior close.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QuoteRecord {
    /// Symbol the quote is for.
    pub symbol: Symbol,
    /// Last traded/known price.
    pub price: f64,
    /// Session open.
    pub open: f64,
    /// Session high.
    pub high: f64,
    /// Session low.
    pub low: f64,
    /// Session volume.
    pub volume: f64,
    /// Percent change versus the previous close.
    pub change_percent: f64,
    /// Trading currency, when known.
    pub currency: Option<String>,
    /// Asset class the symbol was classified as.
    pub asset_class: AssetClass,
    /// Name of the provider that produced the quote.
    pub source: String,
    /// When the quote was produced.
    pub timestamp: DateTime<Utc>,
}

/// Instrument reference data returned by the gateway.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ContractDetails {
    /// Resolved symbol.
    pub symbol: Symbol,
    /// Security type (e.g., "STK", "CASH", "CRYPTO").
    pub sec_type: String,
    /// Listing exchange.
    pub exchange: String,
    /// Trading currency.
    pub currency: String,
    /// Full instrument name.
    pub long_name: String,
    /// Industry classification.
    pub industry: String,
    /// Category within the industry.
    pub category: String,
    /// Minimum price increment.
    pub min_tick: f64,
    /// Trading hours string as reported by the gateway.
    pub trading_hours: String,
}

/// One row of a market scanner result.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScannerRow {
    /// Rank within the scan (0 = best match).
    pub rank: i32,
    /// Instrument symbol.
    pub symbol: Symbol,
    /// Listing exchange.
    pub exchange: String,
    /// Trading currency.
    pub currency: String,
    /// Full instrument name, when provided.
    pub long_name: String,
}

/// Builds the canonical OHLCV `DataFrame` from a slice of bars.
///
/// Columns: `symbol`, `timestamp` (millisecond datetime), `open`, `high`,
/// `low`, `close`, `volume`, `adjusted_close`. Bars are emitted in the order
/// given; callers are expected to pass them oldest-first.
pub fn ohlcv_frame(symbol: &Symbol, bars: &[OhlcvBar]) -> Result<DataFrame> {
    let ts: Vec<i64> = bars.iter().map(|b| b.timestamp.timestamp_millis()).collect();
    let ts_col = Column::new("timestamp".into(), ts)
        .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))
        .map_err(|e| FeedError::Parse(e.to_string()))?;

    let opens: Vec<f64> = bars.iter().map(|b| b.open).collect();
    let highs: Vec<f64> = bars.iter().map(|b| b.high).collect();
    let lows: Vec<f64> = bars.iter().map(|b| b.low).collect();
    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let volumes: Vec<f64> = bars.iter().map(|b| b.volume).collect();
    let adj_closes: Vec<Option<f64>> = bars.iter().map(|b| b.adjusted_close).collect();

    DataFrame::new(vec![
        Column::new("symbol".into(), vec![symbol.as_str(); bars.len()]),
        ts_col,
        Column::new("open".into(), opens),
        Column::new("high".into(), highs),
        Column::new("low".into(), lows),
        Column::new("close".into(), closes),
        Column::new("volume".into(), volumes),
        Column::new("adjusted_close".into(), adj_closes),
    ])
    .map_err(|e| FeedError::Parse(e.to_string()))
}
