#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/quantfeed/feed/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Yahoo Finance fallback data provider.
//!
//! This crate implements the [`MarketDataAdapter`] contract from `feed-core`
//! using Yahoo Finance's chart API.
//!
//! # Example
//!
//! ```no_run
//! use feed_yahoo::YahooProvider;
//! use feed_core::{AssetClass, MarketDataAdapter, Symbol, Timeframe};
//!
//! # async fn example() -> feed_core::Result<()> {
//! let provider = YahooProvider::new();
//! let symbol = Symbol::new("AAPL");
//!
//! if let Some(df) = provider
//!     .historical(&symbol, Timeframe::OneDay, 100, AssetClass::Equity)
//!     .await?
//! {
//!     println!("Fetched {} rows", df.height());
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use polars::prelude::DataFrame;
use serde::Deserialize;
use tokio::time::sleep;
use tracing::{debug, warn};

use feed_core::{
    AssetClass, FeedError, MarketDataAdapter, OhlcvBar, QuoteRecord, Result, Symbol, Timeframe,
    ohlcv_frame,
};

/// Yahoo Finance chart API base URL.
const CHART_API_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";

/// Default rate limit delay in milliseconds.
const DEFAULT_RATE_LIMIT_MS: u64 = 1000;

/// User agent for HTTP requests.
const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36";

const SUPPORTED_CLASSES: &[AssetClass] = &[AssetClass::Equity];

/// Yahoo Finance fallback data provider.
#[derive(Debug)]
pub struct YahooProvider {
    client: reqwest::Client,
    rate_limit_ms: u64,
    last_request_time: AtomicU64,
}

impl YahooProvider {
    /// Create a new Yahoo Finance provider with default settings.
    ///
    /// Uses built-in rate limiting of 1 request per second.
    #[must_use]
    pub fn new() -> Self {
        Self::with_rate_limit(Duration::from_millis(DEFAULT_RATE_LIMIT_MS))
    }

    /// Create a new Yahoo Finance provider with a custom HTTP client.
    ///
    /// Uses the provided client for all HTTP requests. Rate limiting
    /// is still applied.
    #[must_use]
    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            rate_limit_ms: DEFAULT_RATE_LIMIT_MS,
            last_request_time: AtomicU64::new(0),
        }
    }

    /// Create a new Yahoo Finance provider with custom rate limiting.
    ///
    /// # Panics
    /// Panics if the built-in TLS configuration is unusable on this system.
    #[must_use]
    pub fn with_rate_limit(rate_limit: Duration) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            rate_limit_ms: rate_limit.as_millis() as u64,
            last_request_time: AtomicU64::new(0),
        }
    }

    /// Apply rate limiting before making a request.
    async fn apply_rate_limit(&self) {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;

        let last = self.last_request_time.load(Ordering::Relaxed);
        let elapsed = now.saturating_sub(last);

        if elapsed < self.rate_limit_ms {
            let wait_time = self.rate_limit_ms - elapsed;
            debug!("Rate limiting: waiting {}ms", wait_time);
            sleep(Duration::from_millis(wait_time)).await;
        }

        self.last_request_time.store(
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis() as u64,
            Ordering::Relaxed,
        );
    }

    /// Chart API interval string for a timeframe.
    ///
    /// Yahoo has no four-hour interval; that and anything coarser falls back
    /// to daily bars.
    fn interval_for(timeframe: Timeframe) -> &'static str {
        match timeframe {
            Timeframe::OneMinute => "1m",
            Timeframe::FiveMinutes => "5m",
            Timeframe::FifteenMinutes => "15m",
            Timeframe::ThirtyMinutes => "30m",
            Timeframe::OneHour => "1h",
            Timeframe::OneDay | Timeframe::FourHours => "1d",
            Timeframe::OneWeek => "1wk",
            Timeframe::OneMonth => "1mo",
        }
    }

    /// Build the chart API URL for a symbol and window.
    fn build_chart_url(
        &self,
        symbol: &Symbol,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        interval: &str,
    ) -> String {
        format!(
            "{}/{}?period1={}&period2={}&interval={}&includeAdjustedClose=true",
            CHART_API_URL,
            symbol.as_str(),
            start.timestamp(),
            end.timestamp(),
            interval
        )
    }

    /// Fetch bars for a window; `Ok(None)` when the symbol is unknown or the
    /// range is empty.
    async fn fetch_bars(
        &self,
        symbol: &Symbol,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        interval: &str,
    ) -> Result<Option<Vec<OhlcvBar>>> {
        self.apply_rate_limit().await;

        let url = self.build_chart_url(symbol, start, end, interval);
        debug!("Fetching chart: {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| FeedError::Network(e.to_string()))?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(FeedError::RateLimited {
                provider: "Yahoo Finance".to_string(),
                retry_after: Some(Duration::from_secs(60)),
            });
        }

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            debug!(symbol = %symbol, "symbol not found");
            return Ok(None);
        }

        if !response.status().is_success() {
            return Err(FeedError::Network(format!(
                "HTTP {} for {}",
                response.status(),
                symbol
            )));
        }

        let chart_response: ChartResponse = response
            .json()
            .await
            .map_err(|e| FeedError::Parse(e.to_string()))?;

        if let Some(error) = chart_response.chart.error {
            if error.code == "Not Found" {
                return Ok(None);
            }
            return Err(FeedError::ProviderUnavailable {
                provider: "Yahoo Finance".to_string(),
                reason: format!("{}: {}", error.code, error.description),
            });
        }

        Ok(parse_chart_bars(chart_response))
    }
}

impl Default for YahooProvider {
    fn default() -> Self {
        Self::new()
    }
}

/// Turns a chart response into bars, skipping rows with missing prices.
fn parse_chart_bars(response: ChartResponse) -> Option<Vec<OhlcvBar>> {
    let result = response.chart.result.into_iter().next()?;
    let timestamps = result.timestamp.unwrap_or_default();
    if timestamps.is_empty() {
        return None;
    }

    let quote = result.indicators.quote.into_iter().next()?;
    let adj_close = result
        .indicators
        .adjclose
        .and_then(|ac| ac.into_iter().next())
        .map(|ac| ac.adjclose)
        .unwrap_or_default();

    let mut bars = Vec::with_capacity(timestamps.len());
    for (i, &ts) in timestamps.iter().enumerate() {
        let (Some(open), Some(high), Some(low), Some(close)) = (
            quote.open.get(i).copied().flatten(),
            quote.high.get(i).copied().flatten(),
            quote.low.get(i).copied().flatten(),
            quote.close.get(i).copied().flatten(),
        ) else {
            continue;
        };
        let volume = quote.volume.get(i).copied().flatten().unwrap_or(0) as f64;
        let Some(timestamp) = Utc.timestamp_opt(ts, 0).single() else {
            continue;
        };

        let mut bar = OhlcvBar::new(timestamp, open, high, low, close, volume);
        if let Some(adj) = adj_close.get(i).copied().flatten() {
            bar = bar.with_adjusted_close(adj);
        }
        bars.push(bar);
    }

    if bars.is_empty() { None } else { Some(bars) }
}

#[async_trait]
impl MarketDataAdapter for YahooProvider {
    fn name(&self) -> &str {
        "Yahoo Finance"
    }

    fn description(&self) -> &str {
        "Yahoo Finance chart API provider for OHLCV and derived quote data"
    }

    fn supported_classes(&self) -> &[AssetClass] {
        SUPPORTED_CLASSES
    }

    async fn quote(
        &self,
        symbol: &Symbol,
        asset_class: AssetClass,
    ) -> Result<Option<QuoteRecord>> {
        let end = Utc::now();
        let start = end - chrono::Duration::days(7);

        let Some(bars) = self.fetch_bars(symbol, start, end, "1d").await? else {
            return Ok(None);
        };
        let Some(last) = bars.last() else {
            return Ok(None);
        };

        let change_percent = if bars.len() > 1 {
            let prev_close = bars[bars.len() - 2].close;
            if prev_close > 0.0 {
                ((last.close - prev_close) / prev_close * 100.0 * 100.0).round() / 100.0
            } else {
                0.0
            }
        } else {
            0.0
        };

        Ok(Some(QuoteRecord {
            symbol: symbol.clone(),
            price: last.close,
            open: last.open,
            high: last.high,
            low: last.low,
            volume: last.volume,
            change_percent,
            currency: None,
            asset_class,
            source: self.name().to_string(),
            timestamp: Utc::now(),
        }))
    }

    async fn historical(
        &self,
        symbol: &Symbol,
        timeframe: Timeframe,
        limit: usize,
        _asset_class: AssetClass,
    ) -> Result<Option<DataFrame>> {
        if limit == 0 {
            return Err(FeedError::InvalidParameter(
                "limit must be positive".to_string(),
            ));
        }

        let end = Utc::now();
        // Pad the window; weekends and holidays thin out the bars.
        let span_minutes = (timeframe.approx_minutes() * limit as u64).max(1) * 2;
        let start = end - chrono::Duration::minutes(span_minutes as i64);

        let interval = Self::interval_for(timeframe);
        let Some(mut bars) = self.fetch_bars(symbol, start, end, interval).await? else {
            warn!(symbol = %symbol, "no chart data available");
            return Ok(None);
        };

        if bars.len() > limit {
            bars.drain(..bars.len() - limit);
        }
        ohlcv_frame(symbol, &bars).map(Some)
    }
}

// ============================================================================
// Yahoo Finance API Response Types
// ============================================================================

/// Chart API response.
#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartResult,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    result: Vec<ChartData>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<QuoteData>,
    adjclose: Option<Vec<AdjClose>>,
}

#[derive(Debug, Deserialize)]
struct QuoteData {
    open: Vec<Option<f64>>,
    high: Vec<Option<f64>>,
    low: Vec<Option<f64>>,
    close: Vec<Option<f64>>,
    volume: Vec<Option<u64>>,
}

#[derive(Debug, Deserialize)]
struct AdjClose {
    adjclose: Vec<Option<f64>>,
}
