#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/quantfeed/feed/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Finnhub fallback data provider.
//!
//! This crate implements the [`MarketDataAdapter`] contract from `feed-core`
//! for the [Finnhub](https://finnhub.io/) API.
//!
//! # Usage
//!
//! ```rust,ignore
//! use feed_finnhub::FinnhubProvider;
//! use feed_core::{AssetClass, MarketDataAdapter, Symbol, Timeframe};
//!
//! #[tokio::main]
//! async fn main() -> feed_core::Result<()> {
//!     let provider = FinnhubProvider::new("your_api_key");
//!     let symbol = Symbol::new("AAPL");
//!
//!     let quote = provider.quote(&symbol, AssetClass::Equity).await?;
//!     let bars = provider
//!         .historical(&symbol, Timeframe::OneDay, 30, AssetClass::Equity)
//!         .await?;
//!     Ok(())
//! }
//! ```

use std::fmt;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use polars::prelude::DataFrame;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use feed_core::{
    AssetClass, FeedError, MarketDataAdapter, OhlcvBar, QuoteRecord, Result, Symbol, Timeframe,
    ohlcv_frame,
};

/// Base URL for the Finnhub REST API.
const FINNHUB_BASE_URL: &str = "https://finnhub.io/api/v1";

const SUPPORTED_CLASSES: &[AssetClass] = &[AssetClass::Equity, AssetClass::Forex];

/// Finnhub fallback data provider.
#[derive(Clone)]
pub struct FinnhubProvider {
    client: Client,
    api_key: String,
}

impl fmt::Debug for FinnhubProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FinnhubProvider")
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

impl FinnhubProvider {
    /// Create a new Finnhub provider with the given API key.
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
        }
    }

    /// Create a new Finnhub provider with a custom HTTP client.
    #[must_use]
    pub fn with_client(client: Client, api_key: impl Into<String>) -> Self {
        Self {
            client,
            api_key: api_key.into(),
        }
    }

    /// Build a URL with the API token appended.
    fn url(&self, endpoint: &str) -> String {
        if endpoint.contains('?') {
            format!("{FINNHUB_BASE_URL}/{endpoint}&token={}", self.api_key)
        } else {
            format!("{FINNHUB_BASE_URL}/{endpoint}?token={}", self.api_key)
        }
    }

    /// Make a GET request and parse the JSON response.
    async fn get<T: serde::de::DeserializeOwned>(&self, endpoint: &str) -> Result<T> {
        let url = self.url(endpoint);
        debug!("Finnhub request: {}", endpoint);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| FeedError::Network(e.to_string()))?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(FeedError::RateLimited {
                provider: "Finnhub".to_string(),
                retry_after: None,
            });
        }

        if !response.status().is_success() {
            return Err(FeedError::Network(format!(
                "HTTP {} from Finnhub",
                response.status()
            )));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| FeedError::Parse(e.to_string()))
    }

    /// Candle resolution string for a timeframe.
    ///
    /// Finnhub has no four-hour resolution; it degrades to hourly bars.
    fn resolution_for(timeframe: Timeframe) -> &'static str {
        match timeframe {
            Timeframe::OneMinute => "1",
            Timeframe::FiveMinutes => "5",
            Timeframe::FifteenMinutes => "15",
            Timeframe::ThirtyMinutes => "30",
            Timeframe::OneHour | Timeframe::FourHours => "60",
            Timeframe::OneDay => "D",
            Timeframe::OneWeek => "W",
            Timeframe::OneMonth => "M",
        }
    }
}

#[async_trait]
impl MarketDataAdapter for FinnhubProvider {
    fn name(&self) -> &str {
        "Finnhub"
    }

    fn description(&self) -> &str {
        "Finnhub REST provider for real-time quotes and historical candles"
    }

    fn supported_classes(&self) -> &[AssetClass] {
        SUPPORTED_CLASSES
    }

    async fn quote(
        &self,
        symbol: &Symbol,
        asset_class: AssetClass,
    ) -> Result<Option<QuoteRecord>> {
        let raw: RawQuote = self.get(&format!("quote?symbol={}", symbol.as_str())).await?;

        // Finnhub answers unknown symbols with an all-zero quote.
        if raw.current == 0.0 && raw.timestamp == 0 {
            debug!(symbol = %symbol, "no quote data available");
            return Ok(None);
        }

        Ok(Some(QuoteRecord {
            symbol: symbol.clone(),
            price: raw.current,
            open: raw.open,
            high: raw.high,
            low: raw.low,
            volume: 0.0,
            change_percent: raw.percent_change.unwrap_or(0.0),
            currency: None,
            asset_class,
            source: self.name().to_string(),
            timestamp: Utc
                .timestamp_opt(raw.timestamp, 0)
                .single()
                .unwrap_or_else(Utc::now),
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

        let to = Utc::now().timestamp();
        let span_minutes = (timeframe.approx_minutes() * limit as u64).max(1) * 2;
        let from = to - (span_minutes * 60) as i64;
        let resolution = Self::resolution_for(timeframe);

        let raw: RawCandles = self
            .get(&format!(
                "stock/candle?symbol={}&resolution={}&from={}&to={}",
                symbol.as_str(),
                resolution,
                from,
                to
            ))
            .await?;

        if raw.status != "ok" || raw.timestamps.is_empty() {
            debug!(symbol = %symbol, status = %raw.status, "no candle data available");
            return Ok(None);
        }

        let mut bars = Vec::with_capacity(raw.timestamps.len());
        for (i, &ts) in raw.timestamps.iter().enumerate() {
            let (Some(&open), Some(&high), Some(&low), Some(&close)) = (
                raw.opens.get(i),
                raw.highs.get(i),
                raw.lows.get(i),
                raw.closes.get(i),
            ) else {
                continue;
            };
            let Some(timestamp) = Utc.timestamp_opt(ts, 0).single() else {
                continue;
            };
            let volume = raw.volumes.get(i).copied().unwrap_or(0.0);
            bars.push(OhlcvBar::new(timestamp, open, high, low, close, volume));
        }

        if bars.is_empty() {
            return Ok(None);
        }
        if bars.len() > limit {
            bars.drain(..bars.len() - limit);
        }
        ohlcv_frame(symbol, &bars).map(Some)
    }
}

// ============================================================================
// Finnhub API Response Types
// ============================================================================

/// `/quote` response.
#[derive(Debug, Deserialize)]
struct RawQuote {
    #[serde(rename = "c")]
    current: f64,
    #[serde(rename = "o")]
    open: f64,
    #[serde(rename = "h")]
    high: f64,
    #[serde(rename = "l")]
    low: f64,
    #[serde(rename = "dp")]
    percent_change: Option<f64>,
    #[serde(rename = "t")]
    timestamp: i64,
}

/// `/stock/candle` response.
#[derive(Debug, Deserialize)]
struct RawCandles {
    #[serde(rename = "s")]
    status: String,
    #[serde(rename = "t", default)]
    timestamps: Vec<i64>,
    #[serde(rename = "o", default)]
    opens: Vec<f64>,
    #[serde(rename = "h", default)]
    highs: Vec<f64>,
    #[serde(rename = "l", default)]
    lows: Vec<f64>,
    #[serde(rename = "c", default)]
    closes: Vec<f64>,
    #[serde(rename = "v", default)]
    volumes: Vec<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_appends_the_token() {
        let provider = FinnhubProvider::new("k3y");
        assert_eq!(
            provider.url("quote?symbol=AAPL"),
            "https://finnhub.io/api/v1/quote?symbol=AAPL&token=k3y"
        );
        assert_eq!(
            provider.url("stock/profile2"),
            "https://finnhub.io/api/v1/stock/profile2?token=k3y"
        );
    }

    #[test]
    fn debug_redacts_the_api_key() {
        let provider = FinnhubProvider::new("secret");
        assert!(!format!("{provider:?}").contains("secret"));
    }

    #[test]
    fn resolutions_for_timeframes() {
        assert_eq!(FinnhubProvider::resolution_for(Timeframe::OneMinute), "1");
        assert_eq!(FinnhubProvider::resolution_for(Timeframe::OneHour), "60");
        assert_eq!(FinnhubProvider::resolution_for(Timeframe::OneDay), "D");
    }

    #[test]
    fn no_data_candles_parse() {
        let raw: RawCandles = serde_json::from_str(r#"{"s":"no_data"}"#).unwrap();
        assert_eq!(raw.status, "no_data");
        assert!(raw.timestamps.is_empty());
    }

    #[test]
    fn provider_info() {
        let provider = FinnhubProvider::new("key");
        assert_eq!(provider.name(), "Finnhub");
        assert!(provider.supported_classes().contains(&AssetClass::Forex));
    }
}
