#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/quantfeed/feed/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Binance public-API crypto data provider.
//!
//! This crate implements the [`MarketDataAdapter`] contract from `feed-core`
//! against Binance's unauthenticated REST endpoints. No API key is required
//! for tickers and klines.

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

/// Base URL for the Binance public REST API.
const BINANCE_BASE_URL: &str = "https://api.binance.com/api/v3";

const SUPPORTED_CLASSES: &[AssetClass] = &[AssetClass::Crypto];

/// Binance public-API crypto data provider.
#[derive(Clone, Default)]
pub struct BinanceProvider {
    client: Client,
}

impl fmt::Debug for BinanceProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BinanceProvider").finish()
    }
}

impl BinanceProvider {
    /// Create a new Binance provider.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new Binance provider with a custom HTTP client.
    #[must_use]
    pub const fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// Make a GET request and parse the JSON response.
    ///
    /// `Ok(None)` means Binance rejected the symbol (HTTP 400, code -1121).
    async fn get<T: serde::de::DeserializeOwned>(&self, endpoint: &str) -> Result<Option<T>> {
        let url = format!("{BINANCE_BASE_URL}/{endpoint}");
        debug!("Binance request: {}", endpoint);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| FeedError::Network(e.to_string()))?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(FeedError::RateLimited {
                provider: "Binance".to_string(),
                retry_after: None,
            });
        }

        if response.status() == reqwest::StatusCode::BAD_REQUEST {
            debug!("symbol rejected by Binance");
            return Ok(None);
        }

        if !response.status().is_success() {
            return Err(FeedError::Network(format!(
                "HTTP {} from Binance",
                response.status()
            )));
        }

        response
            .json::<T>()
            .await
            .map(Some)
            .map_err(|e| FeedError::Parse(e.to_string()))
    }

    /// Kline interval string for a timeframe. Binance supports all of them
    /// natively.
    const fn interval_for(timeframe: Timeframe) -> &'static str {
        match timeframe {
            Timeframe::OneMinute => "1m",
            Timeframe::FiveMinutes => "5m",
            Timeframe::FifteenMinutes => "15m",
            Timeframe::ThirtyMinutes => "30m",
            Timeframe::OneHour => "1h",
            Timeframe::FourHours => "4h",
            Timeframe::OneDay => "1d",
            Timeframe::OneWeek => "1w",
            Timeframe::OneMonth => "1M",
        }
    }
}

#[async_trait]
impl MarketDataAdapter for BinanceProvider {
    fn name(&self) -> &str {
        "Binance"
    }

    fn description(&self) -> &str {
        "Binance public REST provider for crypto tickers and klines"
    }

    fn supported_classes(&self) -> &[AssetClass] {
        SUPPORTED_CLASSES
    }

    async fn quote(
        &self,
        symbol: &Symbol,
        asset_class: AssetClass,
    ) -> Result<Option<QuoteRecord>> {
        let Some(ticker) = self
            .get::<Ticker24h>(&format!("ticker/24hr?symbol={}", symbol.as_str()))
            .await?
        else {
            return Ok(None);
        };

        let price = parse_field(&ticker.last_price, "lastPrice")?;
        if price <= 0.0 {
            debug!(symbol = %symbol, "ticker has no usable price");
            return Ok(None);
        }

        Ok(Some(QuoteRecord {
            symbol: symbol.clone(),
            price,
            open: parse_field(&ticker.open_price, "openPrice")?,
            high: parse_field(&ticker.high_price, "highPrice")?,
            low: parse_field(&ticker.low_price, "lowPrice")?,
            volume: parse_field(&ticker.volume, "volume")?,
            change_percent: parse_field(&ticker.price_change_percent, "priceChangePercent")?,
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

        // Binance caps a single klines request at 1000 rows.
        let capped = limit.min(1_000);
        let Some(rows) = self
            .get::<Vec<Kline>>(&format!(
                "klines?symbol={}&interval={}&limit={}",
                symbol.as_str(),
                Self::interval_for(timeframe),
                capped
            ))
            .await?
        else {
            return Ok(None);
        };

        if rows.is_empty() {
            debug!(symbol = %symbol, "no klines available");
            return Ok(None);
        }

        let mut bars = Vec::with_capacity(rows.len());
        for row in &rows {
            bars.push(row.to_bar()?);
        }
        ohlcv_frame(symbol, &bars).map(Some)
    }
}

/// One kline row: `[openTime, open, high, low, close, volume, ...]` with
/// prices quoted as strings.
#[derive(Debug, Deserialize)]
struct Kline(
    i64,
    String,
    String,
    String,
    String,
    String,
    #[serde(default)] serde_json::Value,
    #[serde(default)] serde_json::Value,
    #[serde(default)] serde_json::Value,
    #[serde(default)] serde_json::Value,
    #[serde(default)] serde_json::Value,
    #[serde(default)] serde_json::Value,
);

impl Kline {
    fn to_bar(&self) -> Result<OhlcvBar> {
        let timestamp = Utc
            .timestamp_millis_opt(self.0)
            .single()
            .ok_or_else(|| FeedError::Parse(format!("Invalid kline open time: {}", self.0)))?;

        Ok(OhlcvBar::new(
            timestamp,
            parse_field(&self.1, "open")?,
            parse_field(&self.2, "high")?,
            parse_field(&self.3, "low")?,
            parse_field(&self.4, "close")?,
            parse_field(&self.5, "volume")?,
        ))
    }
}

/// `/ticker/24hr` response; Binance quotes all prices as strings.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Ticker24h {
    last_price: String,
    open_price: String,
    high_price: String,
    low_price: String,
    volume: String,
    price_change_percent: String,
}

fn parse_field(raw: &str, field: &str) -> Result<f64> {
    raw.parse::<f64>()
        .map_err(|_| FeedError::Parse(format!("Bad numeric field {field}: {raw}")))
}
