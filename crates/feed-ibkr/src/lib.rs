#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/quantfeed/feed/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Interactive Brokers gateway data provider.
//!
//! [`IbkrProvider`] serves quotes, historical bars, contract details, market
//! scans, and news content over one stateful gateway session, pacing every
//! request through the session [`RateLimiter`] and correlating responses via
//! the [`RequestCorrelator`].
//!
//! Quotes are derived from a one-day, one-minute historical request rather
//! than a live tick subscription; the latest bar carries the price and the
//! bar before it the reference close for the percent change.

/// Gateway session lifecycle and inbound dispatch.
pub mod connection;
/// Request/response correlation.
pub mod correlator;
/// Contract construction and parameter mapping.
mod contracts;
/// Protocol messages and request kinds.
pub mod protocol;
/// Multi-tier sliding-window rate limiting.
pub mod ratelimit;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use polars::prelude::DataFrame;
use tracing::{debug, warn};

use feed_core::{
    AssetClass, ContractDetails, FeedError, MarketDataAdapter, OhlcvBar, QuoteRecord, Result,
    ScannerRow, Symbol, Timeframe, ohlcv_frame,
};

pub use connection::{
    ConnectionState, GatewayConfig, GatewayConnection, GatewayTransport, TransportLink,
};
pub use correlator::{PendingTicket, RequestCorrelator};
pub use protocol::{GatewayMessage, GatewayRequest, RequestKind, ResponseBody};
pub use ratelimit::{Fingerprint, RateLimiter};

use protocol::{ContractSpec, ScannerSpec};

/// Interactive Brokers gateway data provider.
///
/// One provider owns one gateway session; concurrent logical requests share
/// it with independent correlation ids.
#[derive(Debug)]
pub struct IbkrProvider {
    connection: GatewayConnection,
    rate_limiter: RateLimiter,
    correlator: Arc<RequestCorrelator>,
}

const SUPPORTED_CLASSES: &[AssetClass] =
    &[AssetClass::Equity, AssetClass::Forex, AssetClass::Crypto];

impl IbkrProvider {
    /// Creates a provider talking to TWS or IB Gateway at `host:port`
    /// through the given transport, with default session tunables.
    #[must_use]
    pub fn new(host: &str, port: u16, transport: Arc<dyn GatewayTransport>) -> Self {
        Self::with_config(host, port, transport, GatewayConfig::default())
    }

    /// Creates a provider with explicit session tunables.
    #[must_use]
    pub fn with_config(
        host: &str,
        port: u16,
        transport: Arc<dyn GatewayTransport>,
        config: GatewayConfig,
    ) -> Self {
        let correlator = Arc::new(RequestCorrelator::new());
        Self {
            connection: GatewayConnection::new(
                host,
                port,
                transport,
                config,
                Arc::clone(&correlator),
            ),
            rate_limiter: RateLimiter::new(),
            correlator,
        }
    }

    /// Opens the gateway session. See [`GatewayConnection::connect`].
    pub async fn connect(&self, timeout: Duration) -> Result<bool> {
        self.connection.connect(timeout).await
    }

    /// Tears down the gateway session. Idempotent.
    pub async fn disconnect(&self) {
        self.connection.disconnect().await;
    }

    /// Whether the gateway session is ready.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    /// Rate-limit primitive; suspends until the request may be sent.
    ///
    /// Normally used internally, exposed for callers pacing their own
    /// request batches against the same session.
    pub async fn acquire(&self, kind: RequestKind, params: &[(&str, &str)]) {
        self.rate_limiter.acquire(kind, params).await;
    }

    /// How often a session was promoted to ready without handshake
    /// confirmation.
    #[must_use]
    pub fn unconfirmed_promotions(&self) -> u64 {
        self.connection.unconfirmed_promotions()
    }

    /// Fetches a historical bar series.
    ///
    /// Returns `Ok(None)` when the gateway has no data for the contract or
    /// the request timed out (timeouts are absorbed here; the fallback layer
    /// decides what to try next).
    pub async fn get_historical_data(
        &self,
        symbol: &Symbol,
        timeframe: Timeframe,
        limit: usize,
        asset_class: AssetClass,
        exchange: Option<&str>,
        currency: Option<&str>,
    ) -> Result<Option<DataFrame>> {
        let limit_str = limit.to_string();
        self.rate_limiter
            .acquire(
                RequestKind::Historical,
                &[
                    ("symbol", symbol.as_str()),
                    ("timeframe", timeframe.as_str()),
                    ("limit", limit_str.as_str()),
                    ("class", asset_class.as_str()),
                ],
            )
            .await;

        let contract = contracts::contract_for(symbol, asset_class, exchange, currency)?;
        let duration = contracts::duration_for(timeframe, limit);
        let bar_size = contracts::bar_size_for(timeframe);

        let mut bars = self.request_series(&contract, &duration, bar_size).await?;
        if bars.is_empty() {
            debug!(symbol = %symbol, "gateway returned no bars");
            return Ok(None);
        }
        if bars.len() > limit {
            bars.drain(..bars.len() - limit);
        }
        ohlcv_frame(symbol, &bars).map(Some)
    }

    /// Derives a quote from the most recent minute bars of the last session.
    ///
    /// Avoids live market data subscriptions entirely.
    pub async fn get_quote(
        &self,
        symbol: &Symbol,
        asset_class: AssetClass,
        exchange: Option<&str>,
    ) -> Result<Option<QuoteRecord>> {
        self.rate_limiter
            .acquire(
                RequestKind::Historical,
                &[
                    ("symbol", symbol.as_str()),
                    ("duration", "1 D"),
                    ("bar_size", "1 min"),
                ],
            )
            .await;

        let contract = contracts::contract_for(symbol, asset_class, exchange, None)?;
        let bars = self.request_series(&contract, "1 D", "1 min").await?;

        let Some(last) = bars.last() else {
            debug!(symbol = %symbol, "no bars available to derive a quote");
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
            currency: Some(contract.currency.clone()),
            asset_class,
            source: self.name().to_string(),
            timestamp: Utc::now(),
        }))
    }

    /// Resolves contract reference data for a symbol.
    pub async fn get_contract_details(
        &self,
        symbol: &Symbol,
        asset_class: AssetClass,
        exchange: Option<&str>,
    ) -> Result<Option<ContractDetails>> {
        self.rate_limiter
            .acquire(
                RequestKind::ContractDetails,
                &[("symbol", symbol.as_str()), ("class", asset_class.as_str())],
            )
            .await;

        let contract = contracts::contract_for(symbol, asset_class, exchange, None)?;
        self.ensure_connected()?;

        let ticket = self.correlator.register(RequestKind::ContractDetails);
        self.connection
            .send(GatewayRequest::ContractDetails {
                request_id: ticket.request_id(),
                contract,
            })
            .await?;

        match self.correlator.await_response(ticket).await {
            Ok(ResponseBody::Contract(details)) => Ok(Some(details)),
            Ok(other) => Err(FeedError::Parse(format!(
                "unexpected contract details response: {other:?}"
            ))),
            Err(FeedError::RequestTimeout { request_id, .. }) => {
                warn!(request_id, symbol = %symbol, "contract details request timed out");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Runs a market scanner and returns its ranked rows.
    ///
    /// The subscription is cancelled as soon as results (or a timeout)
    /// arrive; scans are one-shot here, not continuous.
    pub async fn scan_market(
        &self,
        scan_code: &str,
        instrument: &str,
        location_code: &str,
        number_of_rows: usize,
    ) -> Result<Vec<ScannerRow>> {
        let rows_str = number_of_rows.to_string();
        self.rate_limiter
            .acquire(
                RequestKind::Scanner,
                &[
                    ("scan_code", scan_code),
                    ("instrument", instrument),
                    ("location", location_code),
                    ("rows", rows_str.as_str()),
                ],
            )
            .await;

        self.ensure_connected()?;

        let ticket = self.correlator.register(RequestKind::Scanner);
        let request_id = ticket.request_id();
        self.connection
            .send(GatewayRequest::Scanner {
                request_id,
                scan: ScannerSpec {
                    scan_code: scan_code.to_uppercase(),
                    instrument: instrument.to_string(),
                    location_code: location_code.to_string(),
                    number_of_rows,
                },
            })
            .await?;

        let outcome = self.correlator.await_response(ticket).await;
        let _ = self
            .connection
            .send(GatewayRequest::CancelScanner { request_id })
            .await;

        match outcome {
            Ok(ResponseBody::ScannerRows(rows)) => Ok(rows),
            Ok(other) => Err(FeedError::Parse(format!(
                "unexpected scanner response: {other:?}"
            ))),
            Err(FeedError::RequestTimeout { .. }) => {
                warn!(scan_code, "scanner request timed out");
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }

    /// Hot US stocks by volume.
    pub async fn hot_by_volume(&self, rows: usize) -> Result<Vec<ScannerRow>> {
        self.scan_market("HOT_BY_VOLUME", "STK", "STK.US.MAJOR", rows).await
    }

    /// Top percentage gainers.
    pub async fn top_gainers(&self, rows: usize) -> Result<Vec<ScannerRow>> {
        self.scan_market("TOP_PERC_GAIN", "STK", "STK.US.MAJOR", rows).await
    }

    /// Top percentage losers.
    pub async fn top_losers(&self, rows: usize) -> Result<Vec<ScannerRow>> {
        self.scan_market("TOP_PERC_LOSE", "STK", "STK.US.MAJOR", rows).await
    }

    /// Most active stocks by volume.
    pub async fn most_active(&self, rows: usize) -> Result<Vec<ScannerRow>> {
        self.scan_market("MOST_ACTIVE", "STK", "STK.US.MAJOR", rows).await
    }

    /// Fetches the body of a news article by provider article id.
    pub async fn get_news_article(&self, article_id: &str) -> Result<Option<String>> {
        self.rate_limiter
            .acquire(RequestKind::News, &[("article_id", article_id)])
            .await;

        self.ensure_connected()?;

        let ticket = self.correlator.register(RequestKind::News);
        self.connection
            .send(GatewayRequest::NewsArticle {
                request_id: ticket.request_id(),
                provider_code: "BZ".to_string(),
                article_id: article_id.to_string(),
            })
            .await?;

        match self.correlator.await_response(ticket).await {
            Ok(ResponseBody::News(text)) => Ok(Some(text)),
            Ok(other) => Err(FeedError::Parse(format!(
                "unexpected news response: {other:?}"
            ))),
            Err(FeedError::RequestTimeout { .. }) => {
                warn!(article_id, "news article request timed out");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Issues one rate-limited historical request and collects its bars.
    ///
    /// Timeouts come back as an empty series; every other error propagates.
    async fn request_series(
        &self,
        contract: &ContractSpec,
        duration: &str,
        bar_size: &str,
    ) -> Result<Vec<OhlcvBar>> {
        self.ensure_connected()?;

        let ticket = self.correlator.register(RequestKind::Historical);
        let request_id = ticket.request_id();
        self.connection
            .send(GatewayRequest::Historical {
                request_id,
                contract: contract.clone(),
                duration: duration.to_string(),
                bar_size: bar_size.to_string(),
                what_to_show: contract.what_to_show().to_string(),
                regular_hours_only: true,
            })
            .await?;

        match self.correlator.await_response(ticket).await {
            Ok(ResponseBody::Bars(raw)) => {
                let mut bars = Vec::with_capacity(raw.len());
                for r in &raw {
                    bars.push(contracts::parse_raw_bar(r)?);
                }
                Ok(bars)
            }
            Ok(other) => Err(FeedError::Parse(format!(
                "unexpected historical response: {other:?}"
            ))),
            Err(FeedError::RequestTimeout { request_id, .. }) => {
                warn!(request_id, contract = %contract.symbol, "historical request timed out");
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(FeedError::ConnectionFailure(
                "not connected to gateway".to_string(),
            ))
        }
    }
}

#[async_trait]
impl MarketDataAdapter for IbkrProvider {
    fn name(&self) -> &str {
        "ibkr"
    }

    fn description(&self) -> &str {
        "Interactive Brokers gateway provider - historical and derived quote data \
         for stocks, forex, and crypto via one rate-limited TWS/IB Gateway session"
    }

    fn supported_classes(&self) -> &[AssetClass] {
        SUPPORTED_CLASSES
    }

    async fn quote(
        &self,
        symbol: &Symbol,
        asset_class: AssetClass,
    ) -> Result<Option<QuoteRecord>> {
        self.get_quote(symbol, asset_class, None).await
    }

    async fn historical(
        &self,
        symbol: &Symbol,
        timeframe: Timeframe,
        limit: usize,
        asset_class: AssetClass,
    ) -> Result<Option<DataFrame>> {
        self.get_historical_data(symbol, timeframe, limit, asset_class, None, None)
            .await
    }
}
