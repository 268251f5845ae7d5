//! Provider adapter contract.
//!
//! Every data source participating in fallback implements
//! [`MarketDataAdapter`]. The contract is deliberately narrow: a quote lookup
//! and a historical series fetch, both returning a three-way outcome that the
//! orchestrator matches on as plain values:
//!
//! - `Ok(Some(_))` - the provider produced data
//! - `Ok(None)` - the provider answered but had nothing (advance)
//! - `Err(_)` - the provider failed (advance)

use async_trait::async_trait;
use polars::prelude::DataFrame;
use std::fmt::Debug;

use crate::{
    asset::AssetClass,
    error::Result,
    timeframe::Timeframe,
    types::{QuoteRecord, Symbol},
};

/// The narrow contract a data provider must satisfy to participate in
/// fallback.
///
/// Implementations must not retry internally on empty results; alias retries
/// and provider advancement belong to the orchestrator.
#[async_trait]
pub trait MarketDataAdapter: Send + Sync + Debug {
    /// Returns the name of this provider (e.g., "Yahoo Finance").
    fn name(&self) -> &str;

    /// Returns a description of this provider.
    fn description(&self) -> &str;

    /// Asset classes this provider can serve.
    fn supported_classes(&self) -> &[AssetClass];

    /// Fetches a point-in-time quote for a symbol.
    ///
    /// Returns `Ok(None)` when the provider has no data for the symbol.
    async fn quote(&self, symbol: &Symbol, asset_class: AssetClass)
    -> Result<Option<QuoteRecord>>;

    /// Fetches a historical bar series for a symbol.
    ///
    /// Returns a DataFrame with columns: symbol, timestamp, open, high, low,
    /// close, volume, adjusted_close; or `Ok(None)` when the provider has no
    /// data for the symbol.
    async fn historical(
        &self,
        symbol: &Symbol,
        timeframe: Timeframe,
        limit: usize,
        asset_class: AssetClass,
    ) -> Result<Option<DataFrame>>;
}
