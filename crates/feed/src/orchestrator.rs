//! Provider orchestration: classification, priority fallback, alias retry,
//! and cache memoization.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use polars::prelude::DataFrame;
use tracing::{debug, info, warn};

use feed_core::{
    AliasSource, AssetClass, FeedError, MarketDataAdapter, QuoteRecord, Result, SeriesCache,
    SeriesKey, Symbol, Timeframe,
};

/// One registered provider: the adapter plus its routing metadata.
///
/// The per-class provider order is fixed at build time; descriptors are
/// consulted in registration order and never mutated at runtime.
#[derive(Debug, Clone)]
pub struct ProviderDescriptor {
    /// Provider name, unique within one feed.
    pub name: String,
    /// Position in the fallback order (0 = tried first).
    pub rank: usize,
    /// Asset classes this provider serves.
    pub classes: Vec<AssetClass>,
    /// The adapter itself.
    pub adapter: Arc<dyn MarketDataAdapter>,
}

/// Market data acquisition facade with automatic provider fallback.
///
/// A `MarketFeed` classifies each requested symbol, walks the configured
/// providers for that asset class in priority order, retries known symbol
/// aliases against a provider before advancing past it, and memoizes
/// successful historical fetches through the configured cache.
///
/// # Example
///
/// ```rust,ignore
/// use feed::{MarketFeed, Symbol, Timeframe};
///
/// let feed = MarketFeed::new().with_yahoo();
/// let quote = feed.get_quote(&Symbol::new("AAPL"), None).await?;
/// ```
#[derive(Default)]
pub struct MarketFeed {
    providers: Vec<ProviderDescriptor>,
    cache: Option<Arc<dyn SeriesCache>>,
    aliases: Option<Arc<dyn AliasSource>>,
    #[cfg(feature = "ibkr")]
    gateway: Option<Arc<feed_ibkr::IbkrProvider>>,
}

impl std::fmt::Debug for MarketFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarketFeed")
            .field(
                "providers",
                &self
                    .providers
                    .iter()
                    .map(|p| p.name.as_str())
                    .collect::<Vec<_>>(),
            )
            .field("cache", &self.cache.as_ref().map(|_| "configured"))
            .field("aliases", &self.aliases.as_ref().map(|_| "configured"))
            .finish()
    }
}

impl MarketFeed {
    /// Create an empty feed with no providers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the series cache.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<dyn SeriesCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Set the symbol alias source consulted before advancing past a
    /// provider.
    #[must_use]
    pub fn with_aliases(mut self, aliases: Arc<dyn AliasSource>) -> Self {
        self.aliases = Some(aliases);
        self
    }

    /// Register a provider at the next fallback rank.
    pub fn register(&mut self, adapter: Arc<dyn MarketDataAdapter>) {
        debug!(provider = adapter.name(), "Registering provider");
        self.providers.push(ProviderDescriptor {
            name: adapter.name().to_string(),
            rank: self.providers.len(),
            classes: adapter.supported_classes().to_vec(),
            adapter,
        });
    }

    /// Register a provider, builder style.
    #[must_use]
    pub fn with_provider(mut self, adapter: Arc<dyn MarketDataAdapter>) -> Self {
        self.register(adapter);
        self
    }

    // Builder methods for easy setup with specific providers

    /// Add the Interactive Brokers gateway provider and keep a handle to it
    /// for session management.
    #[cfg(feature = "ibkr")]
    #[must_use]
    pub fn with_gateway(mut self, gateway: Arc<feed_ibkr::IbkrProvider>) -> Self {
        self.register(Arc::clone(&gateway) as Arc<dyn MarketDataAdapter>);
        self.gateway = Some(gateway);
        self
    }

    /// Add the Yahoo Finance provider.
    #[cfg(feature = "yahoo")]
    #[must_use]
    pub fn with_yahoo(mut self) -> Self {
        self.register(Arc::new(feed_yahoo::YahooProvider::new()));
        self
    }

    /// Add the Finnhub provider.
    #[cfg(feature = "finnhub")]
    #[must_use]
    pub fn with_finnhub(mut self, api_key: &str) -> Self {
        self.register(Arc::new(feed_finnhub::FinnhubProvider::new(api_key)));
        self
    }

    /// Add the Binance public-API crypto provider.
    #[cfg(feature = "binance")]
    #[must_use]
    pub fn with_binance(mut self) -> Self {
        self.register(Arc::new(feed_binance::BinanceProvider::new()));
        self
    }

    /// Open the gateway session, if a gateway is configured.
    ///
    /// Returns `Ok(false)` when no gateway was registered.
    #[cfg(feature = "ibkr")]
    pub async fn connect(&self, timeout: std::time::Duration) -> Result<bool> {
        match &self.gateway {
            Some(gateway) => gateway.connect(timeout).await,
            None => Ok(false),
        }
    }

    /// Tear down the gateway session, if one is configured. Idempotent.
    #[cfg(feature = "ibkr")]
    pub async fn disconnect(&self) {
        if let Some(gateway) = &self.gateway {
            gateway.disconnect().await;
        }
    }

    /// Whether the gateway session is ready.
    #[cfg(feature = "ibkr")]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.gateway.as_ref().is_some_and(|g| g.is_connected())
    }

    /// Fetch a quote, trying providers for the symbol's asset class in
    /// priority order until one produces data.
    ///
    /// With no explicit `asset_class` the symbol is classified by spelling.
    /// Exhausting every provider and alias yields
    /// [`FeedError::AllSourcesExhausted`].
    pub async fn get_quote(
        &self,
        symbol: &Symbol,
        asset_class: Option<AssetClass>,
    ) -> Result<QuoteRecord> {
        let class = asset_class.unwrap_or_else(|| AssetClass::classify(symbol));
        let candidates = self.candidates_for(symbol);
        let mut exhausted: HashSet<&str> = HashSet::new();

        for descriptor in self.providers_for(class) {
            if !exhausted.insert(descriptor.name.as_str()) {
                continue;
            }

            for candidate in &candidates {
                match descriptor.adapter.quote(candidate, class).await {
                    Ok(Some(mut quote)) => {
                        info!(
                            provider = %descriptor.name,
                            symbol = %candidate,
                            "quote fetched"
                        );
                        // Report under the logical symbol even when an alias
                        // spelling produced the data.
                        quote.symbol = symbol.clone();
                        return Ok(quote);
                    }
                    Ok(None) => {
                        debug!(provider = %descriptor.name, symbol = %candidate, "no quote data");
                    }
                    Err(e) => {
                        warn!(
                            provider = %descriptor.name,
                            symbol = %candidate,
                            error = %e,
                            "provider failed, trying next"
                        );
                    }
                }
            }
        }

        Err(FeedError::AllSourcesExhausted(symbol.to_string()))
    }

    /// Fetch a historical series, consulting the cache first and trying
    /// providers in priority order on a miss.
    ///
    /// Successful fetches are written back to the cache. Exhausting every
    /// provider and alias yields [`FeedError::AllSourcesExhausted`].
    pub async fn get_historical(
        &self,
        symbol: &Symbol,
        timeframe: Timeframe,
        limit: usize,
        asset_class: Option<AssetClass>,
    ) -> Result<DataFrame> {
        let class = asset_class.unwrap_or_else(|| AssetClass::classify(symbol));
        let key = SeriesKey::new(symbol.clone(), timeframe, limit);

        if let Some(cache) = &self.cache {
            match cache.get(&key).await {
                Ok(Some(df)) => {
                    debug!(key = %key, "cache hit for historical series");
                    return Ok(df);
                }
                Ok(None) => {}
                Err(e) => warn!(key = %key, error = %e, "cache read failed, fetching live"),
            }
        }

        let candidates = self.candidates_for(symbol);
        let mut exhausted: HashSet<&str> = HashSet::new();

        for descriptor in self.providers_for(class) {
            if !exhausted.insert(descriptor.name.as_str()) {
                continue;
            }

            for candidate in &candidates {
                match descriptor
                    .adapter
                    .historical(candidate, timeframe, limit, class)
                    .await
                {
                    Ok(Some(df)) if df.height() > 0 => {
                        info!(
                            provider = %descriptor.name,
                            symbol = %candidate,
                            rows = df.height(),
                            "historical series fetched"
                        );
                        if let Some(cache) = &self.cache {
                            if let Err(e) = cache.put(&key, &df).await {
                                warn!(key = %key, error = %e, "failed to cache series");
                            }
                        }
                        return Ok(df);
                    }
                    Ok(_) => {
                        debug!(provider = %descriptor.name, symbol = %candidate, "no historical data");
                    }
                    Err(e) => {
                        warn!(
                            provider = %descriptor.name,
                            symbol = %candidate,
                            error = %e,
                            "provider failed, trying next"
                        );
                    }
                }
            }
        }

        Err(FeedError::AllSourcesExhausted(symbol.to_string()))
    }

    /// Fetch quotes for several symbols, classifying each independently.
    ///
    /// Symbols with no data from any source are omitted from the mapping
    /// (and logged); callers get real values or nothing, never placeholder
    /// zeros.
    pub async fn get_market_overview(&self, symbols: &[Symbol]) -> HashMap<Symbol, QuoteRecord> {
        let mut overview = HashMap::with_capacity(symbols.len());
        for symbol in symbols {
            match self.get_quote(symbol, None).await {
                Ok(quote) => {
                    overview.insert(symbol.clone(), quote);
                }
                Err(e) => {
                    warn!(symbol = %symbol, error = %e, "no data from any source, omitting from overview");
                }
            }
        }
        overview
    }

    /// The logical symbol plus its alias spellings, in retry priority order.
    fn candidates_for(&self, symbol: &Symbol) -> Vec<Symbol> {
        let mut candidates = vec![symbol.clone()];
        if let Some(aliases) = &self.aliases {
            for alias in aliases.aliases(symbol) {
                if !candidates.contains(&alias) {
                    candidates.push(alias);
                }
            }
        }
        candidates
    }

    fn providers_for(&self, class: AssetClass) -> impl Iterator<Item = &ProviderDescriptor> {
        self.providers
            .iter()
            .filter(move |p| p.classes.contains(&class))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use feed_cache::InMemoryCache;
    use feed_core::{OhlcvBar, StaticAliasTable, ohlcv_frame};
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum Behavior {
        Empty,
        Fails,
        Data,
        DataOnlyFor(&'static str),
    }

    #[derive(Debug)]
    struct StubAdapter {
        name: &'static str,
        classes: Vec<AssetClass>,
        behavior: Behavior,
        attempts: Mutex<Vec<String>>,
    }

    impl StubAdapter {
        fn new(name: &'static str, classes: &[AssetClass], behavior: Behavior) -> Arc<Self> {
            Arc::new(Self {
                name,
                classes: classes.to_vec(),
                behavior,
                attempts: Mutex::new(Vec::new()),
            })
        }

        fn equity(name: &'static str, behavior: Behavior) -> Arc<Self> {
            Self::new(name, &[AssetClass::Equity], behavior)
        }

        fn attempts(&self) -> Vec<String> {
            self.attempts.lock().unwrap().clone()
        }

        fn serves(&self, symbol: &Symbol) -> bool {
            match self.behavior {
                Behavior::Data => true,
                Behavior::DataOnlyFor(s) => symbol.as_str() == s,
                _ => false,
            }
        }

        fn record(&self, symbol: &Symbol) {
            self.attempts.lock().unwrap().push(symbol.to_string());
        }

        fn sample_quote(&self, symbol: &Symbol, class: AssetClass) -> QuoteRecord {
            QuoteRecord {
                symbol: symbol.clone(),
                price: 123.45,
                open: 120.0,
                high: 125.0,
                low: 119.0,
                volume: 10_000.0,
                change_percent: 1.5,
                currency: None,
                asset_class: class,
                source: self.name.to_string(),
                timestamp: Utc::now(),
            }
        }
    }

    fn sample_frame(symbol: &Symbol) -> DataFrame {
        let bar = OhlcvBar::new(Utc::now(), 100.0, 101.0, 99.0, 100.5, 1_000.0);
        ohlcv_frame(symbol, &[bar]).unwrap()
    }

    #[async_trait]
    impl MarketDataAdapter for StubAdapter {
        fn name(&self) -> &str {
            self.name
        }

        fn description(&self) -> &str {
            "test double"
        }

        fn supported_classes(&self) -> &[AssetClass] {
            &self.classes
        }

        async fn quote(
            &self,
            symbol: &Symbol,
            asset_class: AssetClass,
        ) -> Result<Option<QuoteRecord>> {
            self.record(symbol);
            match self.behavior {
                Behavior::Fails => Err(FeedError::ProviderUnavailable {
                    provider: self.name.to_string(),
                    reason: "stubbed outage".to_string(),
                }),
                _ if self.serves(symbol) => Ok(Some(self.sample_quote(symbol, asset_class))),
                _ => Ok(None),
            }
        }

        async fn historical(
            &self,
            symbol: &Symbol,
            _timeframe: Timeframe,
            _limit: usize,
            _asset_class: AssetClass,
        ) -> Result<Option<DataFrame>> {
            self.record(symbol);
            match self.behavior {
                Behavior::Fails => Err(FeedError::ProviderUnavailable {
                    provider: self.name.to_string(),
                    reason: "stubbed outage".to_string(),
                }),
                _ if self.serves(symbol) => Ok(Some(sample_frame(symbol))),
                _ => Ok(None),
            }
        }
    }

    #[tokio::test]
    async fn first_provider_with_data_wins() {
        let empty = StubAdapter::equity("empty", Behavior::Empty);
        let failing = StubAdapter::equity("failing", Behavior::Fails);
        let serving = StubAdapter::equity("serving", Behavior::Data);

        let feed = MarketFeed::new()
            .with_provider(empty.clone() as Arc<dyn MarketDataAdapter>)
            .with_provider(failing.clone() as Arc<dyn MarketDataAdapter>)
            .with_provider(serving.clone() as Arc<dyn MarketDataAdapter>);

        let df = feed
            .get_historical(&Symbol::new("AAPL"), Timeframe::OneDay, 10, None)
            .await
            .unwrap();

        assert_eq!(df.height(), 1);
        assert_eq!(empty.attempts(), vec!["AAPL"]);
        assert_eq!(failing.attempts(), vec!["AAPL"]);
        assert_eq!(serving.attempts(), vec!["AAPL"]);
    }

    #[tokio::test]
    async fn iteration_stops_at_the_first_success() {
        let serving = StubAdapter::equity("serving", Behavior::Data);
        let untouched = StubAdapter::equity("untouched", Behavior::Data);

        let feed = MarketFeed::new()
            .with_provider(serving.clone() as Arc<dyn MarketDataAdapter>)
            .with_provider(untouched.clone() as Arc<dyn MarketDataAdapter>);

        feed.get_quote(&Symbol::new("AAPL"), None).await.unwrap();
        assert!(untouched.attempts().is_empty());
    }

    #[tokio::test]
    async fn exhaustion_is_a_structured_error_not_a_panic() {
        let feed = MarketFeed::new()
            .with_provider(StubAdapter::equity("a", Behavior::Empty) as Arc<dyn MarketDataAdapter>)
            .with_provider(StubAdapter::equity("b", Behavior::Empty) as Arc<dyn MarketDataAdapter>);

        let err = feed
            .get_historical(&Symbol::new("AAPL"), Timeframe::OneDay, 10, None)
            .await
            .unwrap_err();
        assert!(matches!(err, FeedError::AllSourcesExhausted(s) if s == "AAPL"));

        let err = feed.get_quote(&Symbol::new("AAPL"), None).await.unwrap_err();
        assert!(matches!(err, FeedError::AllSourcesExhausted(_)));
    }

    #[tokio::test]
    async fn aliases_are_retried_in_priority_order_before_advancing() {
        let empty = StubAdapter::equity("empty", Behavior::Empty);
        let aliases = StaticAliasTable::from_rows([
            ("CBA", "CBA.E"),
            ("CBA", "CBAPI"),
            ("CBA", "CBA"),
        ]);

        let feed = MarketFeed::new()
            .with_aliases(Arc::new(aliases))
            .with_provider(empty.clone() as Arc<dyn MarketDataAdapter>);

        let _ = feed.get_quote(&Symbol::new("CBA"), None).await;
        assert_eq!(empty.attempts(), vec!["CBA", "CBAPI", "CBA.E"]);
    }

    #[tokio::test]
    async fn alias_hit_reports_the_logical_symbol() {
        let adapter = StubAdapter::equity("picky", Behavior::DataOnlyFor("CBAPI"));
        let aliases = StaticAliasTable::from_rows([("CBA", "CBAPI")]);

        let feed = MarketFeed::new()
            .with_aliases(Arc::new(aliases))
            .with_provider(adapter as Arc<dyn MarketDataAdapter>);

        let quote = feed.get_quote(&Symbol::new("CBA"), None).await.unwrap();
        assert_eq!(quote.symbol, Symbol::new("CBA"));
    }

    #[tokio::test]
    async fn providers_are_routed_by_asset_class() {
        let equity = StubAdapter::equity("equity", Behavior::Data);
        let crypto = StubAdapter::new("crypto", &[AssetClass::Crypto], Behavior::Data);

        let feed = MarketFeed::new()
            .with_provider(equity.clone() as Arc<dyn MarketDataAdapter>)
            .with_provider(crypto.clone() as Arc<dyn MarketDataAdapter>);

        let quote = feed.get_quote(&Symbol::new("BTCUSDT"), None).await.unwrap();
        assert_eq!(quote.source, "crypto");
        assert!(equity.attempts().is_empty());
    }

    #[tokio::test]
    async fn explicit_asset_class_overrides_classification() {
        let equity = StubAdapter::equity("equity", Behavior::Data);
        let crypto = StubAdapter::new("crypto", &[AssetClass::Crypto], Behavior::Data);

        let feed = MarketFeed::new()
            .with_provider(equity.clone() as Arc<dyn MarketDataAdapter>)
            .with_provider(crypto as Arc<dyn MarketDataAdapter>);

        let quote = feed
            .get_quote(&Symbol::new("BTCUSDT"), Some(AssetClass::Equity))
            .await
            .unwrap();
        assert_eq!(quote.source, "equity");
    }

    #[tokio::test]
    async fn cache_hit_skips_the_providers_entirely() {
        let serving = StubAdapter::equity("serving", Behavior::Data);
        let cache = Arc::new(InMemoryCache::new(Duration::from_secs(60)));

        let symbol = Symbol::new("AAPL");
        let key = SeriesKey::new(symbol.clone(), Timeframe::OneDay, 10);
        cache.put(&key, &sample_frame(&symbol)).await.unwrap();

        let feed = MarketFeed::new()
            .with_cache(cache)
            .with_provider(serving.clone() as Arc<dyn MarketDataAdapter>);

        let df = feed
            .get_historical(&symbol, Timeframe::OneDay, 10, None)
            .await
            .unwrap();
        assert_eq!(df.height(), 1);
        assert!(serving.attempts().is_empty());
    }

    #[tokio::test]
    async fn fetched_series_are_written_back_to_the_cache() {
        let serving = StubAdapter::equity("serving", Behavior::Data);
        let cache = Arc::new(InMemoryCache::new(Duration::from_secs(60)));

        let feed = MarketFeed::new()
            .with_cache(Arc::clone(&cache) as Arc<dyn SeriesCache>)
            .with_provider(serving as Arc<dyn MarketDataAdapter>);

        let symbol = Symbol::new("AAPL");
        feed.get_historical(&symbol, Timeframe::OneDay, 10, None)
            .await
            .unwrap();

        let key = SeriesKey::new(symbol, Timeframe::OneDay, 10);
        assert!(cache.get(&key).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn a_provider_is_not_reentered_within_one_request() {
        let failing = StubAdapter::equity("flaky", Behavior::Fails);

        let mut feed = MarketFeed::new();
        // The same adapter registered twice still gets exactly one attempt.
        feed.register(failing.clone() as Arc<dyn MarketDataAdapter>);
        feed.register(failing.clone() as Arc<dyn MarketDataAdapter>);

        let _ = feed.get_quote(&Symbol::new("AAPL"), None).await;
        assert_eq!(failing.attempts(), vec!["AAPL"]);
    }

    #[tokio::test]
    async fn overview_omits_symbols_with_no_data() {
        let picky = StubAdapter::equity("picky", Behavior::DataOnlyFor("AAPL"));

        let feed = MarketFeed::new().with_provider(picky as Arc<dyn MarketDataAdapter>);

        let symbols = [Symbol::new("AAPL"), Symbol::new("MISSING")];
        let overview = feed.get_market_overview(&symbols).await;

        assert_eq!(overview.len(), 1);
        assert!(overview.contains_key(&Symbol::new("AAPL")));
    }
}
