#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/quantfeed/feed/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Unified market data acquisition with multi-provider fallback.
//!
//! This crate re-exports the core types and provider implementations and
//! provides [`MarketFeed`], the composition root that wires providers,
//! aliases, and a cache together.
//!
//! # Example
//!
//! ```rust,ignore
//! use feed::{MarketFeed, Symbol, Timeframe};
//! use feed_cache::DiskCache;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> feed::Result<()> {
//!     let cache = Arc::new(DiskCache::new("./cache", Duration::from_secs(60))?);
//!     let feed = MarketFeed::new()
//!         .with_cache(cache)
//!         .with_yahoo();
//!
//!     let df = feed
//!         .get_historical(&Symbol::new("AAPL"), Timeframe::OneDay, 100, None)
//!         .await?;
//!     println!("{df:?}");
//!     Ok(())
//! }
//! ```

// Core types and traits
pub use feed_core::*;

// Cache implementations
pub use feed_cache::{DiskCache, InMemoryCache, NoopCache};

// Providers
#[cfg(feature = "binance")]
pub use feed_binance::BinanceProvider;
#[cfg(feature = "finnhub")]
pub use feed_finnhub::FinnhubProvider;
#[cfg(feature = "ibkr")]
pub use feed_ibkr::{GatewayConfig, GatewayTransport, IbkrProvider, RequestKind};
#[cfg(feature = "yahoo")]
pub use feed_yahoo::YahooProvider;

mod orchestrator;
pub use orchestrator::{MarketFeed, ProviderDescriptor};
