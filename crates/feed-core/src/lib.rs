#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/quantfeed/feed/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Core traits and types for the market data acquisition layer.
//!
//! This crate provides the foundational abstractions shared by the provider,
//! cache, and orchestration crates:
//!
//! - [`MarketDataAdapter`](provider::MarketDataAdapter) - Provider contract
//! - [`SeriesCache`](cache::SeriesCache) - Caching abstraction
//! - [`AliasSource`](alias::AliasSource) - Symbol alias lookup contract
//! - [`AssetClass`](asset::AssetClass) - Instrument classification
//! - [`Timeframe`](timeframe::Timeframe) - Bar granularity

/// Symbol alias lookup contract and a static table implementation.
pub mod alias;
/// Asset class classification.
pub mod asset;
/// Cache trait and cache keys for fetched series.
pub mod cache;
/// Error types for acquisition operations.
pub mod error;
/// Provider adapter contract.
pub mod provider;
/// Bar granularity definitions.
pub mod timeframe;
/// Core data types (Symbol, bars, quotes, etc.).
pub mod types;

// Re-export commonly used items at crate root
pub use alias::{AliasSource, StaticAliasTable};
pub use asset::AssetClass;
pub use cache::{SeriesCache, SeriesKey};
pub use error::{FeedError, Result};
pub use provider::MarketDataAdapter;
pub use timeframe::Timeframe;
pub use types::{ContractDetails, OhlcvBar, QuoteRecord, ScannerRow, Symbol, ohlcv_frame};
