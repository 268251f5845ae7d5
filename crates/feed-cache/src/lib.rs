#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/quantfeed/feed/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Caching backends for the market data acquisition layer.
//!
//! This crate provides implementations of the [`SeriesCache`] trait from
//! `feed-core`:
//!
//! - [`DiskCache`] - Persistent file-per-key cache with advisory locking
//! - [`InMemoryCache`] - Simple in-memory cache for testing
//! - [`NoopCache`] - No-op cache that doesn't store anything

/// Disk-backed cache implementation.
pub mod disk;
/// In-memory cache implementation.
pub mod memory;
/// No-op cache implementation.
pub mod noop;

// Re-export the trait for convenience
pub use feed_core::SeriesCache;

// Re-export implementations
pub use disk::DiskCache;
pub use memory::InMemoryCache;
pub use noop::NoopCache;
