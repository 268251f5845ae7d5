//! Error types for acquisition operations.
//!
//! This module defines [`FeedError`] which covers every failure mode in the
//! acquisition layer. Only [`FeedError::ConnectionFailure`] and
//! [`FeedError::AllSourcesExhausted`] are expected to reach callers of the
//! orchestration layer; the remaining variants are absorbed internally.

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while acquiring market data.
#[derive(Error, Debug)]
pub enum FeedError {
    /// Network-level errors from HTTP providers (DNS, TLS, transport).
    #[error("Network error: {0}")]
    Network(String),

    /// The gateway session could not be established or was torn down.
    #[error("Gateway connection failure: {0}")]
    ConnectionFailure(String),

    /// A correlated request did not resolve before its per-kind deadline.
    #[error("{kind} request {request_id} timed out after {timeout:?}")]
    RequestTimeout {
        /// Label of the request kind that timed out.
        kind: &'static str,
        /// Correlation id of the abandoned request.
        request_id: i64,
        /// Deadline that elapsed.
        timeout: Duration,
    },

    /// A provider attempt failed; the orchestrator advances to the next one.
    #[error("Provider {provider} unavailable: {reason}")]
    ProviderUnavailable {
        /// Name of the failing provider.
        provider: String,
        /// Human-readable failure reason.
        reason: String,
    },

    /// Every configured provider and alias yielded nothing.
    #[error("All data sources exhausted for {0}")]
    AllSourcesExhausted(String),

    /// The upstream requires a market data subscription for this request.
    #[error("Market data subscription required: {0}")]
    SubscriptionRequired(String),

    /// Rate limit exceeded by a provider.
    #[error("Rate limited by {provider}: retry after {retry_after:?}")]
    RateLimited {
        /// The provider that rate limited the request.
        provider: String,
        /// Suggested time to wait before retrying.
        retry_after: Option<Duration>,
    },

    /// Error interacting with the cache.
    #[error("Cache error: {0}")]
    Cache(String),

    /// Error parsing data from a provider.
    #[error("Parse error: {0}")]
    Parse(String),

    /// An invalid parameter was provided.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// The requested operation is not supported by this provider.
    #[error("Not supported: {0}")]
    NotSupported(String),
}

/// Result type alias using [`FeedError`].
pub type Result<T> = std::result::Result<T, FeedError>;
