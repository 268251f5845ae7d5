//! Gateway protocol vocabulary.
//!
//! Inbound traffic is modeled as the enum-tagged [`GatewayMessage`] stream
//! consumed by the connection's dispatch loop, and outbound traffic as
//! [`GatewayRequest`] values written to the transport. Status codes keep the
//! gateway's own numbering.

use std::time::Duration;

use feed_core::{ContractDetails, ScannerRow};

/// Kinds of rate-limited, correlated gateway requests.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RequestKind {
    /// Any request without a more specific pacing class.
    General,
    /// Historical bar series.
    Historical,
    /// Contract details lookup.
    ContractDetails,
    /// Market scanner subscription.
    Scanner,
    /// News article content.
    News,
}

impl RequestKind {
    /// Stable label used in fingerprints and logs.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::General => "general",
            Self::Historical => "historical",
            Self::ContractDetails => "contract_details",
            Self::Scanner => "scanner",
            Self::News => "news",
        }
    }

    /// How long a caller waits for this kind of response before giving up.
    #[must_use]
    pub const fn response_timeout(&self) -> Duration {
        match self {
            Self::Historical => Duration::from_secs(30),
            Self::Scanner => Duration::from_secs(15),
            Self::News => Duration::from_secs(15),
            Self::General | Self::ContractDetails => Duration::from_secs(10),
        }
    }
}

/// Security types understood by the gateway.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SecurityType {
    /// Listed stock.
    Stock,
    /// Currency pair.
    Cash,
    /// Crypto pair.
    Crypto,
}

impl SecurityType {
    /// Gateway wire label for this security type.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Stock => "STK",
            Self::Cash => "CASH",
            Self::Crypto => "CRYPTO",
        }
    }
}

/// Contract specification attached to gateway requests.
#[derive(Clone, Debug, PartialEq)]
pub struct ContractSpec {
    /// Gateway-side symbol spelling.
    pub symbol: String,
    /// Security type.
    pub security_type: SecurityType,
    /// Destination exchange.
    pub exchange: String,
    /// Trading currency.
    pub currency: String,
}

impl ContractSpec {
    /// Which bar source the gateway should serve for this contract.
    ///
    /// Currency pairs have no trade tape; they use midpoint bars.
    #[must_use]
    pub const fn what_to_show(&self) -> &'static str {
        match self.security_type {
            SecurityType::Cash => "MIDPOINT",
            _ => "TRADES",
        }
    }
}

/// Market scanner subscription parameters.
#[derive(Clone, Debug, PartialEq)]
pub struct ScannerSpec {
    /// Scan code, e.g. `HOT_BY_VOLUME`.
    pub scan_code: String,
    /// Instrument filter, e.g. `STK`.
    pub instrument: String,
    /// Location filter, e.g. `STK.US.MAJOR`.
    pub location_code: String,
    /// Maximum number of rows to return.
    pub number_of_rows: usize,
}

/// One historical bar exactly as delivered by the gateway.
#[derive(Clone, Debug, PartialEq)]
pub struct RawBar {
    /// Gateway-formatted bar timestamp, possibly with a timezone label.
    pub date: String,
    /// Opening price.
    pub open: f64,
    /// Highest price.
    pub high: f64,
    /// Lowest price.
    pub low: f64,
    /// Closing price.
    pub close: f64,
    /// Bar volume.
    pub volume: f64,
    /// Volume-weighted average price.
    pub wap: f64,
    /// Trade count within the bar.
    pub count: i32,
}

/// Outbound requests written to the transport.
#[derive(Clone, Debug)]
pub enum GatewayRequest {
    /// Request a historical bar series.
    Historical {
        /// Correlation id.
        request_id: i64,
        /// Contract to fetch bars for.
        contract: ContractSpec,
        /// Lookback window, e.g. `"30 D"`.
        duration: String,
        /// Bar granularity, e.g. `"1 hour"`.
        bar_size: String,
        /// Bar source, e.g. `"TRADES"` or `"MIDPOINT"`.
        what_to_show: String,
        /// Restrict to regular trading hours.
        regular_hours_only: bool,
    },
    /// Request contract details.
    ContractDetails {
        /// Correlation id.
        request_id: i64,
        /// Contract to resolve.
        contract: ContractSpec,
    },
    /// Start a market scanner subscription.
    Scanner {
        /// Correlation id.
        request_id: i64,
        /// Scanner parameters.
        scan: ScannerSpec,
    },
    /// Cancel a market scanner subscription.
    CancelScanner {
        /// Correlation id of the subscription to cancel.
        request_id: i64,
    },
    /// Request the body of a news article.
    NewsArticle {
        /// Correlation id.
        request_id: i64,
        /// News provider code, e.g. `"BZ"`.
        provider_code: String,
        /// Provider-assigned article id.
        article_id: String,
    },
}

/// Inbound messages produced by the transport and routed by the dispatch
/// loop.
#[derive(Clone, Debug)]
pub enum GatewayMessage {
    /// Handshake confirmation; the session is fully ready.
    HandshakeAck {
        /// First usable outbound id reported by the gateway.
        next_valid_id: i64,
    },
    /// One historical bar for a pending request.
    Bar {
        /// Correlation id.
        request_id: i64,
        /// The bar.
        bar: RawBar,
    },
    /// End of a historical bar stream.
    SeriesEnd {
        /// Correlation id.
        request_id: i64,
    },
    /// Contract details response.
    ContractInfo {
        /// Correlation id.
        request_id: i64,
        /// Resolved details.
        details: ContractDetails,
    },
    /// One scanner result row.
    ScannerEntry {
        /// Correlation id.
        request_id: i64,
        /// The row.
        row: ScannerRow,
    },
    /// End of a scanner result stream.
    ScannerEnd {
        /// Correlation id.
        request_id: i64,
    },
    /// News article body.
    NewsArticle {
        /// Correlation id.
        request_id: i64,
        /// Article text.
        text: String,
    },
    /// Status/error notice. `request_id` is 0 or negative for
    /// connection-level notices.
    Status {
        /// Correlation id the notice applies to, if any.
        request_id: i64,
        /// Gateway status code.
        code: i32,
        /// Human-readable message.
        message: String,
    },
    /// The gateway closed the connection.
    Closed,
}

/// Fully accumulated response delivered to the caller that issued a request.
#[derive(Clone, Debug)]
pub enum ResponseBody {
    /// Historical bars, in arrival order.
    Bars(Vec<RawBar>),
    /// Scanner rows, in arrival order.
    ScannerRows(Vec<ScannerRow>),
    /// Contract details.
    Contract(ContractDetails),
    /// News article text.
    News(String),
}

/// Client id already in use by another session.
pub const CODE_CLIENT_ID_IN_USE: i32 = 326;

/// Market data subscription required for the requested data.
pub const CODE_SUBSCRIPTION_REQUIRED: i32 = 10089;

/// Connection-loss family; fatal to the session.
pub const FATAL_CONNECTION_CODES: &[i32] = &[502, 504, 1100, 1101, 1102];

/// Market data farm connectivity notices; logged, never state-changing.
pub const INFO_CODES: &[i32] = &[2104, 2107, 2158];

/// Low-value chatter (farm connecting, id not found); logged at debug.
pub const CHATTER_CODES: &[i32] = &[2119, 300];

/// Whether a status code forces the session to `Disconnected`.
#[must_use]
pub fn is_fatal(code: i32) -> bool {
    code == CODE_CLIENT_ID_IN_USE || FATAL_CONNECTION_CODES.contains(&code)
}

/// Whether a status code is a purely informational notice.
#[must_use]
pub fn is_informational(code: i32) -> bool {
    INFO_CODES.contains(&code)
}

/// Whether a status code is debug-level chatter.
#[must_use]
pub fn is_chatter(code: i32) -> bool {
    CHATTER_CODES.contains(&code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_families_are_disjoint() {
        for &code in FATAL_CONNECTION_CODES {
            assert!(is_fatal(code));
            assert!(!is_informational(code));
            assert!(!is_chatter(code));
        }
        assert!(is_fatal(CODE_CLIENT_ID_IN_USE));
        assert!(is_informational(2104));
        assert!(is_chatter(300));
        assert!(!is_fatal(CODE_SUBSCRIPTION_REQUIRED));
    }

    #[test]
    fn forex_contracts_use_midpoint_bars() {
        let cash = ContractSpec {
            symbol: "EUR".into(),
            security_type: SecurityType::Cash,
            exchange: "IDEALPRO".into(),
            currency: "USD".into(),
        };
        assert_eq!(cash.what_to_show(), "MIDPOINT");

        let stock = ContractSpec {
            symbol: "AAPL".into(),
            security_type: SecurityType::Stock,
            exchange: "SMART".into(),
            currency: "USD".into(),
        };
        assert_eq!(stock.what_to_show(), "TRADES");
    }

    #[test]
    fn response_deadlines_per_kind() {
        assert_eq!(
            RequestKind::Historical.response_timeout(),
            Duration::from_secs(30)
        );
        assert_eq!(
            RequestKind::ContractDetails.response_timeout(),
            Duration::from_secs(10)
        );
        assert_eq!(
            RequestKind::Scanner.response_timeout(),
            Duration::from_secs(15)
        );
    }
}
