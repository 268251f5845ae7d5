//! Contract construction and gateway parameter mapping.
//!
//! Exchange-specific settings are resolved from the symbol spelling: a
//! suffix like `.AX` pins the listing exchange and trading currency, forex
//! pairs route to IDEALPRO, crypto pairs to PAXOS. Explicit exchange and
//! currency arguments always win over inferred settings.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};

use feed_core::{AssetClass, FeedError, OhlcvBar, Result, Symbol, Timeframe};

use crate::protocol::{ContractSpec, RawBar, SecurityType};

/// Symbol suffix -> (exchange, currency). Longer suffixes first so `.TO`
/// wins over `.T`.
const EXCHANGE_SUFFIXES: &[(&str, &str, &str)] = &[
    (".AX", "ASX", "AUD"),
    (".SI", "SGX", "SGD"),
    (".HK", "HKEX", "HKD"),
    (".TO", "TSX", "CAD"),
    (".L", "LSE", "GBP"),
    (".T", "TSE", "JPY"),
];

/// Builds the gateway contract for a symbol in a given asset class.
pub(crate) fn contract_for(
    symbol: &Symbol,
    asset_class: AssetClass,
    exchange: Option<&str>,
    currency: Option<&str>,
) -> Result<ContractSpec> {
    match asset_class {
        AssetClass::Forex => {
            let (base, quote) = split_pair(symbol)?;
            Ok(ContractSpec {
                symbol: base,
                security_type: SecurityType::Cash,
                exchange: "IDEALPRO".to_string(),
                currency: currency.map_or(quote, str::to_string),
            })
        }
        AssetClass::Crypto => Ok(ContractSpec {
            symbol: symbol.as_str().to_string(),
            security_type: SecurityType::Crypto,
            exchange: exchange.unwrap_or("PAXOS").to_string(),
            currency: currency.unwrap_or("USD").to_string(),
        }),
        AssetClass::Equity => {
            let mut spec_symbol = symbol.as_str().to_string();
            let mut spec_exchange = "SMART".to_string();
            let mut spec_currency = "USD".to_string();

            for (suffix, exch, curr) in EXCHANGE_SUFFIXES {
                if let Some(stripped) = spec_symbol.strip_suffix(suffix) {
                    spec_symbol = stripped.to_string();
                    spec_exchange = (*exch).to_string();
                    spec_currency = (*curr).to_string();
                    break;
                }
            }

            if let Some(exch) = exchange {
                spec_exchange = exch.to_string();
                // A named exchange implies its home currency unless overridden.
                if let Some((_, _, curr)) =
                    EXCHANGE_SUFFIXES.iter().find(|(_, e, _)| *e == exch)
                {
                    spec_currency = (*curr).to_string();
                }
            }
            if let Some(curr) = currency {
                spec_currency = curr.to_string();
            }

            Ok(ContractSpec {
                symbol: spec_symbol,
                security_type: SecurityType::Stock,
                exchange: spec_exchange,
                currency: spec_currency,
            })
        }
    }
}

/// Splits a forex symbol into base and quote currencies.
fn split_pair(symbol: &Symbol) -> Result<(String, String)> {
    let s = symbol.as_str();
    if let Some((base, quote)) = s.split_once('/') {
        return Ok((base.to_string(), quote.to_string()));
    }
    if s.len() == 6 {
        let (base, quote) = s.split_at(3);
        return Ok((base.to_string(), quote.to_string()));
    }
    Err(FeedError::InvalidParameter(format!(
        "Invalid forex symbol format: {s}"
    )))
}

/// Gateway bar-size string for a timeframe.
pub(crate) const fn bar_size_for(timeframe: Timeframe) -> &'static str {
    match timeframe {
        Timeframe::OneMinute => "1 min",
        Timeframe::FiveMinutes => "5 mins",
        Timeframe::FifteenMinutes => "15 mins",
        Timeframe::ThirtyMinutes => "30 mins",
        Timeframe::OneHour => "1 hour",
        Timeframe::FourHours => "4 hours",
        Timeframe::OneDay => "1 day",
        Timeframe::OneWeek => "1 week",
        Timeframe::OneMonth => "1 month",
    }
}

/// Gateway lookback duration covering `limit` bars of `timeframe`.
pub(crate) fn duration_for(timeframe: Timeframe, limit: usize) -> String {
    let limit = limit.max(1);
    match timeframe {
        Timeframe::OneMinute | Timeframe::FiveMinutes => {
            // A regular session holds ~390 one-minute bars.
            format!("{} D", limit * timeframe.approx_minutes() as usize / 390 + 1)
        }
        Timeframe::FifteenMinutes | Timeframe::ThirtyMinutes | Timeframe::OneHour => {
            format!("{} D", limit / 24 + 1)
        }
        Timeframe::FourHours => format!("{} D", limit / 6 + 1),
        Timeframe::OneDay => format!("{limit} D"),
        Timeframe::OneWeek => format!("{limit} W"),
        Timeframe::OneMonth => format!("{limit} M"),
    }
}

/// Timezone labels the gateway appends to intraday bar timestamps.
const TIMEZONE_LABELS: &[&str] = &[" Hongkong", " Australia/NSW", " US/Eastern"];

/// Parses a gateway bar timestamp, with or without a timezone label, into
/// UTC. Daily bars carry a bare `YYYYMMDD` date.
pub(crate) fn parse_bar_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    let mut s = raw.trim();
    for label in TIMEZONE_LABELS {
        if let Some(stripped) = s.strip_suffix(label) {
            s = stripped.trim_end();
            break;
        }
    }

    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y%m%d %H:%M:%S") {
        return Ok(Utc.from_utc_datetime(&dt));
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y%m%d") {
        let dt = date
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| FeedError::Parse(format!("Invalid bar date: {raw}")))?;
        return Ok(Utc.from_utc_datetime(&dt));
    }
    Err(FeedError::Parse(format!("Unparseable bar timestamp: {raw}")))
}

/// Converts a gateway bar into the shared OHLCV representation.
pub(crate) fn parse_raw_bar(bar: &RawBar) -> Result<OhlcvBar> {
    Ok(OhlcvBar::new(
        parse_bar_timestamp(&bar.date)?,
        bar.open,
        bar.high,
        bar.low,
        bar.close,
        bar.volume,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suffix_resolves_exchange_and_currency() {
        let spec = contract_for(&Symbol::new("BHP.AX"), AssetClass::Equity, None, None).unwrap();
        assert_eq!(spec.symbol, "BHP");
        assert_eq!(spec.exchange, "ASX");
        assert_eq!(spec.currency, "AUD");

        let spec = contract_for(&Symbol::new("RY.TO"), AssetClass::Equity, None, None).unwrap();
        assert_eq!(spec.exchange, "TSX");
        assert_eq!(spec.currency, "CAD");

        let spec = contract_for(&Symbol::new("7203.T"), AssetClass::Equity, None, None).unwrap();
        assert_eq!(spec.exchange, "TSE");
        assert_eq!(spec.currency, "JPY");
    }

    #[test]
    fn plain_equity_defaults_to_smart_usd() {
        let spec = contract_for(&Symbol::new("AAPL"), AssetClass::Equity, None, None).unwrap();
        assert_eq!(spec.symbol, "AAPL");
        assert_eq!(spec.security_type, SecurityType::Stock);
        assert_eq!(spec.exchange, "SMART");
        assert_eq!(spec.currency, "USD");
    }

    #[test]
    fn explicit_exchange_implies_its_currency() {
        let spec =
            contract_for(&Symbol::new("BHP"), AssetClass::Equity, Some("ASX"), None).unwrap();
        assert_eq!(spec.exchange, "ASX");
        assert_eq!(spec.currency, "AUD");

        let spec =
            contract_for(&Symbol::new("BHP"), AssetClass::Equity, Some("ASX"), Some("USD"))
                .unwrap();
        assert_eq!(spec.currency, "USD");
    }

    #[test]
    fn forex_pairs_route_to_idealpro() {
        for raw in ["EURUSD", "EUR/USD"] {
            let spec = contract_for(&Symbol::new(raw), AssetClass::Forex, None, None).unwrap();
            assert_eq!(spec.symbol, "EUR");
            assert_eq!(spec.currency, "USD");
            assert_eq!(spec.exchange, "IDEALPRO");
            assert_eq!(spec.security_type, SecurityType::Cash);
        }
    }

    #[test]
    fn crypto_defaults_to_paxos() {
        let spec = contract_for(&Symbol::new("BTCUSDT"), AssetClass::Crypto, None, None).unwrap();
        assert_eq!(spec.exchange, "PAXOS");
        assert_eq!(spec.security_type, SecurityType::Crypto);
    }

    #[test]
    fn bar_sizes_and_durations() {
        assert_eq!(bar_size_for(Timeframe::OneHour), "1 hour");
        assert_eq!(bar_size_for(Timeframe::OneDay), "1 day");
        assert_eq!(duration_for(Timeframe::OneDay, 30), "30 D");
        assert_eq!(duration_for(Timeframe::OneWeek, 12), "12 W");
        assert_eq!(duration_for(Timeframe::OneHour, 48), "3 D");
    }

    #[test]
    fn bar_timestamps_with_timezone_labels() {
        let ts = parse_bar_timestamp("20240102 14:30:00 US/Eastern").unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2024, 1, 2, 14, 30, 0).unwrap());

        let ts = parse_bar_timestamp("20240102 09:00:00 Hongkong").unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2024, 1, 2, 9, 0, 0).unwrap());
    }

    #[test]
    fn daily_bars_have_bare_dates() {
        let ts = parse_bar_timestamp("20240102").unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap());
    }

    #[test]
    fn garbage_timestamps_are_rejected() {
        assert!(parse_bar_timestamp("January 2nd").is_err());
    }
}
