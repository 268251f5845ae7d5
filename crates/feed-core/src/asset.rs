//! Asset class classification.
//!
//! Symbols are classified as crypto, forex, or equity independently of which
//! provider ends up serving them. The rules mirror the upstream conventions:
//! crypto pairs carry a known quote-currency suffix, forex pairs are two
//! recognized ISO currency codes (six-letter or `BASE/QUOTE` notation), and
//! everything else is treated as an equity.

use serde::{Deserialize, Serialize};

use crate::types::Symbol;

/// Quote-currency suffixes that mark a symbol as a crypto pair.
const CRYPTO_QUOTE_SUFFIXES: &[&str] = &["USDT", "USDC", "BUSD", "BTC", "ETH", "BNB"];

/// Currency codes recognized for forex pair detection.
const CURRENCY_CODES: &[&str] = &[
    "USD", "EUR", "GBP", "JPY", "CHF", "AUD", "CAD", "NZD", "SEK", "NOK", "DKK", "PLN", "CZK",
    "HUF", "TRY", "ZAR", "MXN", "SGD", "HKD", "CNY", "INR", "KRW", "BRL", "RUB",
];

/// Asset class of a tradable instrument.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssetClass {
    /// Listed equities (the default classification).
    #[default]
    Equity,
    /// Currency pairs.
    Forex,
    /// Crypto pairs.
    Crypto,
}

impl AssetClass {
    /// Classifies a symbol by its spelling alone.
    ///
    /// Crypto is checked first (quote-currency suffix), then forex (six
    /// letters forming two currency codes, or explicit `EUR/USD` notation).
    /// Anything else is an equity.
    #[must_use]
    pub fn classify(symbol: &Symbol) -> Self {
        let s = symbol.as_str();

        if CRYPTO_QUOTE_SUFFIXES.iter().any(|suf| s.ends_with(suf)) {
            return Self::Crypto;
        }

        if let Some((base, quote)) = s.split_once('/') {
            if is_currency(base) && is_currency(quote) {
                return Self::Forex;
            }
        } else if s.len() == 6 && s.chars().all(|c| c.is_ascii_alphabetic()) {
            let (base, quote) = s.split_at(3);
            if is_currency(base) && is_currency(quote) {
                return Self::Forex;
            }
        }

        Self::Equity
    }

    /// Short lowercase label for logging and cache paths.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Equity => "equity",
            Self::Forex => "forex",
            Self::Crypto => "crypto",
        }
    }
}

fn is_currency(code: &str) -> bool {
    CURRENCY_CODES.contains(&code)
}

impl std::fmt::Display for AssetClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(s: &str) -> AssetClass {
        AssetClass::classify(&Symbol::new(s))
    }

    #[test]
    fn crypto_suffixes() {
        assert_eq!(classify("BTCUSDT"), AssetClass::Crypto);
        assert_eq!(classify("ETHBTC"), AssetClass::Crypto);
        assert_eq!(classify("SOLBNB"), AssetClass::Crypto);
    }

    #[test]
    fn forex_pairs() {
        assert_eq!(classify("EURUSD"), AssetClass::Forex);
        assert_eq!(classify("eur/usd"), AssetClass::Forex);
        assert_eq!(classify("GBPJPY"), AssetClass::Forex);
    }

    #[test]
    fn six_letter_equities_are_not_forex() {
        // Six letters, but neither half is a currency code.
        assert_eq!(classify("GOOGLE"), AssetClass::Equity);
    }

    #[test]
    fn equities_by_default() {
        assert_eq!(classify("AAPL"), AssetClass::Equity);
        assert_eq!(classify("BHP.AX"), AssetClass::Equity);
        assert_eq!(classify("7203.T"), AssetClass::Equity);
    }

    #[test]
    fn crypto_wins_over_forex_shape() {
        // Ends in a crypto quote suffix even though it is six letters.
        assert_eq!(classify("AUDBNB"), AssetClass::Crypto);
    }
}
