//! Bar granularity definitions.
//!
//! This module defines [`Timeframe`] for specifying the granularity of
//! requested series. Timeframes parse from and render to the compact notation
//! used throughout the workspace (`"1m"`, `"1h"`, `"1d"`, ...).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::FeedError;

/// Granularity of a requested bar series.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    /// One-minute bars.
    OneMinute,
    /// Five-minute bars.
    FiveMinutes,
    /// Fifteen-minute bars.
    FifteenMinutes,
    /// Thirty-minute bars.
    ThirtyMinutes,
    /// Hourly bars.
    OneHour,
    /// Four-hour bars.
    FourHours,
    /// Daily bars.
    OneDay,
    /// Weekly bars.
    OneWeek,
    /// Monthly bars.
    OneMonth,
}

impl Timeframe {
    /// Returns true for sub-daily granularities.
    #[must_use]
    pub const fn is_intraday(&self) -> bool {
        matches!(
            self,
            Self::OneMinute
                | Self::FiveMinutes
                | Self::FifteenMinutes
                | Self::ThirtyMinutes
                | Self::OneHour
                | Self::FourHours
        )
    }

    /// Approximate bar span in minutes, used for sizing request windows.
    #[must_use]
    pub const fn approx_minutes(&self) -> u64 {
        match self {
            Self::OneMinute => 1,
            Self::FiveMinutes => 5,
            Self::FifteenMinutes => 15,
            Self::ThirtyMinutes => 30,
            Self::OneHour => 60,
            Self::FourHours => 240,
            Self::OneDay => 1_440,
            Self::OneWeek => 10_080,
            Self::OneMonth => 43_200,
        }
    }

    /// Compact notation for this timeframe (`"1m"`, `"1h"`, `"1M"`, ...).
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::OneMinute => "1m",
            Self::FiveMinutes => "5m",
            Self::FifteenMinutes => "15m",
            Self::ThirtyMinutes => "30m",
            Self::OneHour => "1h",
            Self::FourHours => "4h",
            Self::OneDay => "1d",
            Self::OneWeek => "1w",
            Self::OneMonth => "1M",
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = FeedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // "1m" and "1M" are distinct; do not case-fold.
        match s {
            "1m" => Ok(Self::OneMinute),
            "5m" => Ok(Self::FiveMinutes),
            "15m" => Ok(Self::FifteenMinutes),
            "30m" => Ok(Self::ThirtyMinutes),
            "1h" => Ok(Self::OneHour),
            "4h" => Ok(Self::FourHours),
            "1d" => Ok(Self::OneDay),
            "1w" => Ok(Self::OneWeek),
            "1M" => Ok(Self::OneMonth),
            other => Err(FeedError::InvalidParameter(format!(
                "Unknown timeframe: {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_roundtrip() {
        for tf in [
            Timeframe::OneMinute,
            Timeframe::OneHour,
            Timeframe::OneDay,
            Timeframe::OneMonth,
        ] {
            assert_eq!(tf.as_str().parse::<Timeframe>().unwrap(), tf);
        }
    }

    #[test]
    fn minute_and_month_are_distinct() {
        assert_eq!("1m".parse::<Timeframe>().unwrap(), Timeframe::OneMinute);
        assert_eq!("1M".parse::<Timeframe>().unwrap(), Timeframe::OneMonth);
    }

    #[test]
    fn unknown_timeframe_is_rejected() {
        assert!("2h".parse::<Timeframe>().is_err());
    }

    #[test]
    fn intraday_split() {
        assert!(Timeframe::FourHours.is_intraday());
        assert!(!Timeframe::OneDay.is_intraday());
    }
}
