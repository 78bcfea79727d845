//! Timeframe types and bar aggregation.

use std::fmt;
use std::str::FromStr;

use crate::bar::{Bar, SECONDS_PER_DAY};

/// Timeframe enumeration for the supported bar periods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Timeframe {
    Min1,     // 1 minute
    Min3,     // 3 minutes
    Min5,     // 5 minutes
    Min15,    // 15 minutes
    Min30,    // 30 minutes
    Min60,    // 60 minutes
    Day1,     // 1 day
    Week1,    // 1 week
    Month1,   // 1 month
    Quarter1, // 1 quarter
    Year1,    // 1 year
}

impl Timeframe {
    /// Returns the nominal duration of this timeframe in seconds.
    pub fn seconds(&self) -> f64 {
        match self {
            Timeframe::Min1 => 60.0,
            Timeframe::Min3 => 60.0 * 3.0,
            Timeframe::Min5 => 60.0 * 5.0,
            Timeframe::Min15 => 60.0 * 15.0,
            Timeframe::Min30 => 60.0 * 30.0,
            Timeframe::Min60 => 60.0 * 60.0,
            Timeframe::Day1 => SECONDS_PER_DAY,
            Timeframe::Week1 => SECONDS_PER_DAY * 7.0,
            Timeframe::Month1 => SECONDS_PER_DAY * 30.0,
            Timeframe::Quarter1 => SECONDS_PER_DAY * 91.0,
            Timeframe::Year1 => SECONDS_PER_DAY * 365.0,
        }
    }

    /// Returns a short label for this timeframe.
    pub fn label(&self) -> &'static str {
        match self {
            Timeframe::Min1 => "1m",
            Timeframe::Min3 => "3m",
            Timeframe::Min5 => "5m",
            Timeframe::Min15 => "15m",
            Timeframe::Min30 => "30m",
            Timeframe::Min60 => "60m",
            Timeframe::Day1 => "1d",
            Timeframe::Week1 => "1w",
            Timeframe::Month1 => "1M",
            Timeframe::Quarter1 => "1Q",
            Timeframe::Year1 => "1y",
        }
    }

    /// Whether bars of this timeframe fall within a single calendar day.
    ///
    /// Parent/child date consistency is only checked between two such timeframes.
    pub fn is_day_or_finer(&self) -> bool {
        *self <= Timeframe::Day1
    }

    /// Returns all available timeframes from finest to coarsest.
    pub fn all() -> &'static [Timeframe] {
        &[
            Timeframe::Min1,
            Timeframe::Min3,
            Timeframe::Min5,
            Timeframe::Min15,
            Timeframe::Min30,
            Timeframe::Min60,
            Timeframe::Day1,
            Timeframe::Week1,
            Timeframe::Month1,
            Timeframe::Quarter1,
            Timeframe::Year1,
        ]
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Error returned when a timeframe label is not recognized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseTimeframeError(pub String);

impl fmt::Display for ParseTimeframeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown timeframe label: {}", self.0)
    }
}

impl std::error::Error for ParseTimeframeError {}

impl FromStr for Timeframe {
    type Err = ParseTimeframeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // "1M" (month) and "1m" (minute) differ only by case.
        if let Some(tf) = Timeframe::all().iter().find(|tf| tf.label() == s) {
            return Ok(*tf);
        }
        match s.to_ascii_lowercase().as_str() {
            "1h" | "60min" => Ok(Timeframe::Min60),
            "day" | "d" => Ok(Timeframe::Day1),
            "week" | "w" => Ok(Timeframe::Week1),
            "month" | "mon" => Ok(Timeframe::Month1),
            "quarter" | "1q" => Ok(Timeframe::Quarter1),
            "year" | "1y" => Ok(Timeframe::Year1),
            _ => Err(ParseTimeframeError(s.to_string())),
        }
    }
}

/// Aggregate bars into a coarser timeframe.
///
/// Each aggregated bar is stamped with the timestamp of the last bar in its
/// bucket, so every source bar satisfies `bar.timestamp <= parent.timestamp`.
pub fn aggregate_bars(bars: &[Bar], timeframe: Timeframe) -> Vec<Bar> {
    if bars.is_empty() {
        return Vec::new();
    }

    let interval = timeframe.seconds();
    let mut aggregated = Vec::new();
    let mut current_bucket: Option<Bar> = None;
    let mut current_bucket_start = 0.0;

    for bar in bars {
        // Subtract a hair so a bar stamped exactly on a boundary closes the bucket it ends.
        let bucket_start = ((bar.timestamp - 1e-6) / interval).floor() * interval;

        if let Some(ref mut agg) = current_bucket {
            if bucket_start == current_bucket_start {
                agg.high = agg.high.max(bar.high);
                agg.low = agg.low.min(bar.low);
                agg.close = bar.close;
                agg.volume += bar.volume;
                agg.timestamp = bar.timestamp;
                agg.turnover = match (agg.turnover, bar.turnover) {
                    (Some(a), Some(b)) => Some(a + b),
                    _ => None,
                };
            } else {
                aggregated.push(*agg);
                current_bucket = Some(*bar);
                current_bucket_start = bucket_start;
            }
        } else {
            current_bucket = Some(*bar);
            current_bucket_start = bucket_start;
        }
    }

    if let Some(agg) = current_bucket {
        aggregated.push(agg);
    }

    aggregated
}
