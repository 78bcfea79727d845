//! Bar validity checks.

use chanlun_core::Bar;

/// Why a bar fails the OHLC ordering rule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BarDefect {
    /// A price is NaN or infinite.
    NonFinite,
    /// `low` is above the smallest of open/high/close.
    LowNotMin { low: f64, min: f64 },
    /// `high` is below the largest of open/low/close.
    HighNotMax { high: f64, max: f64 },
}

impl std::fmt::Display for BarDefect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BarDefect::NonFinite => write!(f, "non-finite price"),
            BarDefect::LowNotMin { low, min } => write!(f, "low={low} is not the minimum ({min})"),
            BarDefect::HighNotMax { high, max } => write!(f, "high={high} is not the maximum ({max})"),
        }
    }
}

/// First defect found in `bar`, if any.
pub fn inspect_bar(bar: &Bar) -> Option<BarDefect> {
    let prices = [bar.open, bar.high, bar.low, bar.close];
    if prices.iter().any(|p| !p.is_finite()) {
        return Some(BarDefect::NonFinite);
    }
    let min = prices.iter().copied().fold(f64::INFINITY, f64::min);
    let max = prices.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if bar.low > min {
        return Some(BarDefect::LowNotMin { low: bar.low, min });
    }
    if bar.high < max {
        return Some(BarDefect::HighNotMax { high: bar.high, max });
    }
    None
}

/// Clamp `low` and `high` to the extremes of the four prices.
pub fn fix_bar(bar: &Bar) -> Bar {
    let prices = [bar.open, bar.high, bar.low, bar.close];
    Bar {
        low: prices.iter().copied().fold(f64::INFINITY, f64::min),
        high: prices.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        ..*bar
    }
}
