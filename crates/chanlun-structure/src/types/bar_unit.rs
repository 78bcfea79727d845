//! Arena entry for an ingested bar.

use chanlun_core::Bar;
use chanlun_indicators::BarMetrics;

/// One ingested bar with its indicator values and cross-level links.
///
/// Units live in a dense per-timeframe arena; `index` is the position in that
/// arena, so the previous unit is always `index - 1`. `parent` and `children`
/// index into the arenas of the next coarser and next finer timeframes.
#[derive(Debug, Clone, PartialEq)]
pub struct BarUnit {
    pub index: usize,
    pub bar: Bar,
    pub metrics: BarMetrics,
    /// Merged candle that absorbed this bar.
    pub candle: usize,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
}

impl BarUnit {
    pub fn new(index: usize, bar: Bar, metrics: BarMetrics, candle: usize) -> Self {
        Self {
            index,
            bar,
            metrics,
            candle,
            parent: None,
            children: Vec::new(),
        }
    }

    #[inline]
    pub fn timestamp(&self) -> f64 {
        self.bar.timestamp
    }

    #[inline]
    pub fn high(&self) -> f64 {
        self.bar.high
    }

    #[inline]
    pub fn low(&self) -> f64 {
        self.bar.low
    }

    #[inline]
    pub fn prev(&self) -> Option<usize> {
        self.index.checked_sub(1)
    }
}
