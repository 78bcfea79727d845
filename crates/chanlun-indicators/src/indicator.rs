//! Core indicator traits and types.

use chanlun_core::Bar;
use serde::{Deserialize, Serialize};

/// Which price to use for indicator calculation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceSource {
    Open,
    High,
    Low,
    #[default]
    Close,
    /// (High + Low) / 2
    HL2,
    /// (High + Low + Close) / 3
    HLC3,
    /// (Open + High + Low + Close) / 4
    OHLC4,
}

impl PriceSource {
    /// Extract the price from a bar based on this source.
    pub fn extract(&self, bar: &Bar) -> f64 {
        match self {
            PriceSource::Open => bar.open,
            PriceSource::High => bar.high,
            PriceSource::Low => bar.low,
            PriceSource::Close => bar.close,
            PriceSource::HL2 => (bar.high + bar.low) / 2.0,
            PriceSource::HLC3 => (bar.high + bar.low + bar.close) / 3.0,
            PriceSource::OHLC4 => (bar.open + bar.high + bar.low + bar.close) / 4.0,
        }
    }
}

/// Trait for streaming indicators.
///
/// Implementations keep only the state needed to produce the next value.
pub trait Indicator {
    /// The configuration type for this indicator.
    type Config: Clone + Default;
    /// The value produced for each bar.
    type Output: Copy;

    /// Create a new indicator with the given configuration.
    fn new(config: Self::Config) -> Self;

    /// Feed the next bar and return the value for it.
    fn update(&mut self, bar: &Bar) -> Self::Output;

    /// Number of bars consumed before the output is fully warmed up.
    fn min_periods(&self) -> usize;
}
