//! MACD (Moving Average Convergence Divergence) indicator.

use chanlun_core::Bar;
use serde::{Deserialize, Serialize};

use crate::indicator::{Indicator, PriceSource};

/// MACD indicator configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MacdConfig {
    /// Fast EMA period (default: 12).
    pub fast_period: usize,
    /// Slow EMA period (default: 26).
    pub slow_period: usize,
    /// Signal line EMA period (default: 9).
    pub signal_period: usize,
    /// Price source for calculation.
    pub price_source: PriceSource,
}

impl Default for MacdConfig {
    fn default() -> Self {
        Self {
            fast_period: 12,
            slow_period: 26,
            signal_period: 9,
            price_source: PriceSource::Close,
        }
    }
}

/// MACD value for one bar.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MacdValue {
    /// Fast EMA - slow EMA.
    pub dif: f64,
    /// EMA of `dif`.
    pub dea: f64,
    /// Histogram, `2 * (dif - dea)`.
    pub macd: f64,
}

/// Streaming exponential moving average seeded with the first value.
#[derive(Debug, Clone)]
pub struct Ema {
    period: usize,
    value: Option<f64>,
}

impl Ema {
    pub fn new(period: usize) -> Self {
        Self {
            period: period.max(1),
            value: None,
        }
    }

    /// Feed the next value and return the updated average.
    #[inline]
    pub fn update(&mut self, x: f64) -> f64 {
        let next = match self.value {
            None => x,
            Some(prev) => (2.0 * x + (self.period as f64 - 1.0) * prev) / (self.period as f64 + 1.0),
        };
        self.value = Some(next);
        next
    }

    pub fn value(&self) -> Option<f64> {
        self.value
    }
}

/// MACD indicator.
#[derive(Debug, Clone)]
pub struct Macd {
    config: MacdConfig,
    fast: Ema,
    slow: Ema,
    signal: Ema,
    count: usize,
}

impl Indicator for Macd {
    type Config = MacdConfig;
    type Output = MacdValue;

    fn new(config: Self::Config) -> Self {
        Self {
            fast: Ema::new(config.fast_period),
            slow: Ema::new(config.slow_period),
            signal: Ema::new(config.signal_period),
            config,
            count: 0,
        }
    }

    fn update(&mut self, bar: &Bar) -> MacdValue {
        let price = self.config.price_source.extract(bar);
        self.count += 1;

        if self.count == 1 {
            // Seed every average with the first price so dif and dea start at zero.
            self.fast.update(price);
            self.slow.update(price);
            self.signal.update(0.0);
            return MacdValue::default();
        }

        let dif = self.fast.update(price) - self.slow.update(price);
        let dea = self.signal.update(dif);
        MacdValue {
            dif,
            dea,
            macd: 2.0 * (dif - dea),
        }
    }

    fn min_periods(&self) -> usize {
        // Need slow_period for the first settled dif, then signal_period more for dea
        self.config.slow_period + self.config.signal_period - 1
    }
}

impl Macd {
    /// Get the configuration.
    pub fn config(&self) -> &MacdConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_bars(closes: &[f64]) -> Vec<Bar> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Bar::new(i as f64, close, close + 1.0, close - 1.0, close, 100.0))
            .collect()
    }

    #[test]
    fn test_ema_seeded_with_first_value() {
        let mut ema = Ema::new(3);
        assert_eq!(ema.update(4.0), 4.0);
        // (2 * 8 + 2 * 4) / 4 = 6
        assert!((ema.update(8.0) - 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_macd_first_bar_is_zero() {
        let mut macd = Macd::new(MacdConfig::default());
        let v = macd.update(&make_bars(&[100.0])[0]);
        assert_eq!(v, MacdValue::default());
    }

    #[test]
    fn test_macd_rising_prices_positive() {
        let closes: Vec<f64> = (1..=50).map(|i| 100.0 + i as f64).collect();
        let mut macd = Macd::new(MacdConfig::default());
        let mut last = MacdValue::default();
        for bar in make_bars(&closes) {
            last = macd.update(&bar);
        }

        assert!(last.dif > 0.0);
        assert!(last.dea > 0.0);
        assert!((last.macd - 2.0 * (last.dif - last.dea)).abs() < 1e-12);
    }

    #[test]
    fn test_macd_min_periods() {
        let macd = Macd::new(MacdConfig::default());
        assert_eq!(macd.min_periods(), 34); // 26 + 9 - 1
    }
}
