//! RSI with Wilder's smoothing.

use chanlun_core::Bar;
use serde::{Deserialize, Serialize};

use crate::indicator::Indicator;

/// RSI configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RsiConfig {
    /// Smoothing period (default: 14).
    pub period: usize,
}

impl Default for RsiConfig {
    fn default() -> Self {
        Self { period: 14 }
    }
}

/// Streaming RSI on the 0-100 scale.
#[derive(Debug, Clone)]
pub struct Rsi {
    period: usize,
    avg_gain: f64,
    avg_loss: f64,
    prev_close: Option<f64>,
    changes: usize,
}

impl Indicator for Rsi {
    type Config = RsiConfig;
    type Output = f64;

    fn new(config: Self::Config) -> Self {
        Self {
            period: config.period.max(1),
            avg_gain: 0.0,
            avg_loss: 0.0,
            prev_close: None,
            changes: 0,
        }
    }

    fn update(&mut self, bar: &Bar) -> f64 {
        let close = bar.close;
        let prev = match self.prev_close.replace(close) {
            Some(prev) => prev,
            None => return 50.0, // Neutral
        };

        let change = close - prev;
        let gain = change.max(0.0);
        let loss = (-change).max(0.0);
        let period = self.period as f64;
        self.changes += 1;

        if self.changes <= self.period {
            // Warmup: running sums scaled by the period
            self.avg_gain += gain / period;
            self.avg_loss += loss / period;
        } else {
            self.avg_gain = (self.avg_gain * (period - 1.0) + gain) / period;
            self.avg_loss = (self.avg_loss * (period - 1.0) + loss) / period;
        }

        if self.avg_loss == 0.0 {
            return if self.avg_gain == 0.0 { 50.0 } else { 100.0 };
        }
        let rs = self.avg_gain / self.avg_loss;
        100.0 - 100.0 / (1.0 + rs)
    }

    fn min_periods(&self) -> usize {
        self.period + 1
    }
}
