//! Bollinger bands.

use std::collections::VecDeque;

use chanlun_core::Bar;
use serde::{Deserialize, Serialize};

use crate::indicator::Indicator;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BollConfig {
    /// Window length (default: 20).
    pub period: usize,
    /// Band width in standard deviations (default: 2).
    pub width: f64,
}

impl Default for BollConfig {
    fn default() -> Self {
        Self { period: 20, width: 2.0 }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BollValue {
    /// Population standard deviation of the window.
    pub theta: f64,
    pub mid: f64,
    pub up: f64,
    pub down: f64,
}

#[derive(Debug, Clone)]
pub struct Boll {
    config: BollConfig,
    window: VecDeque<f64>,
}

impl Indicator for Boll {
    type Config = BollConfig;
    type Output = BollValue;

    fn new(config: Self::Config) -> Self {
        Self {
            window: VecDeque::with_capacity(config.period.max(1)),
            config,
        }
    }

    fn update(&mut self, bar: &Bar) -> BollValue {
        self.window.push_back(bar.close);
        if self.window.len() > self.config.period.max(1) {
            self.window.pop_front();
        }
        let n = self.window.len() as f64;
        let mid = self.window.iter().sum::<f64>() / n;
        let var = self.window.iter().map(|x| (x - mid).powi(2)).sum::<f64>() / n;
        let theta = var.sqrt();
        BollValue {
            theta,
            mid,
            up: mid + self.config.width * theta,
            down: mid - self.config.width * theta,
        }
    }

    fn min_periods(&self) -> usize {
        self.config.period
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flat_prices_collapse_bands() {
        let mut boll = Boll::new(BollConfig::default());
        let mut v = BollValue::default();
        for i in 0..5 {
            v = boll.update(&Bar::new(i as f64, 7.0, 7.0, 7.0, 7.0, 0.0));
        }
        assert_eq!(v.mid, 7.0);
        assert_eq!(v.up, v.down);
    }
}
