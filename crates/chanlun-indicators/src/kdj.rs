//! KDJ stochastic oscillator.

use std::collections::VecDeque;

use chanlun_core::Bar;
use serde::{Deserialize, Serialize};

use crate::indicator::Indicator;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KdjConfig {
    /// Look-back for the raw stochastic value (default: 9).
    pub period: usize,
}

impl Default for KdjConfig {
    fn default() -> Self {
        Self { period: 9 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KdjValue {
    pub k: f64,
    pub d: f64,
    pub j: f64,
}

impl Default for KdjValue {
    fn default() -> Self {
        Self { k: 50.0, d: 50.0, j: 50.0 }
    }
}

#[derive(Debug, Clone)]
pub struct Kdj {
    config: KdjConfig,
    window: VecDeque<(f64, f64)>,
    prev: KdjValue,
}

impl Indicator for Kdj {
    type Config = KdjConfig;
    type Output = KdjValue;

    fn new(config: Self::Config) -> Self {
        Self {
            window: VecDeque::with_capacity(config.period.max(1)),
            config,
            prev: KdjValue::default(),
        }
    }

    fn update(&mut self, bar: &Bar) -> KdjValue {
        self.window.push_back((bar.high, bar.low));
        if self.window.len() > self.config.period.max(1) {
            self.window.pop_front();
        }
        let hn = self.window.iter().map(|w| w.0).fold(f64::NEG_INFINITY, f64::max);
        let ln = self.window.iter().map(|w| w.1).fold(f64::INFINITY, f64::min);
        let rsv = if hn != ln { 100.0 * (bar.close - ln) / (hn - ln) } else { 0.0 };

        let k = 2.0 / 3.0 * self.prev.k + rsv / 3.0;
        let d = 2.0 / 3.0 * self.prev.d + k / 3.0;
        self.prev = KdjValue { k, d, j: 3.0 * k - 2.0 * d };
        self.prev
    }

    fn min_periods(&self) -> usize {
        self.config.period
    }
}
