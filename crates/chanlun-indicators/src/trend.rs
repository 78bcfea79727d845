//! Rolling trend metrics over the close price: mean, max and min.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// Which statistic a trend window reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendKind {
    Mean,
    Max,
    Min,
}

impl TrendKind {
    pub fn label(&self) -> &'static str {
        match self {
            TrendKind::Mean => "mean",
            TrendKind::Max => "max",
            TrendKind::Min => "min",
        }
    }
}

/// One configured trend window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrendConfig {
    pub kind: TrendKind,
    pub window: usize,
}

/// Rolling window over closes.
#[derive(Debug, Clone)]
pub struct TrendWindow {
    config: TrendConfig,
    values: VecDeque<f64>,
}

impl TrendWindow {
    pub fn new(config: TrendConfig) -> Self {
        Self {
            values: VecDeque::with_capacity(config.window.max(1)),
            config,
        }
    }

    pub fn config(&self) -> TrendConfig {
        self.config
    }

    /// Push a close and return the statistic over the last `window` closes.
    pub fn update(&mut self, close: f64) -> f64 {
        self.values.push_back(close);
        if self.values.len() > self.config.window.max(1) {
            self.values.pop_front();
        }
        match self.config.kind {
            TrendKind::Mean => self.values.iter().sum::<f64>() / self.values.len() as f64,
            TrendKind::Max => self.values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            TrendKind::Min => self.values.iter().copied().fold(f64::INFINITY, f64::min),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rolling_mean_drops_old_values() {
        let mut w = TrendWindow::new(TrendConfig { kind: TrendKind::Mean, window: 2 });
        w.update(1.0);
        w.update(3.0);
        assert_eq!(w.update(5.0), 4.0);
    }

    #[test]
    fn test_rolling_max_min() {
        let mut max = TrendWindow::new(TrendConfig { kind: TrendKind::Max, window: 3 });
        let mut min = TrendWindow::new(TrendConfig { kind: TrendKind::Min, window: 3 });
        let mut last = (0.0, 0.0);
        for x in [5.0, 1.0, 4.0, 3.0] {
            last = (max.update(x), min.update(x));
        }
        assert_eq!(last, (4.0, 1.0));
    }
}
