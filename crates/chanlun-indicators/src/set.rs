//! The bundle of indicators computed for every ingested bar.

use chanlun_core::Bar;
use serde::{Deserialize, Serialize};

use crate::boll::{Boll, BollConfig, BollValue};
use crate::indicator::Indicator;
use crate::kdj::{Kdj, KdjConfig, KdjValue};
use crate::macd::{Macd, MacdConfig, MacdValue};
use crate::rsi::{Rsi, RsiConfig};
use crate::trend::{TrendConfig, TrendKind, TrendWindow};

/// Which indicators to attach to bars.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndicatorSetConfig {
    pub macd: MacdConfig,
    pub rsi: RsiConfig,
    pub trend: Vec<TrendConfig>,
    pub boll: Option<BollConfig>,
    pub kdj: Option<KdjConfig>,
}

impl Default for IndicatorSetConfig {
    fn default() -> Self {
        Self {
            macd: MacdConfig::default(),
            rsi: RsiConfig::default(),
            trend: Vec::new(),
            boll: Some(BollConfig::default()),
            kdj: Some(KdjConfig::default()),
        }
    }
}

/// Indicator values attached to one bar.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BarMetrics {
    pub macd: MacdValue,
    pub rsi: f64,
    pub trend: Vec<(TrendConfig, f64)>,
    pub boll: Option<BollValue>,
    pub kdj: Option<KdjValue>,
    /// Every configured indicator has seen enough bars to be warmed up.
    pub settled: bool,
}

impl BarMetrics {
    /// Look up a configured trend value.
    pub fn trend(&self, kind: TrendKind, window: usize) -> Option<f64> {
        self.trend
            .iter()
            .find(|(cfg, _)| cfg.kind == kind && cfg.window == window)
            .map(|(_, v)| *v)
    }

    /// Named values to attach to a signal, empty until settled.
    pub fn features(&self) -> Vec<(String, f64)> {
        if !self.settled {
            return Vec::new();
        }
        let mut out = vec![
            ("macd_dif".to_string(), self.macd.dif),
            ("macd_dea".to_string(), self.macd.dea),
            ("macd".to_string(), self.macd.macd),
            ("rsi".to_string(), self.rsi),
        ];
        if let Some(b) = self.boll {
            out.push(("boll_mid".to_string(), b.mid));
            out.push(("boll_up".to_string(), b.up));
            out.push(("boll_down".to_string(), b.down));
            out.push(("boll_theta".to_string(), b.theta));
        }
        if let Some(k) = self.kdj {
            out.push(("kdj_k".to_string(), k.k));
            out.push(("kdj_d".to_string(), k.d));
            out.push(("kdj_j".to_string(), k.j));
        }
        for (cfg, value) in &self.trend {
            out.push((format!("trend_{}_{}", cfg.kind.label(), cfg.window), *value));
        }
        out
    }
}

/// Streaming state for all configured indicators of one timeframe.
#[derive(Debug, Clone)]
pub struct IndicatorSet {
    macd: Macd,
    rsi: Rsi,
    trend: Vec<TrendWindow>,
    boll: Option<Boll>,
    kdj: Option<Kdj>,
    count: usize,
    warm_up: usize,
}

impl IndicatorSet {
    pub fn new(config: &IndicatorSetConfig) -> Self {
        let macd = Macd::new(config.macd.clone());
        let rsi = Rsi::new(config.rsi.clone());
        let boll = config.boll.clone().map(Boll::new);
        let kdj = config.kdj.clone().map(Kdj::new);
        let warm_up = [macd.min_periods(), rsi.min_periods()]
            .into_iter()
            .chain(boll.as_ref().map(Boll::min_periods))
            .chain(kdj.as_ref().map(Kdj::min_periods))
            .chain(config.trend.iter().map(|t| t.window))
            .max()
            .unwrap_or(0);
        Self {
            macd,
            rsi,
            trend: config.trend.iter().copied().map(TrendWindow::new).collect(),
            boll,
            kdj,
            count: 0,
            warm_up,
        }
    }

    /// Bars needed before the metrics are settled.
    pub fn warm_up(&self) -> usize {
        self.warm_up
    }

    /// Advance every indicator by one bar.
    pub fn update(&mut self, bar: &Bar) -> BarMetrics {
        self.count += 1;
        BarMetrics {
            macd: self.macd.update(bar),
            rsi: self.rsi.update(bar),
            trend: self
                .trend
                .iter_mut()
                .map(|w| (w.config(), w.update(bar.close)))
                .collect(),
            boll: self.boll.as_mut().map(|b| b.update(bar)),
            kdj: self.kdj.as_mut().map(|k| k.update(bar)),
            settled: self.count >= self.warm_up,
        }
    }
}

impl Default for IndicatorSet {
    fn default() -> Self {
        Self::new(&IndicatorSetConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trend_lookup() {
        let config = IndicatorSetConfig {
            trend: vec![TrendConfig { kind: TrendKind::Max, window: 2 }],
            boll: None,
            kdj: None,
            ..Default::default()
        };
        let mut set = IndicatorSet::new(&config);
        set.update(&Bar::new(0.0, 5.0, 5.0, 5.0, 5.0, 0.0));
        let m = set.update(&Bar::new(1.0, 3.0, 3.0, 3.0, 3.0, 0.0));
        assert_eq!(m.trend(TrendKind::Max, 2), Some(5.0));
        assert_eq!(m.trend(TrendKind::Min, 2), None);
        assert!(m.boll.is_none());
    }

    #[test]
    fn test_default_set_has_boll_and_kdj() {
        let mut set = IndicatorSet::default();
        let m = set.update(&Bar::new(0.0, 5.0, 6.0, 4.0, 5.0, 0.0));
        assert!(m.boll.is_some());
        assert!(m.kdj.is_some());
    }

    #[test]
    fn test_features_wait_for_warm_up() {
        let config = IndicatorSetConfig {
            trend: vec![TrendConfig { kind: TrendKind::Mean, window: 40 }],
            ..Default::default()
        };
        let mut set = IndicatorSet::new(&config);
        assert_eq!(set.warm_up(), 40);

        let mut metrics = Vec::new();
        for i in 0..40 {
            let close = 10.0 + (i % 5) as f64;
            metrics.push(set.update(&Bar::new(i as f64, close, close + 1.0, close - 1.0, close, 0.0)));
        }
        assert!(metrics[38].features().is_empty());

        let last = &metrics[39];
        assert!(last.settled);
        let features: std::collections::HashMap<_, _> = last.features().into_iter().collect();
        assert_eq!(features["boll_mid"], last.boll.unwrap().mid);
        assert_eq!(features["kdj_j"], last.kdj.unwrap().j);
        assert_eq!(features["rsi"], last.rsi);
        assert_eq!(features["trend_mean_40"], 12.0);
    }
}
