//! Divergence metrics computed from the bars under a leg.

use crate::config::DivergenceAlgo;
use crate::types::{BarUnit, Direction};

const EPS: f64 = 1e-7;

/// Price slope between two bars, normalized by the starting extreme and the bar count.
pub fn slope(direction: Direction, begin: &BarUnit, end: &BarUnit) -> f64 {
    let bars = (end.index as f64 - begin.index as f64 + 1.0).max(1.0);
    match direction {
        Direction::Up => (end.high() - begin.low()) / end.high() / bars,
        Direction::Down => (begin.high() - end.low()) / begin.high() / bars,
    }
}

/// Relative price amplitude between two bars.
pub fn amp(direction: Direction, begin: &BarUnit, end: &BarUnit) -> f64 {
    match direction {
        Direction::Up => (end.high() - begin.low()) / begin.low(),
        Direction::Down => (begin.high() - end.low()) / begin.high(),
    }
}

/// Bars under one stroke.
///
/// `span` covers every bar of the stroke's first and last merged candles;
/// `begin`/`end` are the bars holding the two extremes.
pub struct StrokeBars<'a> {
    pub direction: Direction,
    pub span: &'a [BarUnit],
    pub begin: usize,
    pub end: usize,
}

impl StrokeBars<'_> {
    fn find(&self, index: usize) -> Option<&BarUnit> {
        let first = self.span.first()?.index;
        self.span.get(index.checked_sub(first)?)
    }

    fn same_sign(&self, macd: f64) -> bool {
        match self.direction {
            Direction::Up => macd > 0.0,
            Direction::Down => macd < 0.0,
        }
    }

    pub fn metric(&self, algo: DivergenceAlgo, reverse: bool) -> f64 {
        match algo {
            DivergenceAlgo::Area if reverse => self.half_area_reverse(),
            DivergenceAlgo::Area => self.half_area(),
            DivergenceAlgo::Peak => self.peak(),
            DivergenceAlgo::FullArea => self.full_area(),
            DivergenceAlgo::Diff => self.diff(),
            DivergenceAlgo::Slope => match (self.find(self.begin), self.find(self.end)) {
                (Some(b), Some(e)) => slope(self.direction, b, e),
                _ => 0.0,
            },
            DivergenceAlgo::Amp => match (self.find(self.begin), self.find(self.end)) {
                (Some(b), Some(e)) => amp(self.direction, b, e),
                _ => 0.0,
            },
            DivergenceAlgo::Volume => self.trade(|u| Some(u.bar.volume), false),
            DivergenceAlgo::VolumeAvg => self.trade(|u| Some(u.bar.volume), true),
            DivergenceAlgo::Amount => self.trade(|u| u.bar.turnover, false),
            DivergenceAlgo::AmountAvg => self.trade(|u| u.bar.turnover, true),
            DivergenceAlgo::TurnrateAvg => self.trade(|u| u.bar.turnover_rate, true),
            DivergenceAlgo::Rsi => self.rsi(),
        }
    }

    /// Histogram area of the run that shares the sign of the starting bar.
    fn half_area(&self) -> f64 {
        let Some(start) = self.find(self.begin) else {
            return EPS;
        };
        let sign = start.metrics.macd.macd;
        let mut s = EPS;
        for u in self.span.iter().filter(|u| u.index >= self.begin) {
            let macd = u.metrics.macd.macd;
            if macd * sign > 0.0 {
                s += macd.abs();
            } else {
                break;
            }
        }
        s
    }

    /// Histogram area of the run that shares the sign of the ending bar, walking backwards.
    fn half_area_reverse(&self) -> f64 {
        let Some(last) = self.find(self.end) else {
            return EPS;
        };
        let sign = last.metrics.macd.macd;
        let mut s = EPS;
        for u in self.span.iter().rev().filter(|u| u.index <= self.end) {
            let macd = u.metrics.macd.macd;
            if macd * sign > 0.0 {
                s += macd.abs();
            } else {
                break;
            }
        }
        s
    }

    fn peak(&self) -> f64 {
        self.span
            .iter()
            .map(|u| u.metrics.macd.macd)
            .filter(|&m| self.same_sign(m))
            .fold(EPS, |peak, m| peak.max(m.abs()))
    }

    fn full_area(&self) -> f64 {
        self.span
            .iter()
            .filter(|u| u.index >= self.begin && u.index <= self.end)
            .map(|u| u.metrics.macd.macd)
            .filter(|&m| self.same_sign(m))
            .fold(EPS, |s, m| s + m.abs())
    }

    fn diff(&self) -> f64 {
        let (min, max) = self
            .span
            .iter()
            .map(|u| u.metrics.macd.macd)
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), m| (lo.min(m), hi.max(m)));
        if min.is_finite() {
            max - min
        } else {
            0.0
        }
    }

    fn trade(&self, field: impl Fn(&BarUnit) -> Option<f64>, average: bool) -> f64 {
        let mut s = 0.0;
        for u in self.span {
            match field(u) {
                Some(v) => s += v,
                None => return 0.0,
            }
        }
        if average {
            s / (self.end as f64 - self.begin as f64 + 1.0).max(1.0)
        } else {
            s
        }
    }

    fn rsi(&self) -> f64 {
        let values = self.span.iter().map(|u| u.metrics.rsi);
        match self.direction {
            Direction::Down => 10000.0 / (values.fold(f64::INFINITY, f64::min) + EPS),
            Direction::Up => values.fold(f64::NEG_INFINITY, f64::max),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chanlun_core::Bar;
    use chanlun_indicators::{BarMetrics, MacdValue};

    fn make_unit(index: usize, high: f64, low: f64, macd: f64) -> BarUnit {
        let metrics = BarMetrics {
            macd: MacdValue { dif: 0.0, dea: 0.0, macd },
            rsi: 40.0 + index as f64,
            ..Default::default()
        };
        BarUnit::new(index, Bar::new(index as f64, low, high, low, high, 10.0), metrics, index)
    }

    fn up_stroke(macd: &[f64]) -> Vec<BarUnit> {
        macd.iter()
            .enumerate()
            .map(|(i, &m)| make_unit(i, 10.0 + i as f64, 9.0 + i as f64, m))
            .collect()
    }

    #[test]
    fn test_peak_and_areas() {
        let units = up_stroke(&[-1.0, 0.5, 2.0, 1.0, -0.5]);
        let bars = StrokeBars { direction: Direction::Up, span: &units, begin: 0, end: 4 };
        assert!((bars.metric(DivergenceAlgo::Peak, false) - 2.0).abs() < 1e-6);
        assert!((bars.metric(DivergenceAlgo::FullArea, false) - 3.5).abs() < 1e-6);
        // starting bar is negative, so the run is just that bar
        assert!((bars.metric(DivergenceAlgo::Area, false) - 1.0).abs() < 1e-6);
        assert!((bars.metric(DivergenceAlgo::Area, true) - 0.5).abs() < 1e-6);
        assert!((bars.metric(DivergenceAlgo::Diff, false) - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_price_metrics() {
        let units = up_stroke(&[0.0; 5]);
        let bars = StrokeBars { direction: Direction::Up, span: &units, begin: 0, end: 4 };
        // (14 - 9) / 14 / 5
        assert!((bars.metric(DivergenceAlgo::Slope, false) - 5.0 / 14.0 / 5.0).abs() < 1e-12);
        assert!((bars.metric(DivergenceAlgo::Amp, false) - 5.0 / 9.0).abs() < 1e-12);
        assert_eq!(bars.metric(DivergenceAlgo::Volume, false), 50.0);
        assert_eq!(bars.metric(DivergenceAlgo::VolumeAvg, false), 10.0);
        // no turnover on these bars
        assert_eq!(bars.metric(DivergenceAlgo::Amount, false), 0.0);
        assert_eq!(bars.metric(DivergenceAlgo::Rsi, false), 44.0);
    }

    #[test]
    fn test_empty_macd_floor() {
        let units = up_stroke(&[0.0; 3]);
        let bars = StrokeBars { direction: Direction::Up, span: &units, begin: 0, end: 2 };
        assert!(bars.metric(DivergenceAlgo::Peak, false) > 0.0);
    }
}
