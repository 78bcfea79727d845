//! The full structure of one timeframe.
//!
//! A [`Hierarchy`] owns every arena for its timeframe: bars, merged candles,
//! strokes, segments, segments-of-segments, both pivot lists and both signal
//! lists. Bars go in through [`Hierarchy::add_bar`]; everything above strokes
//! is derived by [`Hierarchy::recompute`].
//!
//! In stepwise mode the structure is recomputed whenever the strokes change,
//! with a provisional stroke reaching the newest candle. In batch mode
//! strokes are built bar by bar but the rest waits for a single
//! `recompute` at the end of the load.
//!
//! All cross references are dense indices, so `clone()` is a complete,
//! independent snapshot.

use chanlun_core::{Bar, Timeframe};
use chanlun_data::{fix_bar, inspect_bar, BarDefect};
use chanlun_indicators::IndicatorSet;
use log::{debug, warn};

use crate::candle::{Absorb, CandleList, MergedCandle};
use crate::config::ChanConfig;
use crate::error::{ChanError, Result};
use crate::leg::BarContext;
use crate::pivot::{Pivot, PivotList};
use crate::segment::{Segment, SegmentList};
use crate::signal::SignalList;
use crate::stroke::{Stroke, StrokeList};
use crate::types::BarUnit;

/// Structural state of one timeframe.
#[derive(Debug, Clone)]
pub struct Hierarchy {
    timeframe: Timeframe,
    step: bool,
    autofix: bool,
    indicators: IndicatorSet,
    bars: Vec<BarUnit>,
    candles: CandleList,
    strokes: StrokeList,
    segments: SegmentList,
    segment_segments: SegmentList,
    pivots: PivotList,
    segment_pivots: PivotList,
    signals: SignalList,
    segment_signals: SignalList,
}

impl Hierarchy {
    pub fn new(timeframe: Timeframe, config: &ChanConfig) -> Self {
        Self {
            timeframe,
            step: config.driver.step,
            autofix: config.driver.autofix,
            indicators: IndicatorSet::new(&config.indicators),
            bars: Vec::new(),
            candles: CandleList::new(),
            strokes: StrokeList::new(config.stroke.clone()),
            segments: SegmentList::new(config.segment),
            segment_segments: SegmentList::new(config.segment),
            pivots: PivotList::new(config.pivot),
            segment_pivots: PivotList::new(config.pivot),
            signals: SignalList::new(config.signal.clone()),
            segment_signals: SignalList::new(config.segment_signal.clone()),
        }
    }

    pub fn timeframe(&self) -> Timeframe {
        self.timeframe
    }

    /// Whether structure is recomputed as bars arrive.
    pub fn is_stepwise(&self) -> bool {
        self.step
    }

    /// Ingest one bar and return its index.
    ///
    /// The bar is validated before anything is touched: an inconsistent bar
    /// is clamped when auto-fix is on and rejected otherwise, and a bar that
    /// is not strictly after the last one is rejected.
    pub fn add_bar(&mut self, bar: Bar) -> Result<usize> {
        let bar = self.validate(bar)?;
        let index = self.bars.len();
        let metrics = self.indicators.update(&bar);
        let absorbed = self.candles.absorb(index, &bar);
        let candle = self.candles.len() - 1;
        self.bars.push(BarUnit::new(index, bar, metrics, candle));

        let ctx = BarContext::new(&self.bars, self.candles.as_slice());
        let changed = match absorbed {
            Absorb::First => false,
            Absorb::Opened => self.strokes.update(&ctx, candle - 1, candle, self.step),
            Absorb::Merged => {
                self.strokes.refresh_tail(&ctx);
                self.step && self.strokes.try_add_virtual(&ctx, candle, true)
            }
        };
        if changed && self.step {
            self.recompute()?;
        }
        Ok(index)
    }

    fn validate(&self, bar: Bar) -> Result<Bar> {
        if let Some(last) = self.bars.last() {
            if bar.timestamp <= last.timestamp() {
                return Err(ChanError::NotMonotonic {
                    timeframe: self.timeframe,
                    last: last.timestamp(),
                    current: bar.timestamp,
                });
            }
        }
        match inspect_bar(&bar) {
            None => Ok(bar),
            Some(defect) if self.autofix && defect != BarDefect::NonFinite => {
                warn!("{} bar at {}: {defect}, clamped", self.timeframe, bar.timestamp);
                Ok(fix_bar(&bar))
            }
            Some(defect) => Err(ChanError::InvalidBar {
                timestamp: bar.timestamp,
                reason: defect.to_string(),
            }),
        }
    }

    /// Rebuild segments, pivots and signals from the current strokes.
    pub fn recompute(&mut self) -> Result<()> {
        let ctx = BarContext::new(&self.bars, self.candles.as_slice());
        if !self.step {
            if let Some(last) = self.candles.len().checked_sub(1) {
                self.strokes.try_add_virtual(&ctx, last, false);
            }
        }

        self.segments.update(self.strokes.legs_mut())?;
        self.pivots.compute(self.strokes.as_slice(), self.segments.as_slice());
        self.pivots.reconcile(self.strokes.as_slice(), self.segments.legs_mut())?;

        self.segment_segments.update(self.segments.legs_mut())?;
        self.segment_pivots
            .compute(self.segments.as_slice(), self.segment_segments.as_slice());
        self.segment_pivots
            .reconcile(self.segments.as_slice(), self.segment_segments.legs_mut())?;

        self.segment_signals.classify(
            self.segments.as_slice(),
            self.segment_segments.as_slice(),
            self.segment_pivots.as_slice(),
            &ctx,
        )?;
        self.signals.classify(
            self.strokes.as_slice(),
            self.segments.as_slice(),
            self.pivots.as_slice(),
            &ctx,
        )?;

        debug!(
            "{}: {} strokes, {} segments, {} pivots, {} signals",
            self.timeframe,
            self.strokes.len(),
            self.segments.len(),
            self.pivots.len(),
            self.signals.len()
        );
        Ok(())
    }

    pub(crate) fn attach_child(&mut self, parent: usize, child: usize) {
        if let Some(unit) = self.bars.get_mut(parent) {
            unit.children.push(child);
        }
    }

    pub(crate) fn set_parent(&mut self, child: usize, parent: usize) {
        if let Some(unit) = self.bars.get_mut(child) {
            unit.parent = Some(parent);
        }
    }

    pub fn bars(&self) -> &[BarUnit] {
        &self.bars
    }

    pub fn last_bar(&self) -> Option<&BarUnit> {
        self.bars.last()
    }

    pub fn candles(&self) -> &[MergedCandle] {
        self.candles.as_slice()
    }

    pub fn strokes(&self) -> &[Stroke] {
        self.strokes.as_slice()
    }

    pub fn segments(&self) -> &[Segment] {
        self.segments.as_slice()
    }

    pub fn segment_segments(&self) -> &[Segment] {
        self.segment_segments.as_slice()
    }

    /// Pivots over strokes.
    pub fn pivots(&self) -> &[Pivot] {
        self.pivots.as_slice()
    }

    /// Pivots over segments.
    pub fn segment_pivots(&self) -> &[Pivot] {
        self.segment_pivots.as_slice()
    }

    pub fn signals(&self) -> &SignalList {
        &self.signals
    }

    pub fn segment_signals(&self) -> &SignalList {
        &self.segment_signals
    }

    /// Read-only view for computing leg metrics.
    pub fn context(&self) -> BarContext<'_> {
        BarContext::new(&self.bars, self.candles.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::leg::Leg;

    fn make_bar(i: usize, price: f64) -> Bar {
        Bar::new(i as f64 * 60.0, price, price + 0.5, price - 0.5, price, 1.0)
    }

    /// One bar per unit move through the given turning points.
    fn zigzag_bars(points: &[f64]) -> Vec<Bar> {
        let mut prices = vec![points[0]];
        for w in points.windows(2) {
            let steps = (w[1] - w[0]).abs().round() as usize;
            let step = (w[1] - w[0]) / steps as f64;
            prices.extend((1..=steps).map(|i| w[0] + step * i as f64));
        }
        prices.iter().enumerate().map(|(i, &p)| make_bar(i, p)).collect()
    }

    fn feed(config: &ChanConfig, bars: &[Bar]) -> Hierarchy {
        let mut h = Hierarchy::new(Timeframe::Min1, config);
        for bar in bars {
            h.add_bar(*bar).unwrap();
        }
        if !config.driver.step {
            h.recompute().unwrap();
        }
        h
    }

    #[test]
    fn test_invalid_bar_leaves_structure_untouched() {
        let mut h = feed(&ChanConfig::default(), &zigzag_bars(&[20.0, 10.0, 22.0]));
        let before = (h.bars().len(), h.candles().to_vec(), h.strokes().to_vec());
        let broken = Bar::new(1e6, 10.0, 9.0, 8.0, 9.5, 1.0);
        let err = h.add_bar(broken).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DataValidity);
        assert_eq!((h.bars().len(), h.candles().to_vec(), h.strokes().to_vec()), before);
    }

    #[test]
    fn test_autofix_clamps() {
        let mut config = ChanConfig::default();
        config.driver.autofix = true;
        let mut h = Hierarchy::new(Timeframe::Day1, &config);
        h.add_bar(Bar::new(0.0, 10.0, 9.0, 8.0, 9.5, 1.0)).unwrap();
        assert_eq!(h.bars()[0].high(), 10.0);
    }

    #[test]
    fn test_timestamps_must_increase() {
        let mut h = Hierarchy::new(Timeframe::Min1, &ChanConfig::default());
        h.add_bar(make_bar(5, 10.0)).unwrap();
        let err = h.add_bar(make_bar(5, 11.0)).unwrap_err();
        assert!(matches!(err, ChanError::NotMonotonic { .. }));
        assert_eq!(h.bars().len(), 1);
    }

    #[test]
    fn test_candles_cover_every_bar_once() {
        let bars = zigzag_bars(&[20.0, 10.0, 22.0, 12.0, 25.0, 14.0]);
        let h = feed(&ChanConfig::default(), &bars);
        let mut next = 0;
        for c in h.candles() {
            assert_eq!(c.first_bar, next);
            next = c.last_bar + 1;
        }
        assert_eq!(next, bars.len());
        assert!(h.bars().iter().all(|u| h.candles()[u.candle].bars().contains(&u.index)));
    }

    #[test]
    fn test_stepwise_recomputes_as_bars_arrive() {
        let mut config = ChanConfig::default();
        config.driver.step = true;
        let h = feed(&config, &zigzag_bars(&[20.0, 10.0, 22.0, 12.0, 25.0]));
        assert!(!h.segments().is_empty());
        assert!(!h.strokes().last().unwrap().is_sure());
    }

    #[test]
    fn test_clone_is_independent() {
        let bars = zigzag_bars(&[20.0, 10.0, 22.0, 12.0, 25.0]);
        let mut h = feed(&ChanConfig::default(), &bars);
        h.attach_child(0, 7);
        let snapshot = h.clone();
        h.add_bar(make_bar(bars.len(), 24.0)).unwrap();
        h.attach_child(0, 8);
        assert_eq!(snapshot.bars().len(), bars.len());
        assert_eq!(snapshot.bars()[0].children, vec![7]);
        assert_eq!(h.bars()[0].children, vec![7, 8]);
    }
}
