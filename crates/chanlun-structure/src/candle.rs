//! Merged candles and fractal detection.
//!
//! Bars are folded into merged candles under the inclusion rule: when one range
//! contains the other, the bar joins the last candle and the candle's range is
//! merged in the candle's direction. Otherwise a new candle opens with the
//! direction of the move, and the candle before it gets its fractal label.

use chanlun_core::Bar;

use crate::types::{fractal_of, has_overlap, merge_range, test_combine, BarUnit, CombineOutcome, Direction, EqualPeak, Fractal};

/// A run of bars collapsed under the inclusion rule.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedCandle {
    pub index: usize,
    /// Direction relative to the previous candle. The first candle is `Up`.
    pub direction: Direction,
    pub fractal: Fractal,
    /// Merged high.
    pub high: f64,
    /// Merged low.
    pub low: f64,
    /// Highest raw bar high, unaffected by merging.
    pub raw_high: f64,
    /// Lowest raw bar low, unaffected by merging.
    pub raw_low: f64,
    pub first_bar: usize,
    pub last_bar: usize,
    pub begin_time: f64,
    pub end_time: f64,
}

impl MergedCandle {
    fn open(index: usize, bar_index: usize, bar: &Bar, direction: Direction) -> Self {
        Self {
            index,
            direction,
            fractal: Fractal::None,
            high: bar.high,
            low: bar.low,
            raw_high: bar.high,
            raw_low: bar.low,
            first_bar: bar_index,
            last_bar: bar_index,
            begin_time: bar.timestamp,
            end_time: bar.timestamp,
        }
    }

    #[inline]
    pub fn bar_count(&self) -> usize {
        self.last_bar - self.first_bar + 1
    }

    #[inline]
    pub fn bars(&self) -> std::ops::RangeInclusive<usize> {
        self.first_bar..=self.last_bar
    }

    /// The latest bar whose high (or low) equals the candle's merged extreme.
    pub fn peak_bar(&self, bars: &[BarUnit], is_high: bool) -> usize {
        self.bars()
            .rev()
            .find(|&i| {
                bars.get(i)
                    .map(|u| if is_high { u.high() == self.high } else { u.low() == self.low })
                    .unwrap_or(false)
            })
            .unwrap_or(self.last_bar)
    }

    /// Whether the raw ranges of this candle and `next` leave a price gap.
    pub fn has_gap_with(&self, next: &MergedCandle) -> bool {
        !has_overlap(self.raw_low, self.raw_high, next.raw_low, next.raw_high, true)
    }
}

/// What absorbing a bar did to the candle list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Absorb {
    /// The bar opened the very first candle.
    First,
    /// The bar merged into the last candle.
    Merged,
    /// The bar opened a new candle.
    Opened,
}

/// Merged-candle engine for one timeframe.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CandleList {
    candles: Vec<MergedCandle>,
}

impl CandleList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn as_slice(&self) -> &[MergedCandle] {
        &self.candles
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn last(&self) -> Option<&MergedCandle> {
        self.candles.last()
    }

    pub fn get(&self, index: usize) -> Option<&MergedCandle> {
        self.candles.get(index)
    }

    /// Fold one bar into the list.
    ///
    /// When a new candle opens and at least three exist, the fractal label of
    /// the second-to-last candle is assigned. Labels are never revisited.
    pub fn absorb(&mut self, bar_index: usize, bar: &Bar) -> Absorb {
        let Some(last) = self.candles.last_mut() else {
            self.candles.push(MergedCandle::open(0, bar_index, bar, Direction::Up));
            return Absorb::First;
        };

        match test_combine(last.high, last.low, bar.high, bar.low, false, EqualPeak::Off) {
            CombineOutcome::Combine | CombineOutcome::Included => {
                let (high, low) = merge_range(last.direction, (last.high, last.low), (bar.high, bar.low));
                last.high = high;
                last.low = low;
                last.raw_high = last.raw_high.max(bar.high);
                last.raw_low = last.raw_low.min(bar.low);
                last.last_bar = bar_index;
                last.end_time = bar.timestamp;
                Absorb::Merged
            }
            outcome => {
                let direction = if outcome == CombineOutcome::Up {
                    Direction::Up
                } else {
                    Direction::Down
                };
                let index = self.candles.len();
                self.candles.push(MergedCandle::open(index, bar_index, bar, direction));
                if index >= 2 {
                    self.update_fractal(index - 1);
                }
                Absorb::Opened
            }
        }
    }

    fn update_fractal(&mut self, mid: usize) {
        let range = |c: &MergedCandle| (c.high, c.low);
        let fractal = fractal_of(
            range(&self.candles[mid - 1]),
            range(&self.candles[mid]),
            range(&self.candles[mid + 1]),
            false,
            EqualPeak::Off,
        );
        self.candles[mid].fractal = fractal;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_bar(i: usize, high: f64, low: f64) -> Bar {
        Bar::new(i as f64 * 60.0, low, high, low, high, 1.0)
    }

    fn feed(ranges: &[(f64, f64)]) -> CandleList {
        let mut list = CandleList::new();
        for (i, &(h, l)) in ranges.iter().enumerate() {
            list.absorb(i, &make_bar(i, h, l));
        }
        list
    }

    #[test]
    fn test_first_bar_opens_candle() {
        let mut list = CandleList::new();
        assert_eq!(list.absorb(0, &make_bar(0, 10.0, 9.0)), Absorb::First);
        assert_eq!(list.len(), 1);
        assert_eq!(list.last().unwrap().direction, Direction::Up);
    }

    #[test]
    fn test_inclusion_in_up_context() {
        // 2nd bar moves up, 3rd is inside it: higher high and higher low are kept
        let list = feed(&[(10.0, 8.0), (12.0, 9.0), (11.5, 9.5)]);
        assert_eq!(list.len(), 2);
        let c = list.last().unwrap();
        assert_eq!((c.high, c.low), (12.0, 9.5));
        assert_eq!((c.raw_high, c.raw_low), (12.0, 9.0));
        assert_eq!(c.bar_count(), 2);
    }

    #[test]
    fn test_inclusion_in_down_context() {
        let list = feed(&[(12.0, 9.0), (11.0, 8.0), (11.5, 7.5)]);
        assert_eq!(list.len(), 2);
        let c = list.last().unwrap();
        assert_eq!((c.high, c.low), (11.0, 7.5));
    }

    #[test]
    fn test_fractal_assigned_to_middle() {
        let list = feed(&[(10.0, 8.0), (12.0, 10.0), (11.0, 9.0)]);
        assert_eq!(list.get(1).unwrap().fractal, Fractal::Top);
        assert_eq!(list.get(2).unwrap().fractal, Fractal::None);
    }

    #[test]
    fn test_candles_cover_every_bar_once() {
        let ranges: Vec<(f64, f64)> = (0..40)
            .map(|i| {
                let mid = 100.0 + ((i as f64) * 0.7).sin() * 5.0;
                (mid + 1.0 + (i % 3) as f64 * 0.5, mid - 1.0)
            })
            .collect();
        let list = feed(&ranges);
        let mut next = 0;
        for c in list.as_slice() {
            assert_eq!(c.first_bar, next);
            next = c.last_bar + 1;
        }
        assert_eq!(next, ranges.len());
    }

    #[test]
    fn test_peak_bar_prefers_latest() {
        let bars: Vec<BarUnit> = [(12.0, 9.0), (12.0, 9.5)]
            .iter()
            .enumerate()
            .map(|(i, &(h, l))| BarUnit::new(i, make_bar(i, h, l), Default::default(), 0))
            .collect();
        let mut list = CandleList::new();
        for u in &bars {
            list.absorb(u.index, &u.bar);
        }
        let c = list.last().unwrap();
        assert_eq!(c.peak_bar(&bars, true), 1);
    }
}
