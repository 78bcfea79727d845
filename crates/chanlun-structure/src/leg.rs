//! The leg abstraction shared by strokes and segments.
//!
//! Segments are built over strokes, and segments-of-segments over segments.
//! Everything above the stroke builder is therefore written against [`Leg`].

use crate::candle::MergedCandle;
use crate::config::DivergenceAlgo;
use crate::error::Result;
use crate::types::{BarUnit, Direction};

/// Read-only view of one timeframe's bars and merged candles.
#[derive(Debug, Clone, Copy)]
pub struct BarContext<'a> {
    pub bars: &'a [BarUnit],
    pub candles: &'a [MergedCandle],
}

impl<'a> BarContext<'a> {
    pub fn new(bars: &'a [BarUnit], candles: &'a [MergedCandle]) -> Self {
        Self { bars, candles }
    }
}

/// A directional move between two price extremes.
pub trait Leg: Clone {
    fn index(&self) -> usize;
    fn direction(&self) -> Direction;
    fn is_sure(&self) -> bool;
    fn begin_value(&self) -> f64;
    fn end_value(&self) -> f64;
    /// Bar holding the starting extreme.
    fn begin_bar(&self) -> usize;
    /// Bar holding the ending extreme.
    fn end_bar(&self) -> usize;

    /// Index of the segment this leg was stamped with.
    fn segment_index(&self) -> Option<usize>;
    fn set_segment_index(&mut self, index: usize);
    /// Segment that owns this leg, if one has been built over it.
    fn parent_segment(&self) -> Option<usize>;
    fn set_parent_segment(&mut self, index: Option<usize>);

    /// Strength of the leg for divergence comparisons.
    ///
    /// `reverse` measures from the end of the leg backwards, which only
    /// matters for [`DivergenceAlgo::Area`].
    fn metric(&self, algo: DivergenceAlgo, reverse: bool, ctx: &BarContext<'_>) -> Result<f64>;

    #[inline]
    fn is_up(&self) -> bool {
        self.direction().is_up()
    }

    #[inline]
    fn is_down(&self) -> bool {
        self.direction().is_down()
    }

    #[inline]
    fn high(&self) -> f64 {
        if self.is_up() {
            self.end_value()
        } else {
            self.begin_value()
        }
    }

    #[inline]
    fn low(&self) -> f64 {
        if self.is_up() {
            self.begin_value()
        } else {
            self.end_value()
        }
    }

    #[inline]
    fn amplitude(&self) -> f64 {
        (self.end_value() - self.begin_value()).abs()
    }
}

/// The leg with the most extreme end among `legs`, searching only legs of the
/// requested direction. A candidate is skipped when the same-direction leg
/// before it in `all` ended further out. Ties go to the later candidate in
/// iteration order.
pub fn find_peak_leg<'a, L: Leg + 'a>(legs: impl IntoIterator<Item = &'a L>, all: &[L], is_high: bool) -> Option<usize> {
    let mut peak_val = if is_high { f64::NEG_INFINITY } else { f64::INFINITY };
    let mut peak = None;
    for leg in legs {
        let end = leg.end_value();
        let candidate = if is_high {
            leg.is_up() && end >= peak_val
        } else {
            leg.is_down() && end <= peak_val
        };
        if !candidate {
            continue;
        }
        if let Some(prev) = leg.index().checked_sub(2).and_then(|i| all.get(i)) {
            let prev_end = prev.end_value();
            if (is_high && prev_end > end) || (!is_high && prev_end < end) {
                continue;
            }
        }
        peak_val = end;
        peak = Some(leg.index());
    }
    peak
}


#[cfg(test)]
mod tests {
    use super::test_legs::legs_through;
    use super::*;

    #[test]
    fn test_high_low_follow_direction() {
        let legs = legs_through(&[10.0, 15.0, 12.0]);
        assert_eq!((legs[0].high(), legs[0].low()), (15.0, 10.0));
        assert_eq!((legs[1].high(), legs[1].low()), (15.0, 12.0));
        assert_eq!(legs[1].amplitude(), 3.0);
    }

    #[test]
    fn test_find_peak_leg() {
        let legs = legs_through(&[10.0, 15.0, 12.0, 18.0, 11.0, 16.0, 13.0]);
        assert_eq!(find_peak_leg(&legs, &legs, true), Some(2));
        assert_eq!(find_peak_leg(&legs, &legs, false), Some(3));
    }

    #[test]
    fn test_find_peak_skips_lower_repeat() {
        // leg 4 ends at 17 but leg 2 before it ended higher
        let legs = legs_through(&[10.0, 15.0, 12.0, 18.0, 11.0, 17.0]);
        assert_eq!(find_peak_leg(&legs[3..], &legs, true), None);
    }
}
