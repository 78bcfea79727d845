//! Segments: runs of at least three legs bounded by a structural break.
//!
//! [`SegmentList`] is generic over [`Leg`], so the same builder produces
//! segments over strokes and segments over segments. The end-detection rule is
//! selected by [`SegmentAlgorithm`]; all rules share the tail handling that
//! turns unfinished structure after the last confirmed segment into unsure
//! segments.
//!
//! Only unsure segments at the tail, plus a last sure segment whose
//! confirming leg has since changed, are ever rebuilt.

mod chan;
mod eigen;
mod legacy;
mod trend_line;

pub use eigen::{Eigen, EigenFx};
pub use trend_line::{TrendLine, TrendSide};

use log::debug;

use crate::config::{DivergenceAlgo, LeftMethod, SegmentAlgorithm, SegmentConfig};
use crate::error::{ChanError, Result};
use crate::leg::{find_peak_leg, BarContext, Leg};
use crate::metric;
use crate::types::Direction;

/// A segment over a contiguous range of legs.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub index: usize,
    pub start_leg: usize,
    pub end_leg: usize,
    pub direction: Direction,
    is_sure: bool,
    /// Which rule produced the segment.
    pub reason: &'static str,
    begin_value: f64,
    end_value: f64,
    begin_bar: usize,
    end_bar: usize,
    /// Last leg of the feature fractal that confirmed the end.
    pub(crate) eigen_tail: Option<usize>,
    /// Indices of pivots inside the segment, in order.
    pub pivots: Vec<usize>,
    /// Every pivot inside the segment is final.
    pub interior_finalized: bool,
    pub support: Option<TrendLine>,
    pub resistance: Option<TrendLine>,
    segment_index: Option<usize>,
    parent_segment: Option<usize>,
}

#[derive(Debug)]
enum SegmentCheck {
    EndValue(String),
    Shape(String),
}

impl Segment {
    fn new<L: Leg>(
        index: usize,
        legs: &[L],
        start_leg: usize,
        end_leg: usize,
        is_sure: bool,
        direction: Option<Direction>,
        reason: &'static str,
    ) -> std::result::Result<Self, SegmentCheck> {
        let (Some(start), Some(end)) = (legs.get(start_leg), legs.get(end_leg)) else {
            return Err(SegmentCheck::Shape(format!("legs {start_leg}..={end_leg} out of range")));
        };
        if start_leg > end_leg {
            return Err(SegmentCheck::Shape(format!("start leg {start_leg} after end leg {end_leg}")));
        }
        let is_sure = is_sure && end_leg - start_leg >= 2;
        if start_leg != 0 && start.direction() != end.direction() && is_sure {
            return Err(SegmentCheck::Shape(format!(
                "sure segment {start_leg}..={end_leg} has mismatched leg directions"
            )));
        }
        let direction = direction.unwrap_or(end.direction());
        let mut segment = Self {
            index,
            start_leg,
            end_leg,
            direction,
            is_sure,
            reason,
            begin_value: 0.0,
            end_value: 0.0,
            begin_bar: 0,
            end_bar: 0,
            eigen_tail: None,
            pivots: Vec::new(),
            interior_finalized: false,
            support: None,
            resistance: None,
            segment_index: None,
            parent_segment: None,
        };
        segment.refresh(legs);
        if is_sure {
            let wrong = match direction {
                Direction::Down => segment.begin_value < segment.end_value,
                Direction::Up => segment.begin_value > segment.end_value,
            };
            if wrong {
                return Err(SegmentCheck::EndValue(format!(
                    "{:?} segment {start_leg}..={end_leg} runs from {} to {}",
                    direction, segment.begin_value, segment.end_value
                )));
            }
        }
        Ok(segment)
    }

    /// Re-read the endpoint snapshot and trend lines from the legs.
    pub fn refresh<L: Leg>(&mut self, legs: &[L]) {
        let (Some(start), Some(end)) = (legs.get(self.start_leg), legs.get(self.end_leg)) else {
            return;
        };
        self.begin_value = start.begin_value();
        self.end_value = end.end_value();
        self.begin_bar = start.begin_bar();
        self.end_bar = end.end_bar();
        if self.end_leg - self.start_leg >= 2 {
            let span = &legs[self.start_leg..=self.end_leg];
            self.support = TrendLine::fit(span, TrendSide::Inside);
            self.resistance = TrendLine::fit(span, TrendSide::Outside);
        }
    }

    /// Number of legs, both ends included.
    #[inline]
    pub fn leg_count(&self) -> usize {
        self.end_leg - self.start_leg + 1
    }

    #[inline]
    pub fn contains_leg(&self, leg: usize) -> bool {
        (self.start_leg..=self.end_leg).contains(&leg)
    }

    /// An unconfirmed segment over all of `legs`.
    #[cfg(test)]
    pub(crate) fn spanning<L: Leg>(legs: &[L], direction: Direction) -> Self {
        match Self::new(0, legs, 0, legs.len() - 1, false, Some(direction), "spanning") {
            Ok(segment) => segment,
            Err(check) => panic!("cannot span legs: {check:?}"),
        }
    }
}

impl Leg for Segment {
    fn index(&self) -> usize {
        self.index
    }

    fn direction(&self) -> Direction {
        self.direction
    }

    fn is_sure(&self) -> bool {
        self.is_sure
    }

    fn begin_value(&self) -> f64 {
        self.begin_value
    }

    fn end_value(&self) -> f64 {
        self.end_value
    }

    fn begin_bar(&self) -> usize {
        self.begin_bar
    }

    fn end_bar(&self) -> usize {
        self.end_bar
    }

    fn segment_index(&self) -> Option<usize> {
        self.segment_index
    }

    fn set_segment_index(&mut self, index: usize) {
        self.segment_index = Some(index);
    }

    fn parent_segment(&self) -> Option<usize> {
        self.parent_segment
    }

    fn set_parent_segment(&mut self, index: Option<usize>) {
        self.parent_segment = index;
    }

    fn metric(&self, algo: DivergenceAlgo, _reverse: bool, ctx: &BarContext<'_>) -> Result<f64> {
        let (Some(begin), Some(end)) = (ctx.bars.get(self.begin_bar), ctx.bars.get(self.end_bar)) else {
            return Err(ChanError::Invariant(format!(
                "segment {} points past the bar list",
                self.index
            )));
        };
        match algo {
            DivergenceAlgo::Slope => Ok(metric::slope(self.direction, begin, end)),
            DivergenceAlgo::Amp => Ok(metric::amp(self.direction, begin, end)),
            other => Err(ChanError::Config(format!("{other:?} is not supported on segments"))),
        }
    }
}

/// Segment builder for one leg sequence.
#[derive(Debug, Clone)]
pub struct SegmentList {
    config: SegmentConfig,
    segments: Vec<Segment>,
}

impl SegmentList {
    pub fn new(config: SegmentConfig) -> Self {
        Self {
            config,
            segments: Vec::new(),
        }
    }

    pub fn as_slice(&self) -> &[Segment] {
        &self.segments
    }

    /// Segments as legs for the next level up.
    pub fn legs_mut(&mut self) -> &mut Vec<Segment> {
        &mut self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn last(&self) -> Option<&Segment> {
        self.segments.last()
    }

    pub fn get(&self, index: usize) -> Option<&Segment> {
        self.segments.get(index)
    }

    /// Rebuild the tail of the list over `legs` and stamp each leg with the
    /// segment it belongs to.
    pub fn update<L: Leg>(&mut self, legs: &mut [L]) -> Result<()> {
        match self.config.algorithm {
            SegmentAlgorithm::Chan => chan::update(self, legs)?,
            SegmentAlgorithm::Break => legacy::update_break(self, legs)?,
            SegmentAlgorithm::OnePlusOne => legacy::update_pairwise(self, legs)?,
        }
        if self.segments.is_empty() && !legs.is_empty() && legs.len() < 3 {
            self.add_new_seg(legs, 0, false, None, false, "seed")?;
        }
        for seg in self.segments.iter_mut().rev().take_while(|s| s.end_leg + 3 >= legs.len()) {
            seg.refresh(legs);
        }
        let last = legs.len().saturating_sub(1);
        for seg in &self.segments {
            for leg in &mut legs[seg.start_leg..=seg.end_leg.min(last)] {
                leg.set_parent_segment(Some(seg.index));
            }
        }
        self.stamp_legs(legs);
        Ok(())
    }

    /// Drop unsure segments at the tail, releasing their legs.
    fn drop_unsure_tail<L: Leg>(&mut self, legs: &mut [L]) {
        while let Some(last) = self.segments.last() {
            if last.is_sure {
                break;
            }
            for leg in legs.iter_mut().skip(last.start_leg).take(last.leg_count()) {
                leg.set_parent_segment(None);
            }
            debug!("dropping unsure segment {}", last.index);
            self.segments.pop();
        }
    }

    /// First leg not yet covered by a segment.
    fn next_start(&self) -> usize {
        self.segments.last().map(|s| s.end_leg + 1).unwrap_or(0)
    }

    /// Append a segment ending at `end_leg`.
    ///
    /// Returns `Ok(false)` when the first segment fails its end-value check;
    /// any other failed check is an invariant violation.
    fn add_new_seg<L: Leg>(
        &mut self,
        legs: &[L],
        end_leg: usize,
        is_sure: bool,
        direction: Option<Direction>,
        split_first: bool,
        reason: &'static str,
    ) -> Result<bool> {
        match self.try_add_new_seg(legs, end_leg, is_sure, direction, split_first, reason) {
            Ok(()) => Ok(true),
            Err(SegmentCheck::EndValue(msg)) if self.segments.is_empty() => {
                debug!("first segment rejected: {msg}");
                Ok(false)
            }
            Err(SegmentCheck::EndValue(msg)) | Err(SegmentCheck::Shape(msg)) => Err(ChanError::Invariant(msg)),
        }
    }

    fn try_add_new_seg<L: Leg>(
        &mut self,
        legs: &[L],
        end_leg: usize,
        is_sure: bool,
        direction: Option<Direction>,
        split_first: bool,
        reason: &'static str,
    ) -> std::result::Result<(), SegmentCheck> {
        if self.segments.is_empty() && split_first && end_leg >= 3 {
            if let Some(end) = legs.get(end_leg) {
                let peak = find_peak_leg(legs[..=end_leg - 3].iter().rev(), legs, end.is_down());
                if let (Some(peak_idx), Some(first)) = (peak, legs.first()) {
                    let p = &legs[peak_idx];
                    let beyond_first = match p.direction() {
                        Direction::Down => p.low() < first.low(),
                        Direction::Up => p.high() > first.high(),
                    };
                    if beyond_first || peak_idx == 0 {
                        self.try_add_new_seg(legs, peak_idx, false, Some(p.direction()), true, "split_first_1st")?;
                        return self.try_add_new_seg(legs, end_leg, false, None, true, "split_first_2nd");
                    }
                }
            }
        }
        let start = self.next_start();
        let segment = Segment::new(self.segments.len(), legs, start, end_leg, is_sure, direction, reason)?;
        debug!(
            "segment {} {:?} legs {}..={} sure={} ({reason})",
            segment.index, segment.direction, start, end_leg, segment.is_sure
        );
        self.segments.push(segment);
        Ok(())
    }

    /// Turn the legs after the last segment into unsure segments.
    fn collect_left_seg<L: Leg>(&mut self, legs: &[L]) -> Result<()> {
        if self.segments.is_empty() {
            self.collect_first_seg(legs)
        } else {
            self.collect_segs(legs)
        }
    }

    fn collect_first_seg<L: Leg>(&mut self, legs: &[L]) -> Result<()> {
        if legs.len() < 3 {
            return Ok(());
        }
        match self.config.left_method {
            LeftMethod::Peak => {
                let begin = legs[0].begin_value();
                let (high, low) = legs
                    .iter()
                    .fold((f64::NEG_INFINITY, f64::INFINITY), |(h, l), leg| (h.max(leg.high()), l.min(leg.low())));
                if (high - begin).abs() >= (low - begin).abs() {
                    if let Some(peak) = find_peak_leg(legs, legs, true) {
                        self.add_new_seg(legs, peak, false, Some(Direction::Up), false, "0seg_find_high")?;
                    }
                } else if let Some(peak) = find_peak_leg(legs, legs, false) {
                    self.add_new_seg(legs, peak, false, Some(Direction::Down), false, "0seg_find_low")?;
                }
                self.collect_left_as_seg(legs)
            }
            LeftMethod::All => {
                self.add_new_seg(legs, legs.len() - 1, false, None, false, "0seg_collect_all")?;
                Ok(())
            }
        }
    }

    fn collect_segs<L: Leg>(&mut self, legs: &[L]) -> Result<()> {
        let (Some(last_seg), Some(last_leg)) = (self.segments.last(), legs.last()) else {
            return Ok(());
        };
        let last_end = last_seg.end_leg;
        if last_leg.index() < last_end + 3 {
            return Ok(());
        }
        let end_value = legs[last_end].end_value();
        let candidates = legs.get(last_end + 3..).unwrap_or(&[]);
        // The tail ran past the last end, so the last segment's direction resumed
        // after a counter move that has to be cut out first.
        let forced = match last_seg.direction {
            Direction::Down if last_leg.end_value() <= end_value => Some(Direction::Up),
            Direction::Up if last_leg.end_value() >= end_value => Some(Direction::Down),
            _ => None,
        };
        if let Some(dir) = forced {
            if let Some(peak) = find_peak_leg(candidates, legs, dir.is_up()) {
                self.add_new_seg(legs, peak, false, Some(dir), true, "collectleft_find_peak_force")?;
                return self.collect_left_seg(legs);
            }
            return Ok(());
        }
        match self.config.left_method {
            LeftMethod::All => self.collect_left_as_seg(legs),
            LeftMethod::Peak => self.collect_left_seg_peak_method(legs, last_end),
        }
    }

    fn collect_left_seg_peak_method<L: Leg>(&mut self, legs: &[L], last_end: usize) -> Result<()> {
        let Some(end_leg) = legs.get(last_end) else {
            return Ok(());
        };
        let dir = end_leg.direction().opposite();
        let candidates = legs.get(last_end + 3..).unwrap_or(&[]);
        if let Some(peak) = find_peak_leg(candidates, legs, dir.is_up()) {
            if peak - last_end >= 3 {
                self.add_new_seg(legs, peak, false, Some(dir), true, "collectleft_find_peak")?;
            }
        }
        self.collect_left_as_seg(legs)
    }

    fn collect_left_as_seg<L: Leg>(&mut self, legs: &[L]) -> Result<()> {
        let Some(last_leg) = legs.last() else {
            return Ok(());
        };
        let Some(last_seg) = self.segments.last() else {
            return Ok(());
        };
        let last_end = last_seg.end_leg;
        if last_end + 1 >= legs.len() {
            return Ok(());
        }
        let end_dir = legs[last_end].direction();
        if end_dir == last_leg.direction() {
            self.add_new_seg(legs, last_leg.index() - 1, false, None, true, "collect_left_1")?;
        } else {
            self.add_new_seg(legs, last_leg.index(), false, None, true, "collect_left_0")?;
        }
        Ok(())
    }

    /// Stamp legs with their segment index. Legs after the last segment get
    /// the index the next segment will take.
    fn stamp_legs<L: Leg>(&self, legs: &mut [L]) {
        let Some(last) = self.segments.last() else {
            for leg in legs.iter_mut() {
                leg.set_segment_index(0);
            }
            return;
        };
        let mut sure_run = 0;
        let mut begin = last.start_leg;
        for seg in self.segments.iter().rev() {
            sure_run = if seg.is_sure { sure_run + 1 } else { 0 };
            begin = seg.start_leg;
            if sure_run > 2 {
                break;
            }
        }
        let mut cur = self.segments.len() - 1;
        for leg in legs.iter_mut().rev() {
            let idx = leg.index();
            if leg.segment_index().is_some() && idx < begin {
                break;
            }
            if idx > self.segments[cur].end_leg {
                leg.set_segment_index(self.segments[cur].index + 1);
                continue;
            }
            while idx < self.segments[cur].start_leg && cur > 0 {
                cur -= 1;
            }
            leg.set_segment_index(self.segments[cur].index);
        }
    }
}
