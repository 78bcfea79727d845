//! Pivots: price bands where consecutive counter-direction legs overlap.
//!
//! Within each segment the legs running against the segment's direction are
//! offered one by one. Two overlapping ones open a pivot, later ones extend
//! it while they still overlap its band, and adjacent pivots of the same
//! segment may merge. Pivots starting at or after the last confirmed segment
//! are dropped and rebuilt on every pass; earlier ones are final.

use std::ops::RangeInclusive;

use log::debug;

use crate::config::{CombineMode, PivotConfig, SignalConfig};
use crate::error::{ChanError, Result};
use crate::leg::{BarContext, Leg};
use crate::segment::Segment;
use crate::types::{has_overlap, Direction};

/// An overlap band over a run of legs.
#[derive(Debug, Clone, PartialEq)]
pub struct Pivot {
    pub index: usize,
    pub begin_leg: usize,
    pub end_leg: usize,
    /// Bar where the first leg starts.
    pub begin_bar: usize,
    /// Bar where the last leg ends.
    pub end_bar: usize,
    pub low: f64,
    pub high: f64,
    pub peak_low: f64,
    pub peak_high: f64,
    is_sure: bool,
    /// Leg entering the pivot.
    pub leg_in: Option<usize>,
    /// Leg leaving the pivot, once it exists.
    pub leg_out: Option<usize>,
    /// The pivots this one was merged from, in order. Empty unless merged.
    pub sub_pivots: Vec<Pivot>,
    begin_segment: Option<usize>,
}

impl Pivot {
    fn new<L: Leg>(legs: &[L], items: &[usize], is_sure: bool) -> Option<Self> {
        let first = legs.get(*items.first()?)?;
        let mut pivot = Self {
            index: 0,
            begin_leg: first.index(),
            end_leg: first.index(),
            begin_bar: first.begin_bar(),
            end_bar: first.end_bar(),
            low: 0.0,
            high: 0.0,
            peak_low: f64::INFINITY,
            peak_high: f64::NEG_INFINITY,
            is_sure,
            leg_in: None,
            leg_out: None,
            sub_pivots: Vec::new(),
            begin_segment: first.segment_index(),
        };
        pivot.set_band(items.iter().filter_map(|&i| legs.get(i)));
        for leg in items.iter().filter_map(|&i| legs.get(i)) {
            pivot.extend_to(leg);
        }
        Some(pivot)
    }

    fn set_band<'a, L: Leg + 'a>(&mut self, items: impl Iterator<Item = &'a L> + Clone) {
        self.low = items.clone().map(Leg::low).fold(f64::NEG_INFINITY, f64::max);
        self.high = items.map(Leg::high).fold(f64::INFINITY, f64::min);
    }

    fn extend_to<L: Leg>(&mut self, leg: &L) {
        self.end_leg = leg.index();
        self.end_bar = leg.end_bar();
        self.peak_low = self.peak_low.min(leg.low());
        self.peak_high = self.peak_high.max(leg.high());
    }

    #[inline]
    pub fn is_sure(&self) -> bool {
        self.is_sure
    }

    #[inline]
    pub fn mid(&self) -> f64 {
        (self.low + self.high) / 2.0
    }

    /// Legs inside the pivot, both ends included.
    #[inline]
    pub fn legs(&self) -> RangeInclusive<usize> {
        self.begin_leg..=self.end_leg
    }

    /// Built from a single leg.
    #[inline]
    pub fn is_one_leg(&self) -> bool {
        self.begin_leg == self.end_leg
    }

    /// Whether the pivot starts inside `segment`.
    #[inline]
    pub fn is_inside(&self, segment: &Segment) -> bool {
        segment.contains_leg(self.begin_leg)
    }

    fn in_range<L: Leg>(&self, leg: &L) -> bool {
        has_overlap(self.low, self.high, leg.low(), leg.high(), false)
    }

    /// Extend the pivot with `leg` when it overlaps the band. A merged pivot
    /// grows only as its newest constituent would, so merging never changes
    /// which legs end up in which constituent.
    fn try_add_to_end<L: Leg>(&mut self, leg: &L, legs: &[L]) -> bool {
        if let Some(newest) = self.sub_pivots.last_mut() {
            if !newest.try_add_to_end(leg, legs) {
                return false;
            }
            self.extend_to(leg);
            return true;
        }
        if !self.in_range(leg) {
            return false;
        }
        if self.is_one_leg() {
            if let Some(begin) = legs.get(self.begin_leg) {
                self.set_band([begin, leg].into_iter());
            }
        }
        self.extend_to(leg);
        true
    }

    fn combine(&mut self, other: &Pivot, mode: CombineMode) -> bool {
        if other.is_one_leg() || self.begin_segment != other.begin_segment {
            return false;
        }
        let overlaps = match mode {
            CombineMode::Zs => has_overlap(self.low, self.high, other.low, other.high, true),
            CombineMode::Peak => has_overlap(self.peak_low, self.peak_high, other.peak_low, other.peak_high, false),
        };
        if !overlaps {
            return false;
        }
        if self.sub_pivots.is_empty() {
            self.sub_pivots.push(self.clone());
        }
        self.sub_pivots.push(other.clone());
        self.low = self.low.min(other.low);
        self.high = self.high.max(other.high);
        self.peak_low = self.peak_low.min(other.peak_low);
        self.peak_high = self.peak_high.max(other.peak_high);
        self.end_leg = other.end_leg;
        self.end_bar = other.end_bar;
        self.leg_out = other.leg_out;
        true
    }

    /// Whether `out` leaves the pivot past its band.
    pub fn end_leg_break<L: Leg>(&self, out: &L) -> bool {
        match out.direction() {
            Direction::Down => out.low() < self.low,
            Direction::Up => out.high() > self.high,
        }
    }

    /// Compare the strength of the leg entering the pivot with the leg
    /// leaving it, `out` or else the stored exit leg.
    ///
    /// Returns whether the exit leg is weaker by at least the configured rate,
    /// along with the strength ratio when one could be measured.
    pub fn is_divergence<L: Leg>(
        &self,
        config: &SignalConfig,
        out: Option<&L>,
        legs: &[L],
        ctx: &BarContext<'_>,
    ) -> Result<(bool, Option<f64>)> {
        let Some(out) = out.or_else(|| self.leg_out.and_then(|i| legs.get(i))) else {
            return Ok((false, None));
        };
        if !self.end_leg_break(out) {
            return Ok((false, None));
        }
        let Some(leg_in) = self.leg_in.and_then(|i| legs.get(i)) else {
            return Ok((false, None));
        };
        let in_metric = leg_in.metric(config.divergence_algo, false, ctx)?;
        let out_metric = out.metric(config.divergence_algo, true, ctx)?;
        let rate = out_metric / in_metric;
        if config.divergence_rate > 100.0 {
            Ok((true, Some(rate)))
        } else {
            Ok((out_metric <= config.divergence_rate * in_metric, Some(rate)))
        }
    }

    /// Whether the exit leg reaches further than every leg inside the pivot
    /// up to `until`, and if so the smallest relative distance to one of them.
    pub fn out_leg_is_peak<L: Leg>(&self, until: usize, legs: &[L]) -> (bool, Option<f64>) {
        let Some(out) = self.leg_out.and_then(|i| legs.get(i)) else {
            return (false, None);
        };
        let mut peak_rate = f64::INFINITY;
        for leg in self.legs().filter(|&i| i <= until).filter_map(|i| legs.get(i)) {
            let beaten = match out.direction() {
                Direction::Down => leg.low() < out.low(),
                Direction::Up => leg.high() > out.high(),
            };
            if beaten {
                return (false, None);
            }
            let r = (leg.end_value() - out.end_value()).abs() / out.end_value();
            peak_rate = peak_rate.min(r);
        }
        (true, Some(peak_rate))
    }
}

/// Pivot detector for one leg sequence.
#[derive(Debug, Clone)]
pub struct PivotList {
    config: PivotConfig,
    pivots: Vec<Pivot>,
    free: Vec<usize>,
    /// Start leg of the last sure segment.
    last_sure_pos: Option<usize>,
    last_seg_idx: usize,
}

impl PivotList {
    pub fn new(config: PivotConfig) -> Self {
        Self {
            config,
            pivots: Vec::new(),
            free: Vec::new(),
            last_sure_pos: None,
            last_seg_idx: 0,
        }
    }

    pub fn as_slice(&self) -> &[Pivot] {
        &self.pivots
    }

    pub fn len(&self) -> usize {
        self.pivots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pivots.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Pivot> {
        self.pivots.get(index)
    }

    pub fn last(&self) -> Option<&Pivot> {
        self.pivots.last()
    }

    /// Rebuild every pivot that starts at or after the last sure segment.
    pub fn compute<L: Leg>(&mut self, legs: &[L], segments: &[Segment]) {
        let floor = self.last_sure_pos;
        while self
            .pivots
            .last()
            .map(|p| floor.map_or(true, |f| p.begin_leg >= f))
            .unwrap_or(false)
        {
            self.pivots.pop();
        }

        for seg in segments.iter().skip(self.last_seg_idx) {
            if floor.is_some_and(|f| seg.start_leg < f) {
                continue;
            }
            self.free.clear();
            let span = legs.get(seg.start_leg..=seg.end_leg).unwrap_or(&[]);
            self.add_from_span(legs, span, seg.direction, seg.is_sure());
        }

        // Legs not yet grouped into a segment. Without any segment there is
        // no direction to read counter legs against, so nothing is built.
        if let Some(last) = segments.last() {
            self.free.clear();
            let span = legs.get(last.end_leg + 1..).unwrap_or(&[]);
            self.add_from_span(legs, span, last.direction.opposite(), false);
        }

        self.update_last_pos(segments);
    }

    fn update_last_pos(&mut self, segments: &[Segment]) {
        match segments.iter().rev().find(|s| s.is_sure()) {
            Some(seg) => {
                self.last_sure_pos = Some(seg.start_leg);
                self.last_seg_idx = seg.index;
            }
            None => {
                self.last_sure_pos = None;
                self.last_seg_idx = 0;
            }
        }
    }

    fn add_from_span<L: Leg>(&mut self, legs: &[L], span: &[L], direction: Direction, is_sure: bool) {
        let mut first = true;
        for leg in span.iter().filter(|l| l.direction() != direction) {
            if first {
                // The first counter leg never extends a pivot of the previous segment.
                self.add_to_free(leg, legs, is_sure);
                first = false;
            } else {
                self.update_with(leg, legs, is_sure);
            }
        }
    }

    fn update_with<L: Leg>(&mut self, leg: &L, legs: &[L], is_sure: bool) {
        if self.free.is_empty() {
            if let Some(last) = self.pivots.last_mut() {
                if last.try_add_to_end(leg, legs) {
                    self.try_combine();
                    return;
                }
            }
        }
        self.add_to_free(leg, legs, is_sure);
    }

    fn add_to_free<L: Leg>(&mut self, leg: &L, legs: &[L], is_sure: bool) {
        if self.free.last() == Some(&leg.index()) {
            self.free.pop();
        }
        self.free.push(leg.index());
        let Some(mut pivot) = self.try_construct(legs, is_sure) else {
            return;
        };
        // A pivot may not start on the very first leg.
        if pivot.begin_leg == 0 {
            return;
        }
        pivot.index = self.pivots.len();
        debug!("pivot {} over legs {:?} [{}, {}]", pivot.index, pivot.legs(), pivot.low, pivot.high);
        self.pivots.push(pivot);
        self.free.clear();
        self.try_combine();
    }

    fn try_construct<L: Leg>(&self, legs: &[L], is_sure: bool) -> Option<Pivot> {
        let items = if self.config.one_leg_pivot {
            &self.free[..]
        } else if self.free.len() < 2 {
            return None;
        } else {
            &self.free[self.free.len() - 2..]
        };
        let members = || items.iter().filter_map(|&i| legs.get(i));
        let min_high = members().map(Leg::high).fold(f64::INFINITY, f64::min);
        let max_low = members().map(Leg::low).fold(f64::NEG_INFINITY, f64::max);
        if min_high > max_low {
            Pivot::new(legs, items, is_sure)
        } else {
            None
        }
    }

    fn try_combine(&mut self) {
        if !self.config.combine {
            return;
        }
        while self.pivots.len() >= 2 {
            let n = self.pivots.len();
            let (head, tail) = self.pivots.split_at_mut(n - 1);
            if !head[n - 2].combine(&tail[0], self.config.combine_mode) {
                break;
            }
            self.pivots.pop();
        }
    }

    /// Attach pivots to the segments they start in and set each pivot's
    /// entering leg, exiting leg and member range.
    ///
    /// Walks back from the newest segment and stops at the first segment whose
    /// interior is already final. A segment becomes final once more than two
    /// sure segments follow it, counting itself.
    pub fn reconcile<L: Leg>(&mut self, legs: &[L], segments: &mut [Segment]) -> Result<()> {
        let mut sure_count = 0;
        for seg in segments.iter_mut().rev() {
            if seg.interior_finalized {
                break;
            }
            if seg.is_sure() {
                sure_count += 1;
            }
            seg.pivots.clear();
            for pivot in self.pivots.iter_mut().rev() {
                if pivot.end_bar < seg.begin_bar() {
                    break;
                }
                if pivot.is_inside(seg) {
                    seg.pivots.insert(0, pivot.index);
                }
                if pivot.begin_leg == 0 {
                    return Err(ChanError::Invariant(format!("pivot {} starts on the first leg", pivot.index)));
                }
                pivot.leg_in = Some(pivot.begin_leg - 1);
                pivot.leg_out = (pivot.end_leg + 1 < legs.len()).then_some(pivot.end_leg + 1);
            }
            if sure_count > 2 {
                seg.interior_finalized = true;
            }
        }
        Ok(())
    }
}

/// Pivot queries on a segment.
impl Segment {
    /// Pivots of this segment built from more than one leg.
    pub fn multi_leg_pivots<'a>(&'a self, pivots: &'a [Pivot]) -> impl Iterator<Item = &'a Pivot> + 'a {
        self.pivots
            .iter()
            .filter_map(move |&i| pivots.get(i))
            .filter(|p| !p.is_one_leg())
    }

    pub fn multi_leg_pivot_count(&self, pivots: &[Pivot]) -> usize {
        self.multi_leg_pivots(pivots).count()
    }

    pub fn first_multi_leg_pivot<'a>(&'a self, pivots: &'a [Pivot]) -> Option<&'a Pivot> {
        self.multi_leg_pivots(pivots).next()
    }

    pub fn final_multi_leg_pivot<'a>(&'a self, pivots: &'a [Pivot]) -> Option<&'a Pivot> {
        self.multi_leg_pivots(pivots).last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LeftMethod, SegmentAlgorithm, SegmentConfig};
    use crate::leg::test_legs::{legs_through, TestLeg};
    use crate::segment::SegmentList;

    /// Rising legs whose pullbacks form two bands: [13, 14] then [14.5, 18].
    fn two_bands() -> Vec<TestLeg> {
        legs_through(&[10.0, 14.0, 12.0, 15.0, 13.0, 18.0, 14.0, 19.0, 14.5, 22.0])
    }

    fn pivots_with(mode: CombineMode, legs: &[TestLeg]) -> PivotList {
        let mut list = PivotList::new(PivotConfig {
            combine: true,
            combine_mode: mode,
            one_leg_pivot: false,
        });
        list.compute(legs, &[Segment::spanning(legs, Direction::Up)]);
        list
    }

    #[test]
    fn test_overlapping_pullbacks_open_pivot() {
        let legs = two_bands();
        let list = pivots_with(CombineMode::Zs, &legs);
        let first = list.get(0).unwrap();
        assert_eq!(first.legs(), 1..=3);
        assert_eq!((first.low, first.high), (13.0, 14.0));
        assert_eq!((first.peak_low, first.peak_high), (12.0, 15.0));
        assert!(!first.is_sure());
    }

    #[test]
    fn test_zs_mode_keeps_disjoint_bands_apart() {
        let legs = two_bands();
        let list = pivots_with(CombineMode::Zs, &legs);
        assert_eq!(list.len(), 2);
        assert_eq!(list.get(1).unwrap().legs(), 5..=7);
    }

    #[test]
    fn test_peak_mode_merges_overlapping_peaks() {
        let legs = two_bands();
        let zs = pivots_with(CombineMode::Zs, &legs);
        let peak = pivots_with(CombineMode::Peak, &legs);
        assert_eq!(peak.len(), 1);
        let merged = peak.get(0).unwrap();
        assert_eq!(merged.legs(), 1..=7);
        let subs: Vec<_> = merged.sub_pivots.iter().map(Pivot::legs).collect();
        let tops: Vec<_> = zs.as_slice().iter().map(Pivot::legs).collect();
        assert_eq!(subs, tops);
        assert_eq!((merged.low, merged.high), (13.0, 18.0));
    }

    #[test]
    fn test_no_combine_when_disabled() {
        let legs = two_bands();
        let mut list = PivotList::new(PivotConfig {
            combine: false,
            combine_mode: CombineMode::Peak,
            one_leg_pivot: false,
        });
        list.compute(&legs, &[Segment::spanning(&legs, Direction::Up)]);
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn test_no_pivots_without_segments() {
        let legs = legs_through(&[10.0, 14.0, 12.0, 15.0, 13.0]);
        let mut list = PivotList::new(PivotConfig::default());
        list.compute(&legs, &[]);
        assert!(list.is_empty());

        list.compute(&legs, &[Segment::spanning(&legs, Direction::Up)]);
        assert_eq!(list.get(0).map(Pivot::legs), Some(1..=3));
    }

    #[test]
    fn test_merged_pivot_extends_by_newest_band() {
        // Pullback 15.5 -> 14.9 misses the [16, 17.5] band of the second
        // pivot but falls inside the [13, 17.5] band of the merge.
        let legs = legs_through(&[10.0, 14.0, 12.0, 15.0, 13.0, 18.0, 16.0, 17.5, 14.8, 15.5, 14.9, 20.0]);
        let zs = pivots_with(CombineMode::Zs, &legs);
        let peak = pivots_with(CombineMode::Peak, &legs);
        let flatten = |list: &PivotList| -> Vec<RangeInclusive<usize>> {
            list.as_slice()
                .iter()
                .flat_map(|p| {
                    if p.sub_pivots.is_empty() {
                        vec![p.legs()]
                    } else {
                        p.sub_pivots.iter().map(Pivot::legs).collect()
                    }
                })
                .collect()
        };
        assert_eq!(zs.len(), 2);
        assert_eq!(flatten(&zs), vec![1..=3, 5..=7]);
        assert_eq!(peak.len(), 1);
        assert_eq!(peak.get(0).unwrap().legs(), 1..=7);
        assert_eq!(flatten(&peak), flatten(&zs));
    }

    #[test]
    fn test_reconcile_sets_neighbours() {
        let mut legs = legs_through(&[10.0, 14.0, 12.0, 15.0, 13.0, 20.0, 16.0, 18.0, 13.0, 15.0, 8.0, 11.0, 9.0, 13.0]);
        let mut segments = SegmentList::new(SegmentConfig {
            algorithm: SegmentAlgorithm::Chan,
            left_method: LeftMethod::Peak,
        });
        segments.update(&mut legs).unwrap();
        assert_eq!(segments.get(0).map(|s| (s.start_leg, s.end_leg)), Some((0, 4)));

        let mut pivots = PivotList::new(PivotConfig::default());
        pivots.compute(&legs, segments.as_slice());
        pivots.reconcile(&legs, segments.legs_mut()).unwrap();
        let first = pivots.get(0).unwrap();
        assert_eq!(first.legs(), 1..=3);
        assert_eq!((first.leg_in, first.leg_out), (Some(0), Some(4)));
        assert_eq!(segments.get(0).unwrap().pivots, vec![0]);
        assert_eq!(segments.get(0).unwrap().multi_leg_pivot_count(pivots.as_slice()), 1);
    }

    #[test]
    fn test_divergence_on_weaker_exit() {
        let legs = legs_through(&[10.0, 20.0, 15.0, 18.0, 16.0, 19.0]);
        let mut pivot = Pivot::new(&legs, &[1, 3], true).unwrap();
        pivot.leg_in = Some(0);
        pivot.leg_out = Some(4);
        let config = SignalConfig {
            divergence_rate: 0.9,
            ..SignalConfig::default()
        };
        let ctx = BarContext::new(&[], &[]);
        // exit leg 16 -> 19 breaks the [16, 18] band with 3 against 10 on the way in
        let (div, rate) = pivot.is_divergence(&config, None, &legs, &ctx).unwrap();
        assert!(div);
        assert!((rate.unwrap() - 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_rebuild_is_stable() {
        let legs = two_bands();
        let mut list = pivots_with(CombineMode::Zs, &legs);
        let before = list.as_slice().to_vec();
        list.compute(&legs, &[Segment::spanning(&legs, Direction::Up)]);
        assert_eq!(list.as_slice(), &before[..]);
    }
}
