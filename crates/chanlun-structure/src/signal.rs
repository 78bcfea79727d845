//! Buy and sell signal points.
//!
//! Signals sit on the terminus of a leg. The classifier walks the segments
//! from the last confirmed one forward and applies the first, second and
//! third class rules in that order, since later classes can require an
//! earlier one at a related leg. A point may carry several types; its
//! related first-class point must agree across all of them.
//!
//! Non-target first-class candidates, those that failed their filters, are
//! kept aside so second and third class points can still relate to them.

use std::collections::BTreeMap;

use log::debug;

use crate::config::{SignalConfig, SignalSides, SignalType};
use crate::error::{ChanError, Result};
use crate::leg::{BarContext, Leg};
use crate::pivot::Pivot;
use crate::segment::Segment;
use crate::types::has_overlap;

/// A typed signal on a leg's terminus.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalPoint {
    /// Leg whose end carries the signal.
    pub leg: usize,
    /// Bar holding the leg's ending extreme.
    pub bar: usize,
    pub time: f64,
    pub is_buy: bool,
    pub types: Vec<SignalType>,
    /// Leg of the first-class point this one follows from.
    pub related: Option<usize>,
    pub features: BTreeMap<String, f64>,
}

impl SignalPoint {
    fn new<L: Leg>(leg: &L, is_buy: bool, ty: SignalType, related: Option<usize>, ctx: &BarContext<'_>) -> Self {
        let bar = leg.end_bar();
        let mut point = Self {
            leg: leg.index(),
            bar,
            time: ctx.bars.get(bar).map(|u| u.timestamp()).unwrap_or_default(),
            is_buy,
            types: vec![ty],
            related,
            features: BTreeMap::new(),
        };
        point.add_feature("leg_amp", leg.amplitude());
        if let Some(unit) = ctx.bars.get(bar) {
            for (name, value) in unit.metrics.features() {
                point.add_feature(name, value);
            }
        }
        point
    }

    /// Set a feature, replacing any earlier value under the same name.
    pub fn add_feature(&mut self, name: impl Into<String>, value: f64) {
        self.features.insert(name.into(), value);
    }

    pub fn feature(&self, name: &str) -> Option<f64> {
        self.features.get(name).copied()
    }

    pub fn has_type(&self, ty: SignalType) -> bool {
        self.types.contains(&ty)
    }

    /// Type labels joined by commas, e.g. `"1,2"`.
    pub fn type_label(&self) -> String {
        self.types.iter().map(SignalType::label).collect::<Vec<_>>().join(",")
    }

    /// Record another type on this point.
    ///
    /// Fails when `related` names a different first-class point than the one
    /// already recorded.
    pub fn add_type(&mut self, ty: SignalType, related: Option<usize>) -> Result<()> {
        if !self.types.contains(&ty) {
            self.types.push(ty);
        }
        match (self.related, related) {
            (None, _) => self.related = related,
            (Some(have), Some(new)) if have != new => {
                return Err(ChanError::Invariant(format!(
                    "signal on leg {} relates to leg {have} and leg {new}",
                    self.leg
                )));
            }
            _ => {}
        }
        Ok(())
    }
}

/// Features attached when a rule fires.
type Features = Vec<(&'static str, f64)>;

/// Signal classifier for one leg sequence.
#[derive(Debug, Clone)]
pub struct SignalList {
    config: SignalSides,
    /// Target points by leg.
    points: BTreeMap<usize, SignalPoint>,
    /// Every first-class candidate by leg, target or not.
    first_class: BTreeMap<usize, SignalPoint>,
    /// Bar where the last sure segment's final leg starts.
    last_sure_pos: Option<usize>,
    last_sure_seg_idx: usize,
}

impl SignalList {
    pub fn new(config: SignalSides) -> Self {
        Self {
            config,
            points: BTreeMap::new(),
            first_class: BTreeMap::new(),
            last_sure_pos: None,
            last_sure_seg_idx: 0,
        }
    }

    /// Target points in leg order.
    pub fn points(&self) -> impl Iterator<Item = &SignalPoint> + '_ {
        self.points.values()
    }

    pub fn get(&self, leg: usize) -> Option<&SignalPoint> {
        self.points.get(&leg)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// First-class candidates, including those that missed their filters.
    pub fn first_class(&self) -> impl Iterator<Item = &SignalPoint> + '_ {
        self.first_class.values()
    }

    pub fn of_type(&self, ty: SignalType) -> impl Iterator<Item = &SignalPoint> + '_ {
        self.points.values().filter(move |p| p.has_type(ty))
    }

    /// Re-run classification over segments that are not yet final.
    pub fn classify<L: Leg>(
        &mut self,
        legs: &[L],
        segments: &[Segment],
        pivots: &[Pivot],
        ctx: &BarContext<'_>,
    ) -> Result<()> {
        let floor = self.last_sure_pos;
        let keep = |p: &SignalPoint| floor.is_some_and(|f| p.bar <= f);
        self.points.retain(|_, p| keep(p));
        self.first_class.retain(|_, p| keep(p));

        let pending: Vec<&Segment> = segments
            .iter()
            .skip(self.last_sure_seg_idx)
            .filter(|seg| self.needs_classify(seg, legs))
            .collect();
        for seg in &pending {
            self.first_class_at(seg, legs, pivots, ctx)?;
        }
        for seg in &pending {
            self.second_class_after(seg, legs, segments, ctx)?;
        }
        for seg in &pending {
            self.third_class_around(seg, legs, segments, pivots, ctx)?;
        }

        self.update_last_pos(legs, segments);
        debug!("{} signal points after classification", self.points.len());
        Ok(())
    }

    fn needs_classify<L: Leg>(&self, seg: &Segment, legs: &[L]) -> bool {
        let end_bar = legs.get(seg.end_leg).map(Leg::end_bar).unwrap_or(0);
        self.last_sure_pos.map_or(true, |pos| end_bar > pos)
    }

    fn update_last_pos<L: Leg>(&mut self, legs: &[L], segments: &[Segment]) {
        match segments.iter().rev().find(|s| s.is_sure()) {
            Some(seg) => {
                self.last_sure_pos = legs.get(seg.end_leg).map(Leg::begin_bar);
                self.last_sure_seg_idx = seg.index;
            }
            None => {
                self.last_sure_pos = None;
                self.last_sure_seg_idx = 0;
            }
        }
    }

    fn add<L: Leg>(
        &mut self,
        ty: SignalType,
        leg: &L,
        related: Option<usize>,
        is_target: bool,
        features: Features,
        ctx: &BarContext<'_>,
    ) -> Result<()> {
        let is_buy = leg.is_down();
        if let Some(existing) = self.points.get_mut(&leg.index()) {
            if existing.is_buy != is_buy {
                return Err(ChanError::Invariant(format!(
                    "leg {} already carries a signal on the other side",
                    leg.index()
                )));
            }
            existing.add_type(ty, related)?;
            for (name, value) in features {
                existing.add_feature(name, value);
            }
            return Ok(());
        }
        let is_target = is_target && self.config.side(is_buy).wants(ty);
        if !is_target && !ty.is_first_class() {
            return Ok(());
        }
        let mut point = SignalPoint::new(leg, is_buy, ty, related, ctx);
        for (name, value) in features {
            point.add_feature(name, value);
        }
        debug!(
            "{} {} signal on leg {} (target={is_target})",
            if is_buy { "buy" } else { "sell" },
            ty,
            leg.index()
        );
        if ty.is_first_class() {
            self.first_class.insert(leg.index(), point.clone());
        }
        if is_target {
            self.points.insert(leg.index(), point);
        }
        Ok(())
    }

    fn first_class_at<L: Leg>(
        &mut self,
        seg: &Segment,
        legs: &[L],
        pivots: &[Pivot],
        ctx: &BarContext<'_>,
    ) -> Result<()> {
        let cfg = self.config.side(seg.is_down()).clone();
        let pivot_count = if cfg.bsp1_only_multileg_pivot {
            seg.multi_leg_pivot_count(pivots)
        } else {
            seg.pivots.len()
        };
        let is_target = cfg.min_pivot_count == 0 || pivot_count >= cfg.min_pivot_count;
        let last = seg.pivots.last().and_then(|&i| pivots.get(i));
        match last {
            Some(pivot)
                if !pivot.is_one_leg()
                    && (pivot.leg_out.is_some_and(|o| o >= seg.end_leg) || pivot.end_leg >= seg.end_leg)
                    && pivot.leg_in.is_some_and(|i| seg.end_leg > i + 2) =>
            {
                self.leave_pivot(seg, pivot, &cfg, legs, is_target, ctx)
            }
            _ => self.leave_trend(seg, &cfg, legs, is_target, ctx),
        }
    }

    /// First class: the segment's final leg leaves its last pivot.
    fn leave_pivot<L: Leg>(
        &mut self,
        seg: &Segment,
        pivot: &Pivot,
        cfg: &SignalConfig,
        legs: &[L],
        mut is_target: bool,
        ctx: &BarContext<'_>,
    ) -> Result<()> {
        let Some(end) = legs.get(seg.end_leg) else {
            return Ok(());
        };
        let (break_peak, _) = pivot.out_leg_is_peak(seg.end_leg, legs);
        if cfg.bsp1_peak && !break_peak {
            is_target = false;
        }
        let (diverges, rate) = pivot.is_divergence(cfg, Some(end), legs, ctx)?;
        if !diverges {
            is_target = false;
        }
        let mut features = Features::new();
        if let Some(rate) = rate {
            features.push(("divergence_rate", rate));
        }
        self.add(SignalType::T1, end, None, is_target, features, ctx)
    }

    /// First class without a pivot: the final leg makes a new extreme with
    /// less strength than the same-direction leg before it.
    fn leave_trend<L: Leg>(
        &mut self,
        seg: &Segment,
        cfg: &SignalConfig,
        legs: &[L],
        mut is_target: bool,
        ctx: &BarContext<'_>,
    ) -> Result<()> {
        let Some(last) = legs.get(seg.end_leg) else {
            return Ok(());
        };
        if last.direction() != seg.direction {
            return Ok(());
        }
        let Some(pre) = seg.end_leg.checked_sub(2).and_then(|i| legs.get(i)) else {
            // A lone opening leg can never hold a pivot, so the pivot count is
            // not required; with nothing to compare against only an
            // unconditional divergence passes.
            let is_target = cfg.divergence_rate.is_infinite();
            return self.add(SignalType::T1P, last, None, is_target, Features::new(), ctx);
        };
        if last.segment_index() != pre.segment_index() {
            return Ok(());
        }
        if (last.is_down() && last.low() > pre.low()) || (last.is_up() && last.high() < pre.high()) {
            return Ok(());
        }
        let in_metric = pre.metric(cfg.divergence_algo, false, ctx)?;
        let out_metric = last.metric(cfg.divergence_algo, true, ctx)?;
        if out_metric > cfg.divergence_rate * in_metric {
            is_target = false;
        }
        let features = vec![
            ("divergence_rate", out_metric / (in_metric + 1e-7)),
            ("bsp1_leg_amp", last.amplitude()),
            ("bsp1_leg_amp_rate", last.amplitude() / pre.amplitude()),
        ];
        self.add(SignalType::T1P, last, None, is_target, features, ctx)
    }

    fn second_class_after<L: Leg>(
        &mut self,
        seg: &Segment,
        legs: &[L],
        segments: &[Segment],
        ctx: &BarContext<'_>,
    ) -> Result<()> {
        let seg_cfg = self.config.side(seg.is_down());
        if !seg_cfg.wants(SignalType::T2) && !seg_cfg.wants(SignalType::T2S) {
            return Ok(());
        }
        let wants_t2s = seg_cfg.wants(SignalType::T2S);
        let (cfg, bsp1, break_idx, bsp2_idx) = if segments.len() > 1 {
            if seg.end_leg + 2 >= legs.len() {
                return Ok(());
            }
            (self.config.side(seg.is_down()).clone(), Some(seg.end_leg), seg.end_leg + 1, seg.end_leg + 2)
        } else {
            if legs.len() <= 1 {
                return Ok(());
            }
            (self.config.side(seg.is_up()).clone(), None, 0, 1)
        };
        let related = bsp1.filter(|b| self.first_class.contains_key(b));
        if cfg.bsp2_follows_1 && !bsp1.is_some_and(|b| self.points.contains_key(&b)) {
            return Ok(());
        }
        let (break_leg, bsp2) = (&legs[break_idx], &legs[bsp2_idx]);
        let retrace = bsp2.amplitude() / break_leg.amplitude();
        if retrace <= cfg.max_bsp2_rate {
            let features = vec![
                ("bsp2_retrace_rate", retrace),
                ("bsp2_break_leg_amp", break_leg.amplitude()),
                ("bsp2_leg_amp", bsp2.amplitude()),
            ];
            self.add(SignalType::T2, bsp2, related, true, features, ctx)?;
        } else if cfg.bsp2s_follows_2 {
            return Ok(());
        }
        if !wants_t2s {
            return Ok(());
        }
        self.second_class_similar(legs, segments, bsp2, break_leg, related, &cfg, ctx)
    }

    /// Later legs retracing into the same band as the second-class leg.
    #[allow(clippy::too_many_arguments)]
    fn second_class_similar<L: Leg>(
        &mut self,
        legs: &[L],
        segments: &[Segment],
        bsp2: &L,
        break_leg: &L,
        related: Option<usize>,
        cfg: &SignalConfig,
        ctx: &BarContext<'_>,
    ) -> Result<()> {
        let bsp2_seg = bsp2.segment_index().unwrap_or_default();
        let mut band = (bsp2.low(), bsp2.high());
        let mut bias = 2;
        while let Some(leg) = legs.get(bsp2.index() + bias) {
            let level = bias / 2;
            if cfg.max_bsp2s_level.is_some_and(|max| level > max) {
                break;
            }
            let leg_seg = leg.segment_index().unwrap_or_default();
            if leg_seg != bsp2_seg
                && (leg_seg + 1 < segments.len()
                    || leg_seg.saturating_sub(bsp2_seg) >= 2
                    || segments.get(bsp2_seg).is_some_and(Segment::is_sure))
            {
                break;
            }
            if !has_overlap(band.0, band.1, leg.low(), leg.high(), false) {
                break;
            }
            if bias == 2 {
                band = (band.0.max(leg.low()), band.1.min(leg.high()));
            }
            let past_break = (leg.is_down() && leg.low() < break_leg.low()) || (leg.is_up() && leg.high() > break_leg.high());
            if past_break {
                break;
            }
            let retrace = (leg.end_value() - break_leg.end_value()).abs() / break_leg.amplitude();
            if retrace > cfg.max_bsp2_rate {
                break;
            }
            let features = vec![
                ("bsp2s_retrace_rate", retrace),
                ("bsp2s_break_leg_amp", break_leg.amplitude()),
                ("bsp2s_leg_amp", leg.amplitude()),
                ("bsp2s_level", level as f64),
            ];
            self.add(SignalType::T2S, leg, related, true, features, ctx)?;
            bias += 2;
        }
        Ok(())
    }

    fn third_class_around<L: Leg>(
        &mut self,
        seg: &Segment,
        legs: &[L],
        segments: &[Segment],
        pivots: &[Pivot],
        ctx: &BarContext<'_>,
    ) -> Result<()> {
        let seg_cfg = self.config.side(seg.is_down());
        if !seg_cfg.wants(SignalType::T3A) && !seg_cfg.wants(SignalType::T3B) {
            return Ok(());
        }
        let (cfg, bsp1, next_seg, next_idx) = if segments.len() > 1 {
            (
                self.config.side(seg.is_down()).clone(),
                Some(seg.end_leg),
                segments.get(seg.index + 1),
                seg.index + 1,
            )
        } else {
            (self.config.side(seg.is_up()).clone(), None, Some(seg), seg.index)
        };
        let related = bsp1.filter(|b| self.first_class.contains_key(b));
        if cfg.bsp3_follows_1 && !bsp1.is_some_and(|b| self.points.contains_key(&b)) {
            return Ok(());
        }
        if let Some(next) = next_seg {
            self.third_class_after(legs, segments, pivots, next, next_idx, bsp1, related, &cfg, ctx)?;
        }
        self.third_class_before(legs, segments, pivots, seg, next_seg, next_idx, bsp1, related, &cfg, ctx)
    }

    /// Third class after the first-class point: a leg leaves the next
    /// segment's first pivot and does not come back into it.
    #[allow(clippy::too_many_arguments)]
    fn third_class_after<L: Leg>(
        &mut self,
        legs: &[L],
        segments: &[Segment],
        pivots: &[Pivot],
        next: &Segment,
        next_idx: usize,
        bsp1: Option<usize>,
        related: Option<usize>,
        cfg: &SignalConfig,
        ctx: &BarContext<'_>,
    ) -> Result<()> {
        let Some(first) = next.first_multi_leg_pivot(pivots) else {
            return Ok(());
        };
        let expected_in = bsp1.map_or(0, |b| b + 1);
        if cfg.strict_bsp3 && first.leg_in != Some(expected_in) {
            return Ok(());
        }
        let Some(bsp3) = first.leg_out.and_then(|o| legs.get(o + 1)) else {
            return Ok(());
        };
        match bsp3.parent_segment() {
            None if next.index + 1 != segments.len() => return Ok(()),
            Some(parent) if parent != next.index && segments.get(parent).is_some_and(|s| s.leg_count() >= 3) => {
                return Ok(());
            }
            _ => {}
        }
        if bsp3.direction() == next.direction {
            return Ok(());
        }
        if bsp3.segment_index() != Some(next_idx) && next_idx < segments.len().saturating_sub(2) {
            return Ok(());
        }
        if back_into(bsp3, first) {
            return Ok(());
        }
        if cfg.bsp3_peak && !breaks_pivot_peak(bsp3, first) {
            return Ok(());
        }
        let features = vec![
            ("bsp3_pivot_height", (first.high - first.low) / first.low),
            ("bsp3_leg_amp", bsp3.amplitude()),
        ];
        self.add(SignalType::T3A, bsp3, related, true, features, ctx)
    }

    /// Third class before the first-class point: after the segment's last
    /// pivot, the first pullback that stays out of it.
    #[allow(clippy::too_many_arguments)]
    fn third_class_before<L: Leg>(
        &mut self,
        legs: &[L],
        segments: &[Segment],
        pivots: &[Pivot],
        seg: &Segment,
        next_seg: Option<&Segment>,
        next_idx: usize,
        bsp1: Option<usize>,
        related: Option<usize>,
        cfg: &SignalConfig,
        ctx: &BarContext<'_>,
    ) -> Result<()> {
        let Some(cmp) = seg.final_multi_leg_pivot(pivots) else {
            return Ok(());
        };
        let Some(bsp1) = bsp1 else {
            return Ok(());
        };
        if cfg.strict_bsp3 && cmp.leg_out != Some(bsp1) {
            return Ok(());
        }
        let end = third_class_end(next_seg, segments, pivots);
        for leg in legs.iter().skip(bsp1 + 2).step_by(2) {
            if end.is_some_and(|e| leg.index() > e) {
                break;
            }
            let leg_seg = leg.segment_index().unwrap_or_default();
            if leg_seg != next_idx && leg_seg + 1 < segments.len() {
                break;
            }
            if back_into(leg, cmp) {
                continue;
            }
            let features = vec![
                ("bsp3_pivot_height", (cmp.high - cmp.low) / cmp.low),
                ("bsp3_leg_amp", leg.amplitude()),
            ];
            self.add(SignalType::T3B, leg, related, true, features, ctx)?;
            break;
        }
        Ok(())
    }
}

/// The leg comes back into the pivot's band.
fn back_into<L: Leg>(leg: &L, pivot: &Pivot) -> bool {
    (leg.is_down() && leg.low() < pivot.high) || (leg.is_up() && leg.high() > pivot.low)
}

/// The leg stays beyond the pivot's furthest peak.
fn breaks_pivot_peak<L: Leg>(leg: &L, pivot: &Pivot) -> bool {
    (leg.is_down() && leg.high() >= pivot.peak_high) || (leg.is_up() && leg.low() <= pivot.peak_low)
}

/// Last leg that may carry a before-pivot third-class point, `None` for no limit.
fn third_class_end(seg: Option<&Segment>, segments: &[Segment], pivots: &[Pivot]) -> Option<usize> {
    let seg = seg?;
    let is_last = seg.index + 1 >= segments.len();
    if seg.multi_leg_pivot_count(pivots) == 0 && is_last {
        return None;
    }
    let out = seg.multi_leg_pivots(pivots).find_map(|p| p.leg_out);
    Some(out.unwrap_or(seg.end_leg.saturating_sub(1)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LeftMethod, PivotConfig, SegmentAlgorithm, SegmentConfig};
    use crate::leg::test_legs::{legs_through, TestLeg};
    use crate::pivot::PivotList;
    use crate::segment::SegmentList;

    struct Built {
        legs: Vec<TestLeg>,
        segments: SegmentList,
        pivots: PivotList,
    }

    /// Up with a pivot to 20, down to 8, up to 13.
    fn build() -> Built {
        let mut legs = legs_through(&[10.0, 14.0, 12.0, 15.0, 13.0, 20.0, 16.0, 18.0, 13.0, 15.0, 8.0, 11.0, 9.0, 13.0]);
        let mut segments = SegmentList::new(SegmentConfig {
            algorithm: SegmentAlgorithm::Chan,
            left_method: LeftMethod::Peak,
        });
        segments.update(&mut legs).unwrap();
        let mut pivots = PivotList::new(PivotConfig::default());
        pivots.compute(&legs, segments.as_slice());
        pivots.reconcile(&legs, segments.legs_mut()).unwrap();
        Built { legs, segments, pivots }
    }

    fn classify(built: &Built, list: &mut SignalList) {
        let ctx = BarContext::new(&[], &[]);
        list.classify(&built.legs, built.segments.as_slice(), built.pivots.as_slice(), &ctx)
            .unwrap();
    }

    #[test]
    fn test_first_and_second_class_sell() {
        let built = build();
        let mut list = SignalList::new(SignalSides::default());
        classify(&built, &mut list);

        let t1 = list.get(4).unwrap();
        assert!(!t1.is_buy);
        assert_eq!(t1.types, vec![SignalType::T1]);
        assert!((t1.feature("divergence_rate").unwrap() - 1.75).abs() < 1e-12);
        assert_eq!(t1.feature("leg_amp"), Some(7.0));

        let t2 = list.get(6).unwrap();
        assert_eq!(t2.types, vec![SignalType::T2]);
        assert_eq!(t2.related, Some(4));
        assert_eq!(t2.feature("bsp2_retrace_rate"), Some(0.5));
    }

    #[test]
    fn test_untargeted_first_class_kept_aside() {
        let built = build();
        let mut list = SignalList::new(SignalSides::default());
        classify(&built, &mut list);
        // the down segment has no pivot, so its end is only a candidate
        assert!(list.get(9).is_none());
        assert!(list.first_class().any(|p| p.leg == 9 && p.has_type(SignalType::T1P)));
    }

    #[test]
    fn test_opening_leg_is_target_without_pivots() {
        // one down leg and the rebound: the seed segment ends at leg 0
        let mut legs = legs_through(&[20.0, 10.0, 13.0]);
        let mut segments = SegmentList::new(SegmentConfig {
            algorithm: SegmentAlgorithm::Chan,
            left_method: LeftMethod::Peak,
        });
        segments.update(&mut legs).unwrap();
        let mut pivots = PivotList::new(PivotConfig::default());
        pivots.compute(&legs, segments.as_slice());
        pivots.reconcile(&legs, segments.legs_mut()).unwrap();
        let built = Built { legs, segments, pivots };

        let mut list = SignalList::new(SignalSides::default());
        classify(&built, &mut list);
        let point = list.get(0).unwrap();
        assert!(point.is_buy);
        assert_eq!(point.types, vec![SignalType::T1P]);

        let finite = SignalConfig {
            divergence_rate: 2.0,
            ..SignalConfig::default()
        };
        let mut list = SignalList::new(SignalSides::both(finite));
        classify(&built, &mut list);
        assert!(list.get(0).is_none());
    }

    #[test]
    fn test_divergence_filter_blocks_stronger_exit() {
        let built = build();
        let cfg = SignalConfig {
            divergence_rate: 0.9,
            ..SignalConfig::default()
        };
        let mut list = SignalList::new(SignalSides::both(cfg));
        classify(&built, &mut list);
        // exit leg is 7 against 4 on entry
        assert!(list.get(4).is_none());
        assert!(list.get(6).is_none());
    }

    #[test]
    fn test_classify_is_idempotent() {
        let built = build();
        let mut list = SignalList::new(SignalSides::default());
        classify(&built, &mut list);
        let before: Vec<SignalPoint> = list.points().cloned().collect();
        classify(&built, &mut list);
        let after: Vec<SignalPoint> = list.points().cloned().collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_types_accumulate_without_duplicates() {
        let legs = legs_through(&[10.0, 14.0]);
        let ctx = BarContext::new(&[], &[]);
        let mut point = SignalPoint::new(&legs[0], false, SignalType::T2, Some(3), &ctx);
        point.add_type(SignalType::T3B, Some(3)).unwrap();
        point.add_type(SignalType::T3B, None).unwrap();
        assert_eq!(point.type_label(), "2,3b");
        point.add_feature("leg_amp", 1.0);
        assert_eq!(point.feature("leg_amp"), Some(1.0));
    }

    #[test]
    fn test_conflicting_relation_is_invariant_error() {
        let legs = legs_through(&[10.0, 14.0]);
        let ctx = BarContext::new(&[], &[]);
        let mut point = SignalPoint::new(&legs[0], false, SignalType::T2, Some(3), &ctx);
        let err = point.add_type(SignalType::T3A, Some(5)).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Invariant);
    }

    #[test]
    fn test_side_conflict_is_invariant_error() {
        let legs = legs_through(&[10.0, 14.0, 12.0]);
        let ctx = BarContext::new(&[], &[]);
        let mut list = SignalList::new(SignalSides::default());
        list.add(SignalType::T1, &legs[0], None, true, Features::new(), &ctx).unwrap();
        let mut flipped = legs[1].clone();
        flipped.index = 0;
        let err = list
            .add(SignalType::T2, &flipped, None, true, Features::new(), &ctx)
            .unwrap_err();
        assert!(matches!(err, ChanError::Invariant(_)));
    }
}
