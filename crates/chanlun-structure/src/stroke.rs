//! Strokes between confirmed opposite fractals.
//!
//! The builder is driven by the merged-candle engine: each time a candle opens,
//! the candle before it may have become a fractal, and [`StrokeList::update`]
//! decides whether that fractal extends the last stroke, starts a new one, or
//! is ignored. Only the trailing stroke is ever revised.
//!
//! In stepwise mode a provisional stroke runs from the last confirmed fractal
//! to the newest candle. It is deleted and rebuilt on every bar; its
//! `sure_end` list remembers the confirmed ends it temporarily replaced so the
//! confirmed structure can be restored exactly.

use crate::candle::MergedCandle;
use crate::config::{DivergenceAlgo, FxCheck, StrokeAlgorithm, StrokeConfig};
use crate::error::Result;
use crate::leg::{BarContext, Leg};
use crate::metric::StrokeBars;
use crate::types::{Direction, Fractal};

/// Which rule accepted a stroke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StrokeKind {
    /// Strict merged-candle span.
    Strict,
    /// Relaxed span with a minimum raw bar count.
    Relaxed,
    /// Fractal pair only.
    FxOnly,
    /// First stroke, anchored on the first merged candle.
    Anchor,
}

/// A directional move between two fractal candles.
#[derive(Debug, Clone, PartialEq)]
pub struct Stroke {
    pub index: usize,
    pub direction: Direction,
    pub kind: StrokeKind,
    pub begin_candle: usize,
    pub end_candle: usize,
    is_sure: bool,
    /// Confirmed ends displaced by a provisional extension, oldest first.
    sure_end: Vec<usize>,
    begin_value: f64,
    end_value: f64,
    begin_bar: usize,
    end_bar: usize,
    segment_index: Option<usize>,
    parent_segment: Option<usize>,
}

impl Stroke {
    fn new(
        index: usize,
        begin_candle: usize,
        end_candle: usize,
        direction: Direction,
        is_sure: bool,
        kind: StrokeKind,
        ctx: &BarContext<'_>,
    ) -> Self {
        let mut stroke = Self {
            index,
            direction,
            kind,
            begin_candle,
            end_candle,
            is_sure,
            sure_end: Vec::new(),
            begin_value: 0.0,
            end_value: 0.0,
            begin_bar: 0,
            end_bar: 0,
            segment_index: None,
            parent_segment: None,
        };
        stroke.refresh(ctx);
        stroke
    }

    /// Re-read prices and extreme bars from the candles.
    pub fn refresh(&mut self, ctx: &BarContext<'_>) {
        let (Some(begin), Some(end)) = (ctx.candles.get(self.begin_candle), ctx.candles.get(self.end_candle)) else {
            return;
        };
        let up = self.direction.is_up();
        self.begin_value = if up { begin.low } else { begin.high };
        self.end_value = if up { end.high } else { end.low };
        self.begin_bar = begin.peak_bar(ctx.bars, !up);
        self.end_bar = end.peak_bar(ctx.bars, up);
    }

    fn move_end(&mut self, candle: usize, ctx: &BarContext<'_>) {
        self.end_candle = candle;
        self.refresh(ctx);
    }

    fn extend_provisionally(&mut self, candle: usize, ctx: &BarContext<'_>) {
        self.sure_end.push(self.end_candle);
        self.move_end(candle, ctx);
        self.is_sure = false;
    }

    fn restore(&mut self, candle: usize, ctx: &BarContext<'_>) {
        self.is_sure = true;
        self.sure_end.clear();
        self.move_end(candle, ctx);
    }

    /// Number of merged candles spanned, both ends included.
    pub fn candle_count(&self) -> usize {
        self.end_candle - self.begin_candle + 1
    }

    /// Number of raw bars between the two extremes, both included.
    pub fn bar_count(&self) -> usize {
        self.end_bar.saturating_sub(self.begin_bar) + 1
    }

    fn bars<'a>(&self, ctx: &BarContext<'a>) -> StrokeBars<'a> {
        let first = ctx.candles.get(self.begin_candle).map(|c| c.first_bar).unwrap_or(0);
        let last = ctx
            .candles
            .get(self.end_candle)
            .map(|c| c.last_bar)
            .unwrap_or(first)
            .min(ctx.bars.len().saturating_sub(1));
        let span = if ctx.bars.is_empty() || first > last {
            &ctx.bars[0..0]
        } else {
            &ctx.bars[first..=last]
        };
        StrokeBars {
            direction: self.direction,
            span,
            begin: self.begin_bar,
            end: self.end_bar,
        }
    }
}

impl Leg for Stroke {
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

    fn metric(&self, algo: DivergenceAlgo, reverse: bool, ctx: &BarContext<'_>) -> Result<f64> {
        Ok(self.bars(ctx).metric(algo, reverse))
    }
}

/// Whether every candle strictly between `last_end` and `cur_end` stays inside
/// the new extreme at `cur_end`.
fn end_is_peak(candles: &[MergedCandle], last_end: usize, cur_end: usize) -> bool {
    let between = candles.get(last_end + 1..cur_end).unwrap_or(&[]);
    match candles[last_end].fractal {
        Fractal::Bottom => {
            let threshold = candles[cur_end].high;
            between.iter().all(|c| c.high <= threshold)
        }
        Fractal::Top => {
            let threshold = candles[cur_end].low;
            between.iter().all(|c| c.low >= threshold)
        }
        Fractal::None => true,
    }
}

/// Whether the fractal at `start` and the candle at `end` are far enough
/// apart in price under `method`.
fn check_fx_valid(candles: &[MergedCandle], start: usize, end: usize, method: FxCheck, for_virtual: bool) -> bool {
    if end <= start || start == 0 {
        return false;
    }
    let (Some(s_pre), Some(s), Some(s_next)) = (candles.get(start - 1), candles.get(start), candles.get(start + 1)) else {
        return false;
    };
    let e_pre = &candles[end - 1];
    let e = &candles[end];
    let e_next = candles.get(end + 1);

    match s.fractal {
        Fractal::Top => {
            if for_virtual && e.direction != Direction::Down {
                return false;
            }
            let (end_high, start_low) = match method {
                FxCheck::Half => (e_pre.high.max(e.high), s.low.min(s_next.low)),
                FxCheck::Loss => (e.high, s.low),
                FxCheck::Strict | FxCheck::Totally => {
                    let mut high = e_pre.high.max(e.high);
                    if !for_virtual {
                        if let Some(n) = e_next {
                            high = high.max(n.high);
                        }
                    }
                    (high, s_pre.low.min(s.low).min(s_next.low))
                }
            };
            if method == FxCheck::Totally {
                s.low > end_high
            } else {
                s.high > end_high && e.low < start_low
            }
        }
        Fractal::Bottom => {
            if for_virtual && e.direction != Direction::Up {
                return false;
            }
            let (end_low, start_high) = match method {
                FxCheck::Half => (e_pre.low.min(e.low), s.high.max(s_next.high)),
                FxCheck::Loss => (e.low, s.high),
                FxCheck::Strict | FxCheck::Totally => {
                    let mut low = e_pre.low.min(e.low);
                    if !for_virtual {
                        if let Some(n) = e_next {
                            low = low.min(n.low);
                        }
                    }
                    (low, s_pre.high.max(s.high).max(s_next.high))
                }
            };
            if method == FxCheck::Totally {
                s.high < end_low
            } else {
                s.low < end_low && e.high > start_high
            }
        }
        Fractal::None => false,
    }
}

/// Stroke builder for one timeframe.
#[derive(Debug, Clone, PartialEq)]
pub struct StrokeList {
    config: StrokeConfig,
    strokes: Vec<Stroke>,
    /// Candle that ended the last stroke.
    last_end: Option<usize>,
    /// Fractal candles seen before the first stroke exists.
    free_candles: Vec<usize>,
}

impl StrokeList {
    pub fn new(config: StrokeConfig) -> Self {
        Self {
            config,
            strokes: Vec::new(),
            last_end: None,
            free_candles: Vec::new(),
        }
    }

    pub fn as_slice(&self) -> &[Stroke] {
        &self.strokes
    }

    pub fn legs_mut(&mut self) -> &mut Vec<Stroke> {
        &mut self.strokes
    }

    pub fn len(&self) -> usize {
        self.strokes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strokes.is_empty()
    }

    pub fn last(&self) -> Option<&Stroke> {
        self.strokes.last()
    }

    /// Process a newly closed candle.
    ///
    /// `klc` is the second-to-last candle (whose fractal label just became
    /// final) and `last` the newest one. Returns whether the strokes changed.
    pub fn update(&mut self, ctx: &BarContext<'_>, klc: usize, last: usize, cal_virtual: bool) -> bool {
        let changed = self.update_sure(ctx, klc);
        if cal_virtual {
            let virtual_changed = self.try_add_virtual(ctx, last, false);
            changed || virtual_changed
        } else {
            changed
        }
    }

    /// Re-read prices of the trailing strokes after candles changed.
    pub fn refresh_tail(&mut self, ctx: &BarContext<'_>) {
        let from = self.strokes.len().saturating_sub(2);
        for stroke in &mut self.strokes[from..] {
            stroke.refresh(ctx);
        }
    }

    fn last_end_bar(&self) -> Option<usize> {
        self.strokes.last().map(|s| s.end_bar)
    }

    fn update_sure(&mut self, ctx: &BarContext<'_>, klc: usize) -> bool {
        let before = self.last_end_bar();
        self.delete_virtual(ctx);
        let fractal = ctx.candles[klc].fractal;
        if fractal == Fractal::None {
            return before != self.last_end_bar();
        }
        let Some(last_end) = self.last_end.filter(|_| !self.strokes.is_empty()) else {
            return self.try_create_first(ctx, klc);
        };
        if fractal == ctx.candles[last_end].fractal {
            return self.try_update_end(ctx, klc, false);
        }
        if self.can_make_stroke(ctx.candles, klc, last_end, false) {
            self.push_stroke(ctx, last_end, klc, true);
            self.last_end = Some(klc);
            log::trace!("stroke {} confirmed at candle {}", self.strokes.len() - 1, klc);
            return true;
        }
        if self.update_peak(ctx, klc, false) {
            return true;
        }
        before != self.last_end_bar()
    }

    /// Remove the provisional stroke, restoring any confirmed ends it displaced.
    pub fn delete_virtual(&mut self, ctx: &BarContext<'_>) {
        if let Some(last) = self.strokes.last_mut().filter(|s| !s.is_sure) {
            let sure_end = std::mem::take(&mut last.sure_end);
            if let Some((&first, rest)) = sure_end.split_first() {
                last.restore(first, ctx);
                let mut end = first;
                for &next in rest {
                    self.push_stroke(ctx, end, next, true);
                    end = next;
                }
            } else {
                self.strokes.pop();
            }
        }
        self.last_end = self.strokes.last().map(|s| s.end_candle);
    }

    /// Add or extend a provisional stroke ending at `klc`.
    pub fn try_add_virtual(&mut self, ctx: &BarContext<'_>, klc: usize, need_del_end: bool) -> bool {
        if need_del_end {
            self.delete_virtual(ctx);
        }
        let Some(last) = self.strokes.last() else {
            return false;
        };
        let last_end = last.end_candle;
        if klc == last_end {
            return false;
        }
        let candle = &ctx.candles[klc];
        let end = &ctx.candles[last_end];
        if (last.is_up() && candle.high >= end.high) || (last.is_down() && candle.low <= end.low) {
            if let Some(last) = self.strokes.last_mut() {
                last.extend_provisionally(klc, ctx);
            }
            return true;
        }
        let mut tmp = klc;
        while tmp > last_end {
            if self.can_make_stroke(ctx.candles, tmp, last_end, true) {
                self.push_stroke(ctx, last_end, tmp, false);
                return true;
            }
            if self.update_peak(ctx, tmp, true) {
                return true;
            }
            tmp -= 1;
        }
        false
    }

    fn try_create_first(&mut self, ctx: &BarContext<'_>, klc: usize) -> bool {
        let fractal = ctx.candles[klc].fractal;
        let pair = self
            .free_candles
            .iter()
            .copied()
            .filter(|&free| ctx.candles[free].fractal != fractal)
            .find(|&free| self.can_make_stroke(ctx.candles, klc, free, false));
        if let Some(free) = pair {
            self.push_stroke(ctx, free, klc, true);
            self.last_end = Some(klc);
            return true;
        }
        if self.try_anchor(ctx, klc) {
            self.last_end = Some(klc);
            return true;
        }
        self.free_candles.push(klc);
        self.last_end = Some(klc);
        false
    }

    /// First stroke from the first merged candle, which has no fractal label.
    ///
    /// Accepted when the first candle is the opposite extreme of everything up
    /// to `klc` and the span rule holds.
    fn try_anchor(&mut self, ctx: &BarContext<'_>, klc: usize) -> bool {
        let candles = ctx.candles;
        let Some(direction) = candles[klc].fractal.leg_direction().map(Direction::opposite) else {
            return false;
        };
        if klc == 0 || !self.satisfy_span(candles, klc, 0) {
            return false;
        }
        let anchor = &candles[0];
        let window_end = (klc + 1).min(candles.len() - 1);
        let valid = match direction {
            Direction::Down => {
                candles[1..=window_end].iter().all(|c| c.high < anchor.high)
                    && candles[..klc].iter().all(|c| c.low > candles[klc].low)
            }
            Direction::Up => {
                candles[1..=window_end].iter().all(|c| c.low > anchor.low)
                    && candles[..klc].iter().all(|c| c.high < candles[klc].high)
            }
        };
        if valid {
            let index = self.strokes.len();
            self.strokes
                .push(Stroke::new(index, 0, klc, direction, true, StrokeKind::Anchor, ctx));
        }
        valid
    }

    fn push_stroke(&mut self, ctx: &BarContext<'_>, begin: usize, end: usize, is_sure: bool) {
        let direction = ctx.candles[begin].fractal.leg_direction().unwrap_or_else(|| {
            if ctx.candles[end].high > ctx.candles[begin].high {
                Direction::Up
            } else {
                Direction::Down
            }
        });
        let kind = match (self.config.algorithm, self.config.strict) {
            (StrokeAlgorithm::Fx, _) => StrokeKind::FxOnly,
            (StrokeAlgorithm::Normal, true) => StrokeKind::Strict,
            (StrokeAlgorithm::Normal, false) => StrokeKind::Relaxed,
        };
        let index = self.strokes.len();
        self.strokes
            .push(Stroke::new(index, begin, end, direction, is_sure, kind, ctx));
    }

    fn can_make_stroke(&self, candles: &[MergedCandle], klc: usize, last_end: usize, for_virtual: bool) -> bool {
        let span_ok = self.config.algorithm == StrokeAlgorithm::Fx || self.satisfy_span(candles, klc, last_end);
        span_ok
            && check_fx_valid(candles, last_end, klc, self.config.fx_check, for_virtual)
            && (!self.config.end_is_peak || end_is_peak(candles, last_end, klc))
    }

    fn satisfy_span(&self, candles: &[MergedCandle], klc: usize, last_end: usize) -> bool {
        let span = self.candle_span(candles, klc, last_end);
        if self.config.strict {
            return span >= 4;
        }
        let mut bar_count = 0;
        let mut k = last_end + 1;
        loop {
            let Some(c) = candles.get(k) else {
                return false;
            };
            bar_count += c.bar_count();
            if k + 1 >= candles.len() {
                return false;
            }
            if k + 1 < klc {
                k += 1;
            } else {
                break;
            }
        }
        span >= 3 && bar_count >= 3
    }

    fn candle_span(&self, candles: &[MergedCandle], klc: usize, last_end: usize) -> usize {
        let span = klc.saturating_sub(last_end);
        if !self.config.gap_as_candle || span >= 4 {
            return span;
        }
        let gaps = (last_end..klc)
            .filter(|&k| candles.get(k + 1).map(|next| candles[k].has_gap_with(next)).unwrap_or(false))
            .count();
        span + gaps
    }

    fn can_update_peak(&self, candles: &[MergedCandle], klc: usize) -> bool {
        if self.config.allow_sub_peak || self.strokes.len() < 2 {
            return false;
        }
        let last = &self.strokes[self.strokes.len() - 1];
        let prev = &self.strokes[self.strokes.len() - 2];
        let c = &candles[klc];
        if last.is_down() && c.high < last.begin_value {
            return false;
        }
        if last.is_up() && c.low > last.begin_value {
            return false;
        }
        if !end_is_peak(candles, prev.begin_candle, klc) {
            return false;
        }
        if last.is_down() && last.end_value < prev.begin_value {
            return false;
        }
        if last.is_up() && last.end_value > prev.begin_value {
            return false;
        }
        true
    }

    /// Drop the last stroke and extend the one before it to `klc`.
    fn update_peak(&mut self, ctx: &BarContext<'_>, klc: usize, for_virtual: bool) -> bool {
        if !self.can_update_peak(ctx.candles, klc) {
            return false;
        }
        let Some(removed) = self.strokes.pop() else {
            return false;
        };
        if !self.try_update_end(ctx, klc, for_virtual) {
            self.strokes.push(removed);
            return false;
        }
        if for_virtual {
            if let Some(last) = self.strokes.last_mut() {
                last.sure_end.push(removed.end_candle);
            }
        }
        true
    }

    fn try_update_end(&mut self, ctx: &BarContext<'_>, klc: usize, for_virtual: bool) -> bool {
        let c = &ctx.candles[klc];
        let Some(last) = self.strokes.last_mut() else {
            return false;
        };
        let (top, bottom) = if for_virtual {
            (c.direction == Direction::Up, c.direction == Direction::Down)
        } else {
            (c.fractal == Fractal::Top, c.fractal == Fractal::Bottom)
        };
        let extends = (last.is_up() && top && c.high >= last.end_value)
            || (last.is_down() && bottom && c.low <= last.end_value);
        if !extends {
            return false;
        }
        if for_virtual {
            last.extend_provisionally(klc, ctx);
        } else {
            last.move_end(klc, ctx);
        }
        self.last_end = Some(klc);
        true
    }
}
