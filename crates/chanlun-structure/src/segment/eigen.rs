//! Feature sequences: the counter-direction legs of a forming segment, merged
//! under the inclusion rule. A top (bottom) fractal in the feature sequence of
//! an upward (downward) segment marks where the segment can end.

use crate::leg::Leg;
use crate::types::{fractal_of, merge_range, test_combine, CombineOutcome, Direction, EqualPeak, Fractal};

/// One merged element of a feature sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct Eigen {
    pub direction: Direction,
    pub high: f64,
    pub low: f64,
    /// Leg indices merged into this element, in order.
    pub legs: Vec<usize>,
    pub fractal: Fractal,
    /// The element leaves a price gap with the one before it.
    pub gap: bool,
}

impl Eigen {
    fn new<L: Leg>(leg: &L, direction: Direction) -> Self {
        Self {
            direction,
            high: leg.high(),
            low: leg.low(),
            legs: vec![leg.index()],
            fractal: Fractal::None,
            gap: false,
        }
    }

    fn try_add<L: Leg>(&mut self, leg: &L, exclude_included: bool, equal: EqualPeak) -> CombineOutcome {
        let outcome = test_combine(self.high, self.low, leg.high(), leg.low(), exclude_included, equal);
        if outcome == CombineOutcome::Combine {
            let (high, low) = merge_range(self.direction, (self.high, self.low), (leg.high(), leg.low()));
            self.high = high;
            self.low = low;
            self.legs.push(leg.index());
        }
        outcome
    }

    fn update_fractal(&mut self, pre: &Eigen, next: &Eigen, exclude_included: bool, equal: EqualPeak) {
        self.fractal = fractal_of(
            (pre.high, pre.low),
            (self.high, self.low),
            (next.high, next.low),
            exclude_included,
            equal,
        );
        self.gap = match self.fractal {
            Fractal::Top => pre.high < self.low,
            Fractal::Bottom => pre.low > self.high,
            Fractal::None => false,
        };
    }

    /// The segment leg ending at this element's extreme: the leg just before
    /// the counter leg holding it.
    fn peak_leg<L: Leg>(&self, legs: &[L]) -> usize {
        let down_segment = self.legs.first().and_then(|&i| legs.get(i)).map(Leg::is_up).unwrap_or(false);
        let peak = self
            .legs
            .iter()
            .rev()
            .copied()
            .find(|&i| {
                legs.get(i)
                    .map(|leg| if down_segment { leg.low() == self.low } else { leg.high() == self.high })
                    .unwrap_or(false)
            })
            .or_else(|| self.legs.last().copied())
            .unwrap_or(0);
        peak.saturating_sub(1)
    }
}

/// Three-element fractal detector over one segment direction's feature sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct EigenFx {
    /// Direction of the segment whose end is sought.
    pub direction: Direction,
    exclude_included: bool,
    elements: [Option<Eigen>; 3],
    /// Every leg offered since the last full reset.
    legs: Vec<usize>,
    /// Last leg that confirmed the fractal.
    last_evidence: Option<usize>,
}

impl EigenFx {
    pub fn new(direction: Direction, exclude_included: bool) -> Self {
        Self {
            direction,
            exclude_included,
            elements: [None, None, None],
            legs: Vec::new(),
            last_evidence: None,
        }
    }

    pub fn clear(&mut self) {
        self.elements = [None, None, None];
        self.legs.clear();
    }

    /// A second element exists, so the first is a valid starting extreme.
    #[inline]
    pub fn has_second(&self) -> bool {
        self.elements[1].is_some()
    }

    /// Offer the next counter-direction leg. Returns true once the fractal is formed.
    pub fn add<L: Leg>(&mut self, leg: &L, legs: &[L]) -> bool {
        self.legs.push(leg.index());
        match &self.elements {
            [None, _, _] => {
                self.elements[0] = Some(Eigen::new(leg, self.direction));
                false
            }
            [Some(_), None, _] => self.treat_second(leg, legs),
            [Some(_), Some(_), None] => self.treat_third(leg, legs),
            _ => false,
        }
    }

    fn treat_second<L: Leg>(&mut self, leg: &L, legs: &[L]) -> bool {
        let Some(first) = self.elements[0].as_mut() else {
            return false;
        };
        if first.try_add(leg, self.exclude_included, EqualPeak::Off) == CombineOutcome::Combine {
            return false;
        }
        let second = Eigen::new(leg, self.direction);
        let retreats = match self.direction {
            Direction::Up => second.high < first.high,
            Direction::Down => second.low > first.low,
        };
        self.elements[1] = Some(second);
        if retreats {
            return self.reset(legs);
        }
        false
    }

    fn treat_third<L: Leg>(&mut self, leg: &L, legs: &[L]) -> bool {
        self.last_evidence = Some(leg.index());
        let equal = match (self.exclude_included, leg.direction()) {
            (false, _) => EqualPeak::Off,
            (true, Direction::Down) => EqualPeak::Top,
            (true, Direction::Up) => EqualPeak::Bottom,
        };
        let outcome = match self.elements[1].as_mut() {
            Some(second) => second.try_add(leg, false, equal),
            None => return false,
        };
        if outcome == CombineOutcome::Combine {
            return false;
        }
        let direction = if outcome == CombineOutcome::Up { Direction::Up } else { Direction::Down };
        self.elements[2] = Some(Eigen::new(leg, direction));
        if !self.actual_break(legs) {
            return self.reset(legs);
        }
        if let [Some(first), Some(second), Some(third)] = &mut self.elements {
            second.update_fractal(first, third, self.exclude_included, equal);
            let wanted = match self.direction {
                Direction::Up => Fractal::Top,
                Direction::Down => Fractal::Bottom,
            };
            if second.fractal == wanted {
                return true;
            }
        }
        self.reset(legs)
    }

    /// Whether the third element really breaks past the second, either
    /// directly or through the leg two after it.
    fn actual_break<L: Leg>(&mut self, legs: &[L]) -> bool {
        if !self.exclude_included {
            return true;
        }
        let (Some(second), Some(third)) = (&self.elements[1], &self.elements[2]) else {
            return false;
        };
        let Some(second_last) = second.legs.last().and_then(|&i| legs.get(i)) else {
            return false;
        };
        let direct = match self.direction {
            Direction::Up => third.low < second_last.low(),
            Direction::Down => third.high > second_last.high(),
        };
        if direct {
            return true;
        }
        let Some(&first_of_third) = third.legs.first() else {
            return false;
        };
        let (Some(breaker), Some(follow)) = (legs.get(first_of_third), legs.get(first_of_third + 2)) else {
            return false;
        };
        let broken = match breaker.direction() {
            Direction::Down => follow.low() < breaker.low(),
            Direction::Up => follow.high() > breaker.high(),
        };
        if broken {
            self.last_evidence = Some(follow.index());
        }
        broken
    }

    /// Drop the first element and replay.
    fn reset<L: Leg>(&mut self, legs: &[L]) -> bool {
        let replay: Vec<usize> = self.legs.iter().skip(1).copied().collect();
        if self.exclude_included {
            self.clear();
            for i in replay {
                if let Some(leg) = legs.get(i) {
                    if self.add(leg, legs) {
                        return true;
                    }
                }
            }
        } else {
            let second_begin = self.elements[1].as_ref().and_then(|e| e.legs.first().copied()).unwrap_or(0);
            self.elements[0] = self.elements[1].take();
            self.elements[1] = self.elements[2].take();
            self.legs = replay.into_iter().filter(|&i| i >= second_begin).collect();
        }
        false
    }

    /// The segment leg at the fractal's extreme.
    pub fn peak_leg<L: Leg>(&self, legs: &[L]) -> usize {
        self.elements[1].as_ref().map(|e| e.peak_leg(legs)).unwrap_or(0)
    }

    /// Second leg offered to this detector.
    pub fn second_leg(&self) -> Option<usize> {
        self.legs.get(1).copied()
    }

    /// Last leg of the third element.
    pub fn tail_leg(&self) -> Option<usize> {
        self.elements[2].as_ref().and_then(|e| e.legs.last().copied())
    }

    /// Every leg involved, including the confirming one, is sure.
    pub fn all_legs_sure<L: Leg>(&self, legs: &[L]) -> bool {
        let sure = |i: &usize| legs.get(*i).map(Leg::is_sure).unwrap_or(false);
        self.legs.iter().all(sure) && self.last_evidence.as_ref().map(sure).unwrap_or(true)
    }

    /// Whether the fractal ends the segment.
    ///
    /// Without a gap it always does. With a gap, an opposite fractal must form
    /// afterwards before price runs past the segment's end: `Some(false)` if
    /// price runs past first, `None` if neither has happened yet.
    pub fn can_be_end<L: Leg>(&self, legs: &[L]) -> Option<bool> {
        let second = self.elements[1].as_ref()?;
        if !second.gap {
            return Some(true);
        }
        let end = self.peak_leg(legs);
        let threshold = legs.get(end)?.end_value();
        find_revert_fx(legs, end + 2, threshold)
    }
}

fn find_revert_fx<L: Leg>(legs: &[L], begin: usize, threshold: f64) -> Option<bool> {
    let first = legs.get(begin)?;
    let mut fx = EigenFx::new(first.direction().opposite(), false);
    for leg in legs[begin..].iter().step_by(2) {
        if fx.add(leg, legs) {
            return Some(true);
        }
        let past = match leg.direction() {
            Direction::Down => leg.low() < threshold,
            Direction::Up => leg.high() > threshold,
        };
        if past {
            return Some(false);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::leg::test_legs::legs_through;

    fn feed(fx: &mut EigenFx, legs: &[crate::leg::test_legs::TestLeg], dir: Direction) -> Option<usize> {
        for leg in legs.iter().filter(|l| l.direction() != dir) {
            if fx.add(leg, legs) {
                return Some(leg.index);
            }
        }
        None
    }

    #[test]
    fn test_top_fractal_ends_up_segment() {
        // up to 20, then down legs make lower highs
        let legs = legs_through(&[10.0, 14.0, 12.0, 17.0, 15.0, 20.0, 16.0, 18.0, 13.0, 15.0, 11.0]);
        let mut fx = EigenFx::new(Direction::Up, true);
        let found = feed(&mut fx, &legs, Direction::Up);
        assert_eq!(found, Some(7));
        // the down leg 5 starts at the 20 high, so the segment ends at leg 4
        assert_eq!(fx.peak_leg(&legs), 4);
        assert_eq!(fx.can_be_end(&legs), Some(true));
        assert_eq!(fx.tail_leg(), Some(7));
    }

    #[test]
    fn test_no_fractal_while_trend_continues() {
        let legs = legs_through(&[10.0, 14.0, 12.0, 17.0, 15.0, 20.0, 18.0, 23.0]);
        let mut fx = EigenFx::new(Direction::Up, true);
        assert_eq!(feed(&mut fx, &legs, Direction::Up), None);
    }

    #[test]
    fn test_unsure_leg_taints_fractal() {
        let mut legs = legs_through(&[10.0, 14.0, 12.0, 17.0, 15.0, 20.0, 16.0, 18.0, 13.0, 15.0, 11.0]);
        legs[7].sure = false;
        let mut fx = EigenFx::new(Direction::Up, true);
        feed(&mut fx, &legs, Direction::Up);
        assert!(!fx.all_legs_sure(&legs));
    }
}
