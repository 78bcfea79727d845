//! Simpler segment rules kept for comparison with the feature-sequence rule.
//!
//! Both walk forward from the first uncovered leg, tracking the most extreme
//! leg in the candidate direction. `Break` ends the segment when a counter leg
//! breaks the start of that extreme leg; `OnePlusOne` ends it as soon as the
//! next same-direction leg fails to make a new extreme.

use super::SegmentList;
use crate::error::Result;
use crate::leg::Leg;
use crate::types::Direction;

#[inline]
fn beyond(value: f64, reference: f64, direction: Direction) -> bool {
    match direction {
        Direction::Up => value > reference,
        Direction::Down => value < reference,
    }
}

/// A counter leg moving back through `level`.
#[inline]
fn breaks_back<L: Leg>(leg: &L, level: f64, direction: Direction) -> bool {
    match direction {
        Direction::Up => leg.low() < level,
        Direction::Down => leg.high() > level,
    }
}

pub(super) fn update_break<L: Leg>(list: &mut SegmentList, legs: &mut [L]) -> Result<()> {
    list.drop_unsure_tail(legs);
    let legs: &[L] = legs;
    let mut start = list.next_start();
    'scan: while start + 2 < legs.len() {
        let direction = legs[start].direction();
        let mut peak = start;
        let mut confirmed = None;
        for leg in &legs[start + 1..] {
            let j = leg.index();
            if leg.direction() == direction {
                if beyond(leg.end_value(), legs[peak].end_value(), direction) {
                    peak = j;
                }
            } else if peak >= start + 2 && breaks_back(leg, legs[peak].begin_value(), direction) {
                confirmed = Some(j);
                break;
            } else if list.is_empty() && peak == start && breaks_back(leg, legs[start].begin_value(), direction) {
                // The opening leg was a counter move; restart from the next one.
                start += 1;
                continue 'scan;
            }
        }
        let Some(breaker) = confirmed else {
            break;
        };
        let is_sure = legs[start..=breaker].iter().all(Leg::is_sure);
        list.add_new_seg(legs, peak, is_sure, Some(direction), false, "break")?;
        start = peak + 1;
    }
    list.collect_left_seg(legs)
}

pub(super) fn update_pairwise<L: Leg>(list: &mut SegmentList, legs: &mut [L]) -> Result<()> {
    list.drop_unsure_tail(legs);
    let legs: &[L] = legs;
    let mut start = list.next_start();
    'scan: while start + 2 < legs.len() {
        let direction = legs[start].direction();
        let mut peak = start;
        let mut cursor = start + 2;
        let mut failed = None;
        while cursor < legs.len() {
            if beyond(legs[cursor].end_value(), legs[peak].end_value(), direction) {
                peak = cursor;
            } else if peak >= start + 2 {
                failed = Some(cursor);
                break;
            } else if list.is_empty() {
                start += 1;
                continue 'scan;
            }
            cursor += 2;
        }
        let Some(failed) = failed else {
            break;
        };
        let is_sure = legs[start..=failed].iter().all(Leg::is_sure);
        list.add_new_seg(legs, peak, is_sure, Some(direction), false, "one_plus_one")?;
        start = peak + 1;
    }
    list.collect_left_seg(legs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LeftMethod, SegmentAlgorithm, SegmentConfig};
    use crate::leg::test_legs::legs_through;

    #[test]
    fn test_break_skips_counter_opening_leg() {
        // a small up leg, then a down trend that breaks its start
        let mut legs = legs_through(&[10.0, 11.0, 7.0, 9.0, 5.0, 8.0, 3.0, 6.0, 4.0, 8.5]);
        let mut list = SegmentList::new(SegmentConfig {
            algorithm: SegmentAlgorithm::Break,
            left_method: LeftMethod::Peak,
        });
        update_break(&mut list, &mut legs).unwrap();
        let first = &list.as_slice()[0];
        assert_eq!(first.direction, Direction::Down);
        assert_eq!((first.start_leg, first.end_leg), (0, 5));
    }
}
