//! Feature-sequence segment rule.

use log::debug;

use super::eigen::EigenFx;
use super::SegmentList;
use crate::error::Result;
use crate::leg::Leg;
use crate::types::Direction;

pub(super) fn update<L: Leg>(list: &mut SegmentList, legs: &mut [L]) -> Result<()> {
    list.drop_unsure_tail(legs);
    let stale = list
        .segments
        .last()
        .and_then(|seg| seg.eigen_tail)
        .map(|tail| !legs.get(tail).map(Leg::is_sure).unwrap_or(false))
        .unwrap_or(false);
    if stale {
        if let Some(seg) = list.segments.pop() {
            debug!("reopening segment {}: its confirming leg changed", seg.index);
        }
    }
    let begin = list.next_start();
    cal_seg_sure(list, legs, begin)?;
    list.collect_left_seg(legs)
}

/// Scan from `begin` for feature fractals, appending a segment for each.
fn cal_seg_sure<L: Leg>(list: &mut SegmentList, legs: &[L], mut begin: usize) -> Result<()> {
    loop {
        let mut up_fx = EigenFx::new(Direction::Up, true);
        let mut down_fx = EigenFx::new(Direction::Down, true);
        let mut last_dir = list.segments.last().map(|s| s.direction);
        let mut found = None;
        for leg in legs.iter().skip(begin) {
            if leg.is_down() && last_dir != Some(Direction::Up) {
                if up_fx.add(leg, legs) {
                    found = Some(Direction::Up);
                }
            } else if leg.is_up() && last_dir != Some(Direction::Down) && down_fx.add(leg, legs) {
                found = Some(Direction::Down);
            }
            if list.segments.is_empty() {
                // The first segment's direction is not known yet: whichever
                // side first gets a second feature element wins.
                if up_fx.has_second() && leg.is_down() {
                    last_dir = Some(Direction::Down);
                    down_fx.clear();
                } else if down_fx.has_second() && leg.is_up() {
                    up_fx.clear();
                    last_dir = Some(Direction::Up);
                }
                if !up_fx.has_second() && last_dir == Some(Direction::Down) && leg.is_down() {
                    last_dir = None;
                } else if !down_fx.has_second() && last_dir == Some(Direction::Up) && leg.is_up() {
                    last_dir = None;
                }
            }
            if found.is_some() {
                break;
            }
        }
        let fx = match found {
            Some(Direction::Up) => up_fx,
            Some(Direction::Down) => down_fx,
            None => return Ok(()),
        };

        let verdict = fx.can_be_end(legs);
        let end = fx.peak_leg(legs);
        match verdict {
            Some(false) => {
                // Price ran past the end before an opposite fractal formed.
                match fx.second_leg() {
                    Some(next) => begin = next,
                    None => return Ok(()),
                }
            }
            verdict => {
                let confirmed = verdict.is_some();
                let is_sure = confirmed && fx.all_legs_sure(legs);
                if !list.add_new_seg(legs, end, is_sure, None, true, "normal")? {
                    begin = end + 1;
                    continue;
                }
                if let Some(seg) = list.segments.last_mut() {
                    seg.eigen_tail = fx.tail_leg();
                }
                if !confirmed {
                    return Ok(());
                }
                begin = end + 1;
            }
        }
    }
}
