//! Inclusion rules shared by merged candles and segment feature elements.
//!
//! Both are runs of items with a high and a low. A new item either merges into
//! the run (one range contains the other) or starts a new run whose direction
//! comes from comparing the two ranges.

use super::direction::{Direction, Fractal};

/// Result of offering an item to the last run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CombineOutcome {
    /// The item merges into the run.
    Combine,
    /// The item contains the run but merging is excluded.
    Included,
    /// The item is a new run above the current one.
    Up,
    /// The item is a new run below the current one.
    Down,
}

/// Tie handling for equal extremes in feature sequences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EqualPeak {
    #[default]
    Off,
    /// An equal high with a lower low counts as a move down.
    Top,
    /// An equal low with a higher high counts as a move up.
    Bottom,
}

/// Whether `[l1, h1]` and `[l2, h2]` overlap. With `touch`, equal edges count.
#[inline]
pub fn has_overlap(l1: f64, h1: f64, l2: f64, h2: f64, touch: bool) -> bool {
    if touch {
        h2 >= l1 && h1 >= l2
    } else {
        h2 > l1 && h1 > l2
    }
}

/// Classify `(high, low)` against the current run `(cur_high, cur_low)`.
pub fn test_combine(
    cur_high: f64,
    cur_low: f64,
    high: f64,
    low: f64,
    exclude_included: bool,
    equal: EqualPeak,
) -> CombineOutcome {
    if cur_high >= high && cur_low <= low {
        return CombineOutcome::Combine;
    }
    if cur_high <= high && cur_low >= low {
        if equal == EqualPeak::Top && cur_high == high && cur_low > low {
            return CombineOutcome::Down;
        }
        if equal == EqualPeak::Bottom && cur_low == low && cur_high < high {
            return CombineOutcome::Up;
        }
        return if exclude_included {
            CombineOutcome::Included
        } else {
            CombineOutcome::Combine
        };
    }
    if cur_high > high && cur_low > low {
        CombineOutcome::Down
    } else {
        // Only reachable as cur_high < high && cur_low < low once NaN is ruled out.
        CombineOutcome::Up
    }
}

/// Merge `(high, low)` into a run with direction `dir`.
///
/// Upward runs keep the higher high and higher low, downward runs the lower
/// pair. A flat item sitting exactly on the run's extreme leaves it unchanged.
pub fn merge_range(dir: Direction, cur: (f64, f64), item: (f64, f64)) -> (f64, f64) {
    let (cur_high, cur_low) = cur;
    let (high, low) = item;
    match dir {
        Direction::Up if high != low || high != cur_high => (cur_high.max(high), cur_low.max(low)),
        Direction::Down if high != low || low != cur_low => (cur_high.min(high), cur_low.min(low)),
        _ => cur,
    }
}

/// Fractal label of `cur` given its neighbors, each as `(high, low)`.
pub fn fractal_of(
    pre: (f64, f64),
    cur: (f64, f64),
    next: (f64, f64),
    exclude_included: bool,
    equal: EqualPeak,
) -> Fractal {
    let (pre_h, pre_l) = pre;
    let (h, l) = cur;
    let (next_h, next_l) = next;
    if exclude_included {
        if pre_h < h && next_h <= h && next_l < l {
            if equal == EqualPeak::Top || next_h < h {
                return Fractal::Top;
            }
        } else if next_h > h && pre_l > l && next_l >= l && (equal == EqualPeak::Bottom || next_l > l) {
            return Fractal::Bottom;
        }
        Fractal::None
    } else if pre_h < h && next_h < h && pre_l < l && next_l < l {
        Fractal::Top
    } else if pre_h > h && next_h > h && pre_l > l && next_l > l {
        Fractal::Bottom
    } else {
        Fractal::None
    }
}
