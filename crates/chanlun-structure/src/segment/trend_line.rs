//! Support and resistance lines fitted over a segment's legs.

use crate::leg::Leg;
use crate::types::Direction;

/// Which extremes of the segment's legs a line is fitted through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrendSide {
    /// Starting extremes of legs in the segment's direction.
    Inside,
    /// Ending extremes of legs in the segment's direction.
    Outside,
}

/// A line through `(x, y)` with the given slope, `x` measured in bar indices.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrendLine {
    pub side: TrendSide,
    pub x: f64,
    pub y: f64,
    pub slope: f64,
}

impl TrendLine {
    /// Fit a line over `legs`, the legs of one segment in order.
    ///
    /// Starting from the newest point, the line pivots on each candidate and
    /// keeps the one with the least total distance to all points.
    pub fn fit<L: Leg>(legs: &[L], side: TrendSide) -> Option<Self> {
        let last = legs.last()?;
        if legs.len() < 3 {
            return None;
        }
        let direction = last.direction();
        let points: Vec<(f64, f64)> = legs
            .iter()
            .rev()
            .step_by(2)
            .map(|leg| match side {
                TrendSide::Inside => (leg.begin_bar() as f64, leg.begin_value()),
                TrendSide::Outside => (leg.end_bar() as f64, leg.end_value()),
            })
            .collect();

        let mut best = None;
        let mut bench = f64::INFINITY;
        let mut rest = &points[..];
        while rest.len() > 1 {
            let (line, next) = pivot_line(rest, direction, side);
            let dist: f64 = points.iter().map(|&p| line.distance(p)).sum();
            if dist < bench {
                bench = dist;
                best = Some(line);
            }
            rest = &rest[next..];
        }
        best
    }

    /// Price of the line at bar index `x`.
    #[inline]
    pub fn value_at(&self, x: f64) -> f64 {
        self.y + self.slope * (x - self.x)
    }

    fn distance(&self, (px, py): (f64, f64)) -> f64 {
        (self.slope * px - py + self.y - self.slope * self.x).abs() / (self.slope * self.slope + 1.0).sqrt()
    }
}

/// Line from `points[0]` to the point giving the flattest (or steepest) slope,
/// with that point's position.
fn pivot_line(points: &[(f64, f64)], direction: Direction, side: TrendSide) -> (TrendLine, usize) {
    let (x0, y0) = points[0];
    let seek_min = matches!(
        (direction, side),
        (Direction::Up, TrendSide::Inside) | (Direction::Down, TrendSide::Outside)
    );
    let mut peak = if seek_min { f64::INFINITY } else { f64::NEG_INFINITY };
    let mut at = 1;
    for (i, &(x, y)) in points.iter().enumerate().skip(1) {
        let slope = if x == x0 { f64::INFINITY } else { (y - y0) / (x - x0) };
        if (seek_min && slope < peak) || (!seek_min && slope > peak) {
            peak = slope;
            at = i;
        }
    }
    (TrendLine { side, x: x0, y: y0, slope: peak }, at)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::leg::test_legs::legs_through;

    #[test]
    fn test_too_few_legs() {
        let legs = legs_through(&[10.0, 12.0, 11.0]);
        assert!(TrendLine::fit(&legs, TrendSide::Inside).is_none());
    }

    #[test]
    fn test_support_under_rising_lows() {
        // up legs start at 10, 11, 12 at bars 0, 8, 16
        let legs = legs_through(&[10.0, 14.0, 11.0, 15.0, 12.0, 16.0]);
        let line = TrendLine::fit(&legs, TrendSide::Inside).unwrap();
        assert!((line.slope - 0.125).abs() < 1e-12);
        assert!((line.value_at(0.0) - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_resistance_through_highs() {
        let legs = legs_through(&[10.0, 14.0, 11.0, 15.0, 12.0, 16.0]);
        let line = TrendLine::fit(&legs, TrendSide::Outside).unwrap();
        // highs at bars 4, 12, 20 lie on one line
        assert!((line.value_at(12.0) - 15.0).abs() < 1e-9);
    }
}
