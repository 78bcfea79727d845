//! Direction and fractal labels.

/// Direction of a merged candle, leg or segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Direction {
    #[default]
    Up,
    Down,
}

impl Direction {
    #[inline]
    pub fn is_up(self) -> bool {
        matches!(self, Direction::Up)
    }

    #[inline]
    pub fn is_down(self) -> bool {
        matches!(self, Direction::Down)
    }

    /// Returns the opposite direction.
    #[inline]
    pub fn opposite(self) -> Self {
        match self {
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
        }
    }
}

/// Fractal label of a merged candle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Fractal {
    Top,
    Bottom,
    #[default]
    None,
}

impl Fractal {
    #[inline]
    pub fn is_some(self) -> bool {
        !matches!(self, Fractal::None)
    }

    /// Direction of a leg that starts at this fractal.
    #[inline]
    pub fn leg_direction(self) -> Option<Direction> {
        match self {
            Fractal::Top => Some(Direction::Down),
            Fractal::Bottom => Some(Direction::Up),
            Fractal::None => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opposite() {
        assert_eq!(Direction::Up.opposite(), Direction::Down);
        assert_eq!(Direction::Down.opposite().opposite(), Direction::Down);
    }

    #[test]
    fn test_leg_direction_from_fractal() {
        assert_eq!(Fractal::Top.leg_direction(), Some(Direction::Down));
        assert_eq!(Fractal::Bottom.leg_direction(), Some(Direction::Up));
        assert_eq!(Fractal::None.leg_direction(), None);
    }
}
