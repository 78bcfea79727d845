//! Bar source trait definition.

use chanlun_core::{Bar, Timeframe};
use chrono::NaiveDate;

use crate::SourceError;

/// A finite, ordered, single-pass sequence of bars.
pub type BarIter = Box<dyn Iterator<Item = Bar> + Send>;

/// What to load from a source.
#[derive(Debug, Clone, PartialEq)]
pub struct BarQuery {
    pub symbol: String,
    pub timeframe: Timeframe,
    /// First calendar day to include.
    pub begin: Option<NaiveDate>,
    /// Last calendar day to include.
    pub end: Option<NaiveDate>,
}

impl BarQuery {
    pub fn new(symbol: impl Into<String>, timeframe: Timeframe) -> Self {
        Self {
            symbol: symbol.into(),
            timeframe,
            begin: None,
            end: None,
        }
    }

    pub fn with_range(mut self, begin: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        self.begin = begin;
        self.end = end;
        self
    }

    /// Whether a bar timestamp falls within the requested calendar range.
    pub fn contains(&self, timestamp: f64) -> bool {
        let day = match chrono::DateTime::from_timestamp(timestamp.floor() as i64, 0) {
            Some(dt) => dt.date_naive(),
            None => return false,
        };
        self.begin.map_or(true, |b| day >= b) && self.end.map_or(true, |e| day <= e)
    }
}

/// Trait for types that can produce bars.
///
/// `open` and `close` bracket any connection state the source needs; they are
/// driven by [`crate::SourceHandle`] rather than called directly.
pub trait BarSource: Send {
    /// Registry name of this source kind.
    fn name(&self) -> &str;

    fn open(&mut self) -> Result<(), SourceError> {
        Ok(())
    }

    fn close(&mut self) {}

    /// Start a fresh pass over the bars matching `query`.
    ///
    /// Must return [`SourceError::NotFound`] when the source has nothing for
    /// the symbol and timeframe.
    fn bars(&self, query: &BarQuery) -> Result<BarIter, SourceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_range_is_inclusive() {
        let q = BarQuery::new("X", Timeframe::Day1).with_range(
            NaiveDate::from_ymd_opt(2024, 1, 2),
            NaiveDate::from_ymd_opt(2024, 1, 3),
        );
        // 2024-01-03 23:59:00 UTC
        assert!(q.contains(1_704_326_340.0));
        // 2024-01-04 00:00:00 UTC
        assert!(!q.contains(1_704_326_400.0));
        // 2024-01-01 12:00:00 UTC
        assert!(!q.contains(1_704_110_400.0));
    }
}
