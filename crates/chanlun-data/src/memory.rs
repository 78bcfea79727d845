//! In-memory bar source for callers that own the feed.

use std::collections::HashMap;

use chanlun_core::{Bar, Timeframe};

use crate::source::{BarIter, BarQuery, BarSource};
use crate::SourceError;

/// Bars held in memory, keyed by symbol and timeframe.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    series: HashMap<(String, Timeframe), Vec<Bar>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the bars for one symbol and timeframe.
    pub fn insert(&mut self, symbol: impl Into<String>, timeframe: Timeframe, bars: Vec<Bar>) {
        self.series.insert((symbol.into(), timeframe), bars);
    }

    pub fn with_series(mut self, symbol: impl Into<String>, timeframe: Timeframe, bars: Vec<Bar>) -> Self {
        self.insert(symbol, timeframe, bars);
        self
    }
}

impl BarSource for MemorySource {
    fn name(&self) -> &str {
        "memory"
    }

    fn bars(&self, query: &BarQuery) -> Result<BarIter, SourceError> {
        let bars = self
            .series
            .get(&(query.symbol.clone(), query.timeframe))
            .ok_or_else(|| SourceError::NotFound {
                symbol: query.symbol.clone(),
                timeframe: query.timeframe,
            })?;
        let selected: Vec<Bar> = bars
            .iter()
            .filter(|b| query.contains(b.timestamp))
            .copied()
            .collect();
        Ok(Box::new(selected.into_iter()))
    }
}
