use chanlun_core::Timeframe;
use thiserror::Error;

/// Errors raised by bar sources.
#[derive(Error, Debug)]
pub enum SourceError {
    /// No data exists for the requested symbol and timeframe.
    #[error("no data for {symbol} at {timeframe}")]
    NotFound { symbol: String, timeframe: Timeframe },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] ::csv::Error),
    #[error("line {line}: {reason}")]
    Parse { line: usize, reason: String },
    #[error("unrecognized time value: {0}")]
    InvalidTime(String),
    #[error("source is closed")]
    Closed,
    #[error("unknown data source: {0}")]
    UnknownSource(String),
}

impl SourceError {
    /// Whether this is the distinguished "source not found" condition.
    pub fn is_not_found(&self) -> bool {
        matches!(self, SourceError::NotFound { .. })
    }
}
