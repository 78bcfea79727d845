//! Error types for the structural pipeline.

use chanlun_core::Timeframe;
use chanlun_data::SourceError;
use thiserror::Error;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, ChanError>;

/// Errors raised while building or driving a hierarchy.
#[derive(Error, Debug)]
pub enum ChanError {
    /// OHLC values are not ordered and auto-fix is off.
    #[error("invalid bar at {timestamp}: {reason}")]
    InvalidBar { timestamp: f64, reason: String },

    /// A bar did not come strictly after the previous one of its timeframe.
    #[error("{timeframe} bar at {current} is not after {last}")]
    NotMonotonic {
        timeframe: Timeframe,
        last: f64,
        current: f64,
    },

    /// Too many coarse bars found no children in the next finer timeframe.
    #[error("{count} {timeframe} bars had no {sub_timeframe} children (limit {limit})")]
    Misaligned {
        timeframe: Timeframe,
        sub_timeframe: Timeframe,
        count: usize,
        limit: usize,
    },

    /// Too many parent bars had children stamped on a different calendar day.
    #[error("{count} parent bars had children on another day (limit {limit})")]
    Inconsistent { count: usize, limit: usize },

    /// Unknown selector or unsupported option combination.
    #[error("configuration error: {0}")]
    Config(String),

    /// Internal cross-reference mismatch.
    #[error("invariant violated: {0}")]
    Invariant(String),

    /// The coarsest level produced no bars.
    #[error("no data for {0}")]
    NoData(String),

    #[error(transparent)]
    Source(#[from] SourceError),
}

/// Coarse error category, for callers that branch on the kind of failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    DataValidity,
    Ordering,
    Alignment,
    Configuration,
    Invariant,
    NoData,
    Source,
}

impl ChanError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ChanError::InvalidBar { .. } => ErrorKind::DataValidity,
            ChanError::NotMonotonic { .. } => ErrorKind::Ordering,
            ChanError::Misaligned { .. } | ChanError::Inconsistent { .. } => ErrorKind::Alignment,
            ChanError::Config(_) => ErrorKind::Configuration,
            ChanError::Invariant(_) => ErrorKind::Invariant,
            ChanError::NoData(_) => ErrorKind::NoData,
            ChanError::Source(_) => ErrorKind::Source,
        }
    }

    /// Whether the error means the requested data does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ChanError::Source(e) if e.is_not_found())
    }
}
