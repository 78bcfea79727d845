//! Bar data structures for OHLC(+volume) data.

/// Seconds in one calendar day.
pub const SECONDS_PER_DAY: f64 = 86_400.0;

/// One raw observation of a timeframe.
///
/// `timestamp` is unix seconds (UTC) and marks the close of the bar's period.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bar {
    pub timestamp: f64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    /// Traded value, when the source provides it.
    pub turnover: Option<f64>,
    /// Turnover rate, when the source provides it.
    pub turnover_rate: Option<f64>,
}

impl Bar {
    pub fn new(timestamp: f64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
            turnover: None,
            turnover_rate: None,
        }
    }

    /// Attach turnover information.
    pub fn with_turnover(mut self, turnover: Option<f64>, turnover_rate: Option<f64>) -> Self {
        self.turnover = turnover;
        self.turnover_rate = turnover_rate;
        self
    }

    /// Days since the unix epoch, used for calendar-date comparisons.
    #[inline]
    pub fn day_number(&self) -> i64 {
        (self.timestamp / SECONDS_PER_DAY).floor() as i64
    }

    /// Whether the OHLC values are ordered: low <= min(open, close) and high >= max(open, close).
    #[inline]
    pub fn is_consistent(&self) -> bool {
        self.low <= self.open.min(self.close).min(self.high)
            && self.high >= self.open.max(self.close).max(self.low)
    }
}

/// Trait for types that provide OHLCV data.
pub trait OHLCV {
    fn open(&self) -> f64;
    fn high(&self) -> f64;
    fn low(&self) -> f64;
    fn close(&self) -> f64;
    fn volume(&self) -> f64;
}

impl OHLCV for Bar {
    fn open(&self) -> f64 {
        self.open
    }

    fn high(&self) -> f64 {
        self.high
    }

    fn low(&self) -> f64 {
        self.low
    }

    fn close(&self) -> f64 {
        self.close
    }

    fn volume(&self) -> f64 {
        self.volume
    }
}
