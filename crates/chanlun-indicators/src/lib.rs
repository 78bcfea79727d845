//! Indicator framework for the structural pipeline.
//!
//! Every indicator is streaming: it consumes one bar at a time and returns the
//! value for that bar. The pipeline stores the values on each bar so divergence
//! algorithms can read them back per leg.

pub mod boll;
pub mod indicator;
pub mod kdj;
pub mod macd;
pub mod rsi;
pub mod set;
pub mod trend;

pub use boll::{Boll, BollConfig, BollValue};
pub use indicator::{Indicator, PriceSource};
pub use kdj::{Kdj, KdjConfig, KdjValue};
pub use macd::{Ema, Macd, MacdConfig, MacdValue};
pub use rsi::{Rsi, RsiConfig};
pub use set::{BarMetrics, IndicatorSet, IndicatorSetConfig};
pub use trend::{TrendConfig, TrendKind, TrendWindow};
