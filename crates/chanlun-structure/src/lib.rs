//! Chanlun Structure - Chan-theory price structure over multi-timeframe bars.
//!
//! This crate turns a stream of OHLCV bars into the nested structure used for
//! Chan-theory analysis, recomputed incrementally as bars arrive.
//!
//! # Core Concepts
//!
//! - **Merged candles**: Bars folded together while one contains the other,
//!   marked as top or bottom fractals
//! - **Strokes**: Moves between alternating fractals, with a provisional last
//!   stroke reaching the newest candle
//! - **Segments**: Groups of at least three strokes, ended by a feature
//!   sequence break; segments of segments are built the same way
//! - **Pivots**: Overlapping ranges of three or more legs inside a segment
//! - **Signal points**: Buy and sell points of the first, second and third
//!   class, derived from pivots, divergence and retracements
//!
//! # Architecture
//!
//! Each timeframe is a [`Hierarchy`] of dense arenas linked by index:
//!
//! 1. **Bars in**: [`Hierarchy::add_bar`] validates a bar, merges it into the
//!    candle list and advances the strokes
//! 2. **Recompute**: [`Hierarchy::recompute`] rebuilds segments, pivots and
//!    signals from the strokes, then the same for segments of segments
//!
//! A [`LevelDriver`] stacks hierarchies from coarse to fine, keeps every
//! finer bar under the coarse bar that covers it, and loads either in one
//! batch or step by step.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use chanlun_core::Timeframe;
//! use chanlun_data::{CsvSource, SourceHandle};
//! use chanlun_structure::{ChanConfig, LevelDriver};
//!
//! let handle = SourceHandle::open(Box::new(CsvSource::new("data")))?;
//! let mut driver = LevelDriver::new(
//!     "600000",
//!     vec![Timeframe::Day1, Timeframe::Min30],
//!     ChanConfig::default(),
//! )?;
//! driver.load(&handle)?;
//!
//! let daily = driver.level(0).unwrap();
//! println!("{} strokes, {} pivots", daily.strokes().len(), daily.pivots().len());
//! for point in driver.latest_signals(0, 3) {
//!     println!("{} {} at {}", point.type_label(), if point.is_buy { "buy" } else { "sell" }, point.time);
//! }
//! ```

pub mod candle;
pub mod config;
pub mod driver;
pub mod error;
pub mod hierarchy;
pub mod leg;
pub mod metric;
pub mod pivot;
pub mod segment;
pub mod signal;
pub mod stroke;
pub mod types;

// Re-export the driving types
pub use driver::{LevelDriver, StepLoad};
pub use error::{ChanError, ErrorKind, Result};
pub use hierarchy::Hierarchy;

// Re-export configuration
pub use config::{
    ChanConfig, CombineMode, DivergenceAlgo, DriverConfig, FxCheck, LeftMethod, PivotConfig,
    SegmentAlgorithm, SegmentConfig, SignalConfig, SignalSides, SignalType, StrokeAlgorithm,
    StrokeConfig,
};

// Re-export structure types
pub use candle::{Absorb, CandleList, MergedCandle};
pub use leg::{BarContext, Leg};
pub use pivot::{Pivot, PivotList};
pub use segment::{Eigen, EigenFx, Segment, SegmentList, TrendLine, TrendSide};
pub use signal::{SignalList, SignalPoint};
pub use stroke::{Stroke, StrokeKind, StrokeList};
pub use types::{BarUnit, Direction, Fractal};
