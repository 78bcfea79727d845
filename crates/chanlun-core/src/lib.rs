//! Core types for the chanlun workspace.
//!
//! This crate provides fundamental data structures with no external dependencies:
//! - `Bar` - one OHLC(+volume) observation of a timeframe
//! - `Timeframe` - period enumeration, label parsing and aggregation

pub mod bar;
pub mod timeframe;

pub use bar::{Bar, OHLCV, SECONDS_PER_DAY};
pub use timeframe::{aggregate_bars, ParseTimeframeError, Timeframe};
