//! Shared value types for the pipeline.

pub mod bar_unit;
pub mod combine;
pub mod direction;

pub use bar_unit::BarUnit;
pub use combine::{fractal_of, has_overlap, merge_range, test_combine, CombineOutcome, EqualPeak};
pub use direction::{Direction, Fractal};
