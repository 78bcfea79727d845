//! Bar sources for chanlun.
//!
//! A source produces a finite, ordered sequence of bars for one symbol and
//! timeframe. Sources are created by name through a [`SourceRegistry`] and used
//! through an explicit [`SourceHandle`] that owns their open/close lifetime.

pub mod csv;
pub mod error;
pub mod handle;
pub mod memory;
pub mod registry;
pub mod source;
pub mod validation;

pub use self::csv::{parse_time, CsvSource};
pub use error::SourceError;
pub use handle::SourceHandle;
pub use memory::MemorySource;
pub use registry::{SourceFactory, SourceParams, SourceRegistry};
pub use source::{BarIter, BarQuery, BarSource};
pub use validation::{fix_bar, inspect_bar, BarDefect};
