//! Explicit open/close lifetime for a bar source.

use crate::source::{BarIter, BarQuery, BarSource};
use crate::SourceError;

/// An opened bar source.
///
/// The source is opened on construction and closed by [`SourceHandle::close`]
/// or on drop, whichever comes first.
pub struct SourceHandle {
    source: Box<dyn BarSource>,
    open: bool,
}

impl SourceHandle {
    pub fn open(mut source: Box<dyn BarSource>) -> Result<Self, SourceError> {
        source.open()?;
        log::debug!("opened {} source", source.name());
        Ok(Self { source, open: true })
    }

    pub fn name(&self) -> &str {
        self.source.name()
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn bars(&self, query: &BarQuery) -> Result<BarIter, SourceError> {
        if !self.open {
            return Err(SourceError::Closed);
        }
        self.source.bars(query)
    }

    pub fn close(&mut self) {
        if self.open {
            self.source.close();
            self.open = false;
            log::debug!("closed {} source", self.source.name());
        }
    }
}

impl Drop for SourceHandle {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for SourceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceHandle")
            .field("source", &self.source.name())
            .field("open", &self.open)
            .finish()
    }
}
