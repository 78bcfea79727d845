//! Name-keyed registry of source factories.

use std::collections::HashMap;
use std::path::PathBuf;

use crate::csv::CsvSource;
use crate::memory::MemorySource;
use crate::source::BarSource;
use crate::SourceError;

/// Construction parameters handed to a factory.
#[derive(Debug, Clone, Default)]
pub struct SourceParams {
    /// Root directory for file-backed sources.
    pub root: Option<PathBuf>,
    /// Free-form options for third-party sources.
    pub options: HashMap<String, String>,
}

impl SourceParams {
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
            ..Default::default()
        }
    }
}

/// Builds a source from parameters.
pub type SourceFactory = fn(&SourceParams) -> Result<Box<dyn BarSource>, SourceError>;

/// Registry of source factories, resolved by name.
#[derive(Clone, Default)]
pub struct SourceRegistry {
    factories: HashMap<String, SourceFactory>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the `csv` and `memory` sources.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("csv", csv_factory);
        registry.register("memory", memory_factory);
        registry
    }

    /// Register or replace a factory.
    pub fn register(&mut self, name: impl Into<String>, factory: SourceFactory) {
        self.factories.insert(name.into(), factory);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn create(&self, name: &str, params: &SourceParams) -> Result<Box<dyn BarSource>, SourceError> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| SourceError::UnknownSource(name.to_string()))?;
        factory(params)
    }
}

impl std::fmt::Debug for SourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceRegistry").field("names", &self.names()).finish()
    }
}

fn csv_factory(params: &SourceParams) -> Result<Box<dyn BarSource>, SourceError> {
    let root = params.root.clone().unwrap_or_else(|| PathBuf::from("."));
    Ok(Box::new(CsvSource::new(root)))
}

fn memory_factory(_params: &SourceParams) -> Result<Box<dyn BarSource>, SourceError> {
    Ok(Box::new(MemorySource::new()))
}
