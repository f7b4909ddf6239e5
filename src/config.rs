//! Stage configuration.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;

use crate::error::{CodecError, CodecResult};
use crate::meta::catalog::Catalog;
use crate::meta::decoder::UnnamedNullPolicy;
use crate::pipe::DEFAULT_CAPACITY;

/// Settings fixed for the lifetime of one query stage.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StageConfig {
    /// Emit named templates carrying the column name
    pub emit_field_names: bool,
    /// Bracket each row with BeginGroup/EndGroup
    pub emit_row_markers: bool,
    /// Frames buffered between producer and decoder
    pub pipe_capacity: usize,
    pub unnamed_nulls: UnnamedNullPolicy,
    /// JSON catalog artifact; the built-in catalog when absent
    pub catalog: Option<PathBuf>,
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            emit_field_names: false,
            emit_row_markers: false,
            pipe_capacity: DEFAULT_CAPACITY,
            unnamed_nulls: UnnamedNullPolicy::Placeholder,
            catalog: None,
        }
    }
}

impl StageConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit_field_names(mut self, emit: bool) -> Self {
        self.emit_field_names = emit;
        self
    }

    pub fn emit_row_markers(mut self, emit: bool) -> Self {
        self.emit_row_markers = emit;
        self
    }

    pub fn pipe_capacity(mut self, capacity: usize) -> Self {
        self.pipe_capacity = capacity;
        self
    }

    pub fn unnamed_nulls(mut self, policy: UnnamedNullPolicy) -> Self {
        self.unnamed_nulls = policy;
        self
    }

    pub fn catalog(mut self, path: impl Into<PathBuf>) -> Self {
        self.catalog = Some(path.into());
        self
    }

    pub fn from_json(json: &str) -> CodecResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| CodecError::ConfigError(format!("invalid stage config: {}", e)))?;
        if config.pipe_capacity == 0 {
            return Err(CodecError::ConfigError(
                "pipe_capacity must be at least 1".to_string(),
            ));
        }
        Ok(config)
    }

    /// The catalog this stage encodes and decodes with.
    pub fn load_catalog(&self) -> CodecResult<Arc<Catalog>> {
        match &self.catalog {
            Some(path) => {
                tracing::debug!("Loading template catalog from {}", path.display());
                Ok(Arc::new(Catalog::from_path(path)?))
            }
            None => Ok(Catalog::builtin()),
        }
    }
}
