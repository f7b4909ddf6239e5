//! Error types for the metarow codec.
//!
//! Every variant is fatal for the run that produced it: encoder and decoder
//! must agree on template shapes, so a mismatch halts instead of guessing.

use thiserror::Error;

use crate::meta::types::ScalarKind;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Catalog lookup error: no template for {0}")]
    CatalogLookup(String),

    #[error("Unsupported column type {kind:?} for column {column}")]
    UnsupportedColumnType { kind: ScalarKind, column: usize },

    #[error("Unknown template ID: {0}")]
    UnknownTemplate(u32),

    #[error("Malformed frame: {0}")]
    Malformed(String),

    #[error("Value mismatch for column {column}: expected {expected}, found {found}")]
    ValueMismatch {
        column: usize,
        expected: &'static str,
        found: &'static str,
    },

    #[error("Value mismatch for template {template}: expected {expected}, found {found}")]
    TemplateMismatch {
        template: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("Row has {found} values for {expected} columns")]
    ColumnCountMismatch { expected: usize, found: usize },

    #[error("NULL value for non-nullable column {column}")]
    UnexpectedNull { column: usize },

    #[error("Value out of range for column {column}: {detail}")]
    ValueOutOfRange { column: usize, detail: String },

    #[error("Object codec error: {0}")]
    Object(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Transport closed")]
    TransportClosed,

    #[error("Stage task failed: {0}")]
    Task(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type CodecResult<T> = std::result::Result<T, CodecError>;
