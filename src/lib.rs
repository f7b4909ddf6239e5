//! metarow: a self-describing binary stream for relational query results.
//!
//! A source adapter reports each column's scalar kind, name and nullability.
//! The encoder picks one template per value from a shared catalog and writes
//! it as a frame; the decoder reads the template ID back and rebuilds a flat
//! sequence of typed entries without knowing the row schema.

pub mod config;
pub mod error;
pub mod executor;
pub mod meta;
pub mod pipe;
pub mod schema;
pub mod sqlite;

pub use config::StageConfig;
pub use error::{CodecError, CodecResult};
pub use executor::{
    run_cursor, run_cursor_with, run_query, run_query_with, StageError, StageOutput,
};
pub use meta::{
    Catalog, Decimal, Entry, MetaDecoder, MetaDumper, MetaEncoder, MetaValue, RowWriter,
    ScalarKind, StopHandle, UnnamedNullPolicy,
};
pub use pipe::{frame_pipe, FrameReader, FrameWriter};
pub use schema::{ColumnMeta, RowCursor, VecCursor};
