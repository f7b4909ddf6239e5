//! Column descriptors and row cursors.
//!
//! A source adapter describes each result column with a `ColumnMeta` and
//! yields rows through a `RowCursor`. `pump` drains a cursor through a
//! `RowWriter` into any frame sink.

use serde::{Deserialize, Serialize};

use crate::error::CodecError;
use crate::meta::framer::{FrameSink, RowWriter};
use crate::meta::types::{MetaValue, ScalarKind};

/// Description of one result column.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnMeta {
    /// Zero-based position in the row
    pub index: usize,
    pub name: String,
    pub kind: ScalarKind,
    pub nullable: bool,
    /// Only meaningful for integer kinds
    pub signed: bool,
    /// Decimal scale, when declared
    pub scale: Option<u32>,
}

impl ColumnMeta {
    /// Non-nullable, signed column without a declared scale.
    pub fn new(index: usize, name: impl Into<String>, kind: ScalarKind) -> Self {
        Self {
            index,
            name: name.into(),
            kind,
            nullable: false,
            signed: true,
            scale: None,
        }
    }

    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    pub fn signed(mut self, signed: bool) -> Self {
        self.signed = signed;
        self
    }

    pub fn scale(mut self, scale: Option<u32>) -> Self {
        self.scale = scale;
        self
    }
}

/// Column facts read from a table definition.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TableColumn {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
}

/// Forward-only source of rows.
pub trait RowCursor {
    type Error: From<CodecError>;

    fn columns(&self) -> &[ColumnMeta];

    /// Next row's values in column order, or `None` at the end.
    fn next_row(&mut self) -> Result<Option<Vec<MetaValue>>, Self::Error>;
}

/// Cursor over rows already in memory.
#[derive(Debug, Clone)]
pub struct VecCursor {
    columns: Vec<ColumnMeta>,
    rows: std::vec::IntoIter<Vec<MetaValue>>,
}

impl VecCursor {
    pub fn new(columns: Vec<ColumnMeta>, rows: Vec<Vec<MetaValue>>) -> Self {
        Self {
            columns,
            rows: rows.into_iter(),
        }
    }
}

impl RowCursor for VecCursor {
    type Error = CodecError;

    fn columns(&self) -> &[ColumnMeta] {
        &self.columns
    }

    fn next_row(&mut self) -> Result<Option<Vec<MetaValue>>, Self::Error> {
        Ok(self.rows.next())
    }
}

/// Encode every remaining row of `cursor` into `sink`. Returns the row count.
pub fn pump<C, S>(cursor: &mut C, writer: &mut RowWriter, sink: &mut S) -> Result<u64, C::Error>
where
    C: RowCursor + ?Sized,
    S: FrameSink + ?Sized,
{
    let mut rows = 0u64;
    while let Some(values) = cursor.next_row()? {
        writer.encode_row(cursor.columns(), &values, sink)?;
        rows += 1;
    }
    Ok(rows)
}

/// Get SQL for SQLite table columns.
pub fn sqlite_table_info_pragma(table: &str) -> String {
    format!("PRAGMA table_info('{}')", table.replace('\'', "''"))
}
