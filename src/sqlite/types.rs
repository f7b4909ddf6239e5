//! SQLite type mapping.
//!
//! SQLite stores five storage classes; the column's declared type decides
//! which scalar kind a value is reported as. `DeclaredType::parse` is the
//! whole type table for this adapter.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use rusqlite::types::{ToSql, ToSqlOutput, ValueRef};

use crate::error::{CodecError, CodecResult};
use crate::meta::types::{Decimal, MetaValue, ScalarKind};

/// A SQLite value, used for statement parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum SqliteValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl SqliteValue {
    /// Check if this value is NULL.
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, SqliteValue::Null)
    }
}

impl ToSql for SqliteValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        match self {
            SqliteValue::Null => Ok(ToSqlOutput::Owned(rusqlite::types::Value::Null)),
            SqliteValue::Integer(i) => Ok(ToSqlOutput::Owned(rusqlite::types::Value::Integer(*i))),
            SqliteValue::Real(f) => Ok(ToSqlOutput::Owned(rusqlite::types::Value::Real(*f))),
            SqliteValue::Text(s) => Ok(ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes()))),
            SqliteValue::Blob(b) => Ok(ToSqlOutput::Borrowed(ValueRef::Blob(b))),
        }
    }
}

// ============================================================================
// Declared Types
// ============================================================================

/// Scalar kind and modifiers derived from a column's declared type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeclaredType {
    pub kind: ScalarKind,
    pub signed: bool,
    pub scale: Option<u32>,
}

impl DeclaredType {
    /// Parse a declared type such as `INTEGER`, `DECIMAL(20,2)` or
    /// `INT UNSIGNED`. Expressions and untyped columns have no declared type
    /// and map to `ScalarKind::Other`.
    pub fn parse(decl: Option<&str>) -> Self {
        let Some(decl) = decl else {
            return Self::other();
        };
        let upper = decl.trim().to_ascii_uppercase();

        let (head, args) = match upper.split_once('(') {
            Some((head, rest)) => (head, rest.split(')').next().unwrap_or("")),
            None => (upper.as_str(), ""),
        };
        let mut words: Vec<&str> = head.split_whitespace().collect();
        let after_args = upper.rsplit(')').next().unwrap_or("");
        let unsigned = words.contains(&"UNSIGNED") || after_args.contains("UNSIGNED");
        words.retain(|w| *w != "UNSIGNED");
        let base = words.join(" ");

        let kind = match base.as_str() {
            "BOOLEAN" | "BOOL" | "BIT" => ScalarKind::Boolean,
            "TINYINT" => ScalarKind::TinyInt,
            "SMALLINT" | "INT2" => ScalarKind::SmallInt,
            "INT" | "INTEGER" | "MEDIUMINT" | "INT4" => ScalarKind::Integer,
            "BIGINT" | "INT8" => ScalarKind::BigInt,
            "REAL" | "FLOAT4" => ScalarKind::Real,
            "FLOAT" | "FLOAT8" | "DOUBLE" | "DOUBLE PRECISION" => ScalarKind::Double,
            "DECIMAL" | "NUMERIC" | "NUMBER" => ScalarKind::Decimal,
            "CHAR" | "CHARACTER" => ScalarKind::Char,
            "VARCHAR" | "CHARACTER VARYING" | "VARYING CHARACTER" => ScalarKind::VarChar,
            "TEXT" => ScalarKind::LongVarChar,
            "NCHAR" | "NATIVE CHARACTER" => ScalarKind::NChar,
            "NVARCHAR" => ScalarKind::NVarChar,
            "CLOB" | "NCLOB" => ScalarKind::Clob,
            "DATE" => ScalarKind::Date,
            "TIME" => ScalarKind::Time,
            "TIMESTAMP" | "DATETIME" => ScalarKind::Timestamp,
            "TIMESTAMPTZ" | "DATETIMEOFFSET" | "TIMESTAMP WITH TIME ZONE" => {
                ScalarKind::TimestampTz
            }
            "BINARY" => ScalarKind::Binary,
            "VARBINARY" => ScalarKind::VarBinary,
            "BLOB" => ScalarKind::Blob,
            "UUID" => ScalarKind::Uuid,
            "JSON" | "OBJECT" => ScalarKind::Object,
            "ARRAY" => ScalarKind::Array,
            "INTERVAL" => ScalarKind::Interval,
            _ => ScalarKind::Other,
        };

        let scale = if kind == ScalarKind::Decimal && !args.is_empty() {
            // DECIMAL(p) has scale 0
            match args.split_once(',') {
                Some((_, s)) => s.trim().parse().ok(),
                None => Some(0),
            }
        } else {
            None
        };

        Self {
            kind,
            signed: !unsigned,
            scale,
        }
    }

    fn other() -> Self {
        Self {
            kind: ScalarKind::Other,
            signed: true,
            scale: None,
        }
    }

    /// Convert a stored value into the `MetaValue` the encoder expects for
    /// this column's kind.
    pub fn to_meta_value(&self, value: ValueRef<'_>, column: usize) -> CodecResult<MetaValue> {
        let mismatch = |expected: &'static str| CodecError::ValueMismatch {
            column,
            expected,
            found: storage_class(value),
        };

        let meta = match (self.kind, value) {
            (_, ValueRef::Null) => MetaValue::Null,

            (ScalarKind::Boolean, ValueRef::Integer(i)) => MetaValue::Bool(i != 0),
            (ScalarKind::Boolean, ValueRef::Text(t)) => match text(t, column)?.as_str() {
                "true" | "TRUE" | "1" => MetaValue::Bool(true),
                "false" | "FALSE" | "0" => MetaValue::Bool(false),
                _ => return Err(mismatch("boolean")),
            },

            (kind, ValueRef::Integer(i)) if kind.is_integer() => MetaValue::Int(i),

            (ScalarKind::Real, ValueRef::Real(f)) => MetaValue::Float(f as f32),
            (ScalarKind::Real, ValueRef::Integer(i)) => MetaValue::Float(i as f32),
            (ScalarKind::Double, ValueRef::Real(f)) => MetaValue::Double(f),
            (ScalarKind::Double, ValueRef::Integer(i)) => MetaValue::Double(i as f64),

            (ScalarKind::Decimal, ValueRef::Integer(i)) => MetaValue::Decimal(Decimal::new(i, 0)),
            (ScalarKind::Decimal, ValueRef::Real(f)) => {
                let decimal = match self.scale {
                    Some(scale) => Decimal::from_f64_scaled(f, scale),
                    None => f.to_string().parse().ok(),
                };
                MetaValue::Decimal(decimal.ok_or_else(|| CodecError::ValueOutOfRange {
                    column,
                    detail: format!("{} is not representable as a decimal", f),
                })?)
            }
            (ScalarKind::Decimal, ValueRef::Text(t)) => MetaValue::Decimal(
                text(t, column)?
                    .parse()
                    .map_err(|_| mismatch("decimal literal"))?,
            ),

            (kind, ValueRef::Text(t)) if kind.is_text_like() => MetaValue::Text(text(t, column)?),
            (kind, ValueRef::Integer(i)) if kind.is_text_like() => MetaValue::Text(i.to_string()),
            (kind, ValueRef::Real(f)) if kind.is_text_like() => MetaValue::Text(f.to_string()),

            (ScalarKind::Date, ValueRef::Text(t)) => MetaValue::Date(
                NaiveDate::parse_from_str(&text(t, column)?, "%Y-%m-%d")
                    .map_err(|_| mismatch("YYYY-MM-DD date"))?,
            ),
            (ScalarKind::Time, ValueRef::Text(t)) => MetaValue::Time(
                NaiveTime::parse_from_str(&text(t, column)?, "%H:%M:%S%.f")
                    .map_err(|_| mismatch("HH:MM:SS time"))?,
            ),
            (ScalarKind::Timestamp, ValueRef::Text(t)) => {
                MetaValue::DateTime(parse_datetime(&text(t, column)?).ok_or_else(|| mismatch("datetime"))?)
            }
            (ScalarKind::Timestamp, ValueRef::Integer(secs)) => MetaValue::DateTime(
                DateTime::from_timestamp(secs, 0)
                    .ok_or_else(|| mismatch("unix seconds"))?
                    .naive_utc(),
            ),
            (ScalarKind::TimestampTz, ValueRef::Text(t)) => {
                let t = text(t, column)?;
                let ts = DateTime::parse_from_rfc3339(&t)
                    .or_else(|_| DateTime::parse_from_str(&t, "%Y-%m-%d %H:%M:%S%.f%:z"))
                    .map_err(|_| mismatch("datetime with offset"))?;
                MetaValue::Timestamp(ts)
            }

            (ScalarKind::Uuid, ValueRef::Blob(b)) if b.len() == 16 => MetaValue::Bytes(b.to_vec()),
            (ScalarKind::Uuid, ValueRef::Text(t)) => {
                let id = uuid::Uuid::parse_str(&text(t, column)?).map_err(|_| mismatch("UUID"))?;
                MetaValue::Bytes(id.as_bytes().to_vec())
            }
            (
                ScalarKind::Binary | ScalarKind::VarBinary | ScalarKind::Blob,
                ValueRef::Blob(b) | ValueRef::Text(b),
            ) => MetaValue::Bytes(b.to_vec()),

            (ScalarKind::Object | ScalarKind::Array, ValueRef::Text(t) | ValueRef::Blob(t)) => {
                MetaValue::Object(
                    serde_json::from_slice(t).map_err(|e| CodecError::Object(e.to_string()))?,
                )
            }

            (ScalarKind::Interval | ScalarKind::Other, _) => {
                return Err(CodecError::UnsupportedColumnType {
                    kind: self.kind,
                    column,
                })
            }

            _ => return Err(mismatch(kind_label(self.kind))),
        };
        Ok(meta)
    }
}

fn text(bytes: &[u8], column: usize) -> CodecResult<String> {
    String::from_utf8(bytes.to_vec()).map_err(|_| CodecError::ValueMismatch {
        column,
        expected: "UTF-8 text",
        found: "invalid UTF-8",
    })
}

fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f"))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

fn storage_class(value: ValueRef<'_>) -> &'static str {
    match value {
        ValueRef::Null => "NULL",
        ValueRef::Integer(_) => "INTEGER",
        ValueRef::Real(_) => "REAL",
        ValueRef::Text(_) => "TEXT",
        ValueRef::Blob(_) => "BLOB",
    }
}

fn kind_label(kind: ScalarKind) -> &'static str {
    match kind {
        ScalarKind::Boolean => "boolean",
        k if k.is_integer() => "integer",
        ScalarKind::Real | ScalarKind::Double => "floating point",
        ScalarKind::Decimal => "decimal",
        k if k.is_text_like() => "text",
        ScalarKind::Date | ScalarKind::Time | ScalarKind::Timestamp | ScalarKind::TimestampTz => {
            "date/time text"
        }
        ScalarKind::Uuid => "16-byte UUID",
        ScalarKind::Binary | ScalarKind::VarBinary | ScalarKind::Blob => "blob",
        ScalarKind::Object | ScalarKind::Array => "JSON",
        _ => "supported value",
    }
}
