//! Column value encoder.
//!
//! Picks exactly one template per (kind, named, nullable) and turns a source
//! value into that template's wire fields. Nothing here inspects source
//! metadata; the adapter has already reduced every column to a `ColumnMeta`.

use std::sync::Arc;

use bytes::Bytes;
use chrono::{NaiveTime, Timelike};

use super::catalog::{Catalog, Category, Shape};
use super::object::{JsonObjectCodec, ObjectCodec};
use super::protocol::{MetaMessage, Scalar};
use super::types::{Decimal, MetaValue, ScalarKind};
use crate::error::{CodecError, CodecResult};
use crate::schema::ColumnMeta;

/// Wire shape for a column kind, or `None` when no template carries it.
pub fn shape_for(kind: ScalarKind, signed: bool) -> Option<Shape> {
    let shape = match kind {
        ScalarKind::Boolean => Shape::Boolean,
        ScalarKind::TinyInt | ScalarKind::SmallInt | ScalarKind::Integer => {
            if signed {
                Shape::Int32
            } else {
                Shape::UInt32
            }
        }
        ScalarKind::BigInt => Shape::Int64,
        ScalarKind::Real => Shape::Float,
        ScalarKind::Double => Shape::Double,
        ScalarKind::Decimal => Shape::Decimal,
        ScalarKind::Char | ScalarKind::VarChar | ScalarKind::LongVarChar => Shape::Ascii,
        ScalarKind::NChar | ScalarKind::NVarChar | ScalarKind::Clob => Shape::Utf8,
        ScalarKind::Date | ScalarKind::Time | ScalarKind::Timestamp => Shape::DateTime,
        ScalarKind::TimestampTz => Shape::Timestamp,
        ScalarKind::Binary | ScalarKind::VarBinary | ScalarKind::Blob | ScalarKind::Uuid => {
            Shape::ByteArray
        }
        ScalarKind::Object | ScalarKind::Array => Shape::SerializedObject,
        ScalarKind::Interval | ScalarKind::Other => return None,
    };
    Some(shape)
}

/// Stateless encoder bound to one catalog and object codec.
#[derive(Clone)]
pub struct MetaEncoder {
    catalog: Arc<Catalog>,
    objects: Arc<dyn ObjectCodec>,
}

impl std::fmt::Debug for MetaEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetaEncoder")
            .field("templates", &self.catalog.len())
            .finish()
    }
}

impl MetaEncoder {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self {
            catalog,
            objects: Arc::new(JsonObjectCodec),
        }
    }

    pub fn with_object_codec(mut self, objects: Arc<dyn ObjectCodec>) -> Self {
        self.objects = objects;
        self
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// Build the message for one column value.
    ///
    /// `name` is the field name to emit, if any. A `MetaValue::Null` is only
    /// accepted for nullable columns.
    pub fn message(
        &self,
        column: &ColumnMeta,
        name: Option<&str>,
        value: &MetaValue,
    ) -> CodecResult<MetaMessage> {
        let shape = shape_for(column.kind, column.signed).ok_or(
            CodecError::UnsupportedColumnType {
                kind: column.kind,
                column: column.index,
            },
        )?;

        let scalar = if value.is_null() {
            if !column.nullable {
                return Err(CodecError::UnexpectedNull {
                    column: column.index,
                });
            }
            None
        } else {
            Some(self.scalar(column, shape, value)?)
        };

        let message = match (name, column.nullable) {
            (None, false) => MetaMessage::Value(scalar.ok_or(CodecError::UnexpectedNull {
                column: column.index,
            })?),
            (Some(name), false) => MetaMessage::Named {
                name: name.to_string(),
                value: scalar.ok_or(CodecError::UnexpectedNull {
                    column: column.index,
                })?,
            },
            (None, true) => MetaMessage::Nullable {
                shape,
                value: scalar,
            },
            (Some(name), true) => MetaMessage::NamedNullable {
                name: name.to_string(),
                shape,
                value: scalar,
            },
        };
        Ok(message)
    }

    /// Encode one column value into a complete frame.
    pub fn encode(
        &self,
        column: &ColumnMeta,
        name: Option<&str>,
        value: &MetaValue,
    ) -> CodecResult<Bytes> {
        let message = self.message(column, name, value)?;
        Ok(message.encode(&self.catalog)?.freeze())
    }

    /// Encode a frame for a template addressed by its catalog name.
    ///
    /// The template fixes the shape, so `value` must already be a `Scalar`
    /// of that shape. `None` is a null and is only valid for nullable
    /// templates, where it is written with the regular not-null flag.
    pub fn encode_by_name(
        &self,
        template: &str,
        name: Option<&str>,
        value: Option<Scalar>,
    ) -> CodecResult<Bytes> {
        let t = self.catalog.by_name(template)?;
        let category = t.category();

        if category.is_named() != name.is_some() {
            return Err(CodecError::Malformed(format!(
                "template {} {} a field name",
                t.name(),
                if category.is_named() { "requires" } else { "does not take" }
            )));
        }
        if let (Some(shape), Some(v)) = (t.shape(), value.as_ref()) {
            if v.shape() != shape {
                return Err(CodecError::TemplateMismatch {
                    template: t.name().to_string(),
                    expected: shape.name(),
                    found: v.shape().name(),
                });
            }
        }

        let name = name.map(str::to_string);
        let message = match (category, t.shape(), name, value) {
            (Category::BeginGroup, _, _, _) => MetaMessage::BeginGroup,
            (Category::EndGroup, _, _, _) => MetaMessage::EndGroup,
            (Category::Scalar, _, _, Some(v)) => MetaMessage::Value(v),
            (Category::Named, _, Some(name), Some(v)) => MetaMessage::Named { name, value: v },
            (Category::Nullable, Some(shape), _, value) => MetaMessage::Nullable { shape, value },
            (Category::NamedNullable, Some(shape), Some(name), value) => {
                MetaMessage::NamedNullable { name, shape, value }
            }
            _ => {
                return Err(CodecError::Malformed(format!(
                    "template {} cannot carry a null",
                    t.name()
                )))
            }
        };

        Ok(message.encode(&self.catalog)?.freeze())
    }

    fn scalar(&self, column: &ColumnMeta, shape: Shape, value: &MetaValue) -> CodecResult<Scalar> {
        let idx = column.index;
        let mismatch = || CodecError::ValueMismatch {
            column: idx,
            expected: shape.name(),
            found: value.type_name(),
        };
        let out_of_range = |detail: String| CodecError::ValueOutOfRange {
            column: idx,
            detail,
        };

        let scalar = match (shape, value) {
            (Shape::Boolean, MetaValue::Bool(b)) => Scalar::Boolean(*b),

            (Shape::Int32, MetaValue::Int(v)) => Scalar::Int32(
                i32::try_from(*v).map_err(|_| out_of_range(format!("{} does not fit Int32", v)))?,
            ),
            (Shape::UInt32, MetaValue::Int(v)) => Scalar::UInt32(
                u32::try_from(*v).map_err(|_| out_of_range(format!("{} does not fit UInt32", v)))?,
            ),
            (Shape::Int64, MetaValue::Int(v)) => Scalar::Int64(*v),

            (Shape::Float, MetaValue::Float(v)) => Scalar::Float(*v),
            (Shape::Double, MetaValue::Double(v)) => Scalar::Double(*v),
            (Shape::Double, MetaValue::Float(v)) => Scalar::Double(f64::from(*v)),

            (Shape::Decimal, MetaValue::Decimal(d)) => {
                Scalar::Decimal(rescale(*d, column.scale).ok_or_else(|| {
                    out_of_range(format!("{} does not fit scale {:?}", d, column.scale))
                })?)
            }
            (Shape::Decimal, MetaValue::Int(v)) => {
                let d = Decimal::new(*v, 0);
                Scalar::Decimal(rescale(d, column.scale).ok_or_else(|| {
                    out_of_range(format!("{} does not fit scale {:?}", v, column.scale))
                })?)
            }

            (Shape::Ascii, MetaValue::Text(s)) => {
                if !s.is_ascii() {
                    return Err(CodecError::ValueMismatch {
                        column: idx,
                        expected: "ASCII text",
                        found: "non-ASCII text",
                    });
                }
                Scalar::Ascii(s.clone())
            }
            (Shape::Utf8, MetaValue::Text(s)) => Scalar::Utf8(s.clone()),

            (Shape::ByteArray, MetaValue::Bytes(b)) => Scalar::ByteArray(Bytes::copy_from_slice(b)),

            (Shape::DateTime, MetaValue::Date(d)) => Scalar::DateTime(
                d.and_hms_opt(0, 0, 0)
                    .ok_or_else(mismatch)?
                    .and_utc()
                    .timestamp_millis(),
            ),
            (Shape::DateTime, MetaValue::Time(t)) => Scalar::DateTime(time_millis(*t)),
            (Shape::DateTime, MetaValue::DateTime(dt)) => {
                Scalar::DateTime(dt.and_utc().timestamp_millis())
            }
            (Shape::DateTime, MetaValue::Timestamp(ts)) => Scalar::DateTime(ts.timestamp_millis()),

            (Shape::Timestamp, MetaValue::Timestamp(ts)) => Scalar::Timestamp {
                millis: ts.timestamp_millis(),
                nanos: ts.timestamp_subsec_nanos() as i32,
                offset_minutes: ts.offset().local_minus_utc() / 60,
            },
            (Shape::Timestamp, MetaValue::DateTime(dt)) => {
                let utc = dt.and_utc();
                Scalar::Timestamp {
                    millis: utc.timestamp_millis(),
                    nanos: utc.timestamp_subsec_nanos() as i32,
                    offset_minutes: 0,
                }
            }

            (Shape::SerializedObject, MetaValue::Object(v)) => {
                Scalar::SerializedObject(Bytes::from(self.objects.encode(v)?))
            }

            _ => return Err(mismatch()),
        };
        Ok(scalar)
    }
}

fn rescale(d: Decimal, scale: Option<u32>) -> Option<Decimal> {
    match scale {
        Some(scale) => d.rescale(i32::try_from(scale).ok()?),
        None => Some(d),
    }
}

fn time_millis(t: NaiveTime) -> i64 {
    // nanosecond() exceeds 1e9 on a leap second; clamp into the same second
    let sub_ms = i64::from(t.nanosecond().min(999_999_999)) / 1_000_000;
    i64::from(t.num_seconds_from_midnight()) * 1000 + sub_ms
}
