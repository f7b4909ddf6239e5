//! Meta message wire encoding and decoding.
//!
//! Every message is a `u32` template ID followed by that template's fields.
//! All integers are big-endian. Variable-length fields (text, bytes, objects)
//! carry a `u32` byte length prefix.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::catalog::{Catalog, Category, Shape, Template, TemplateId};
use super::types::Decimal;
use crate::error::{CodecError, CodecResult};

/// Header size in bytes
pub const HEADER_LEN: usize = 4;

/// Not-null flag values
pub const FLAG_NULL: i32 = 0;
pub const FLAG_NOT_NULL: i32 = 1;

// ============================================================================
// Scalar Payloads
// ============================================================================

/// One value in its wire representation.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    UInt32(u32),
    Int32(i32),
    Int64(i64),
    Ascii(String),
    Utf8(String),
    Decimal(Decimal),
    ByteArray(Bytes),
    Boolean(bool),
    Float(f32),
    Double(f64),
    /// Milliseconds since the epoch
    DateTime(i64),
    SerializedObject(Bytes),
    Timestamp {
        millis: i64,
        nanos: i32,
        offset_minutes: i32,
    },
}

impl Scalar {
    pub fn shape(&self) -> Shape {
        match self {
            Scalar::UInt32(_) => Shape::UInt32,
            Scalar::Int32(_) => Shape::Int32,
            Scalar::Int64(_) => Shape::Int64,
            Scalar::Ascii(_) => Shape::Ascii,
            Scalar::Utf8(_) => Shape::Utf8,
            Scalar::Decimal(_) => Shape::Decimal,
            Scalar::ByteArray(_) => Shape::ByteArray,
            Scalar::Boolean(_) => Shape::Boolean,
            Scalar::Float(_) => Shape::Float,
            Scalar::Double(_) => Shape::Double,
            Scalar::DateTime(_) => Shape::DateTime,
            Scalar::SerializedObject(_) => Shape::SerializedObject,
            Scalar::Timestamp { .. } => Shape::Timestamp,
        }
    }

    fn put(&self, buf: &mut BytesMut) -> CodecResult<()> {
        match self {
            Scalar::UInt32(v) => buf.put_u32(*v),
            Scalar::Int32(v) => buf.put_i32(*v),
            Scalar::Int64(v) => buf.put_i64(*v),
            Scalar::Ascii(s) => put_ascii(buf, s)?,
            Scalar::Utf8(s) => put_bytes(buf, s.as_bytes())?,
            Scalar::Decimal(d) => {
                buf.put_i64(d.mantissa());
                buf.put_i32(d.exponent());
            }
            Scalar::ByteArray(b) | Scalar::SerializedObject(b) => put_bytes(buf, b)?,
            Scalar::Boolean(v) => buf.put_i32(i32::from(*v)),
            Scalar::Float(v) => buf.put_u32(v.to_bits()),
            Scalar::Double(v) => buf.put_u64(v.to_bits()),
            Scalar::DateTime(millis) => buf.put_i64(*millis),
            Scalar::Timestamp {
                millis,
                nanos,
                offset_minutes,
            } => {
                buf.put_i64(*millis);
                buf.put_i32(*nanos);
                buf.put_i32(*offset_minutes);
            }
        }
        Ok(())
    }

    fn get(shape: Shape, buf: &mut Bytes) -> CodecResult<Self> {
        match shape {
            Shape::UInt32 => Ok(Scalar::UInt32(get_u32(buf, "UInt32")?)),
            Shape::Int32 => Ok(Scalar::Int32(get_i32(buf, "Int32")?)),
            Shape::Int64 => Ok(Scalar::Int64(get_i64(buf, "Int64")?)),
            Shape::Ascii => Ok(Scalar::Ascii(read_ascii(buf)?)),
            Shape::Utf8 => {
                let data = read_bytes(buf, "UTF8")?;
                let s = std::str::from_utf8(&data)
                    .map_err(|e| CodecError::Malformed(format!("Invalid UTF-8 in UTF8 field: {}", e)))?;
                Ok(Scalar::Utf8(s.to_owned()))
            }
            Shape::Decimal => {
                let mantissa = get_i64(buf, "Decimal mantissa")?;
                let exponent = get_i32(buf, "Decimal exponent")?;
                Ok(Scalar::Decimal(Decimal::new(mantissa, exponent)))
            }
            Shape::ByteArray => Ok(Scalar::ByteArray(read_bytes(buf, "ByteArray")?)),
            Shape::Boolean => match get_i32(buf, "Boolean")? {
                0 => Ok(Scalar::Boolean(false)),
                1 => Ok(Scalar::Boolean(true)),
                other => Err(CodecError::Malformed(format!(
                    "Invalid Boolean value: {}",
                    other
                ))),
            },
            Shape::Float => Ok(Scalar::Float(f32::from_bits(get_u32(buf, "Float")?))),
            Shape::Double => Ok(Scalar::Double(f64::from_bits(get_u64(buf, "Double")?))),
            Shape::DateTime => Ok(Scalar::DateTime(get_i64(buf, "DateTime")?)),
            Shape::SerializedObject => Ok(Scalar::SerializedObject(read_bytes(
                buf,
                "SerializedObject",
            )?)),
            Shape::Timestamp => {
                let millis = get_i64(buf, "Timestamp millis")?;
                let nanos = get_i32(buf, "Timestamp nanos")?;
                let offset_minutes = get_i32(buf, "Timestamp offset")?;
                Ok(Scalar::Timestamp {
                    millis,
                    nanos,
                    offset_minutes,
                })
            }
        }
    }
}

// ============================================================================
// Messages
// ============================================================================

/// One template instance: the closed set of things that can travel on the
/// wire.
#[derive(Debug, Clone, PartialEq)]
pub enum MetaMessage {
    Value(Scalar),
    Named {
        name: String,
        value: Scalar,
    },
    Nullable {
        shape: Shape,
        value: Option<Scalar>,
    },
    NamedNullable {
        name: String,
        shape: Shape,
        value: Option<Scalar>,
    },
    BeginGroup,
    EndGroup,
}

impl MetaMessage {
    pub fn category(&self) -> Category {
        match self {
            MetaMessage::Value(_) => Category::Scalar,
            MetaMessage::Named { .. } => Category::Named,
            MetaMessage::Nullable { .. } => Category::Nullable,
            MetaMessage::NamedNullable { .. } => Category::NamedNullable,
            MetaMessage::BeginGroup => Category::BeginGroup,
            MetaMessage::EndGroup => Category::EndGroup,
        }
    }

    pub fn shape(&self) -> Option<Shape> {
        match self {
            MetaMessage::Value(v) | MetaMessage::Named { value: v, .. } => Some(v.shape()),
            MetaMessage::Nullable { shape, .. } | MetaMessage::NamedNullable { shape, .. } => {
                Some(*shape)
            }
            MetaMessage::BeginGroup | MetaMessage::EndGroup => None,
        }
    }

    /// Resolve the template this message travels under.
    pub fn template<'c>(&self, catalog: &'c Catalog) -> CodecResult<&'c Template> {
        match self {
            MetaMessage::BeginGroup => catalog.marker(true),
            MetaMessage::EndGroup => catalog.marker(false),
            _ => {
                let category = self.category();
                // shape() is Some for every non-marker message
                let shape = self.shape().ok_or_else(|| {
                    CodecError::CatalogLookup(format!("{:?} without shape", category))
                })?;
                catalog.select(shape, category.is_named(), category.is_nullable())
            }
        }
    }

    /// Encode header and fields into a fresh buffer.
    pub fn encode(&self, catalog: &Catalog) -> CodecResult<BytesMut> {
        let template = self.template(catalog)?;
        let mut buf = BytesMut::with_capacity(HEADER_LEN + 16);
        buf.put_u32(template.id().as_u32());

        match self {
            MetaMessage::Value(value) => value.put(&mut buf)?,
            MetaMessage::Named { name, value } => {
                put_ascii(&mut buf, name)?;
                value.put(&mut buf)?;
            }
            MetaMessage::Nullable { shape, value } => {
                put_nullable(&mut buf, *shape, value.as_ref())?;
            }
            MetaMessage::NamedNullable { name, shape, value } => {
                put_ascii(&mut buf, name)?;
                put_nullable(&mut buf, *shape, value.as_ref())?;
            }
            MetaMessage::BeginGroup | MetaMessage::EndGroup => {}
        }

        Ok(buf)
    }

    /// Decode a complete frame: header, then the body for that template.
    ///
    /// Fails with `UnknownTemplate` when the header is not in `catalog`.
    pub fn decode(catalog: &Catalog, frame: &mut Bytes) -> CodecResult<(TemplateId, Self)> {
        let id = read_header(frame)?;
        let template = catalog
            .by_id(id)
            .map_err(|_| CodecError::UnknownTemplate(id.as_u32()))?;
        let message = Self::decode_body(template, frame)?;
        Ok((id, message))
    }

    /// Decode the fields that follow a header for `template`.
    pub fn decode_body(template: &Template, buf: &mut Bytes) -> CodecResult<Self> {
        let category = template.category();
        let shape = match (category, template.shape()) {
            (Category::BeginGroup, _) => return Ok(MetaMessage::BeginGroup),
            (Category::EndGroup, _) => return Ok(MetaMessage::EndGroup),
            (_, Some(shape)) => shape,
            (_, None) => {
                return Err(CodecError::Malformed(format!(
                    "Template {} has no shape",
                    template.id()
                )))
            }
        };

        match category {
            Category::Scalar => Ok(MetaMessage::Value(Scalar::get(shape, buf)?)),
            Category::Named => {
                let name = read_ascii(buf)?;
                let value = Scalar::get(shape, buf)?;
                Ok(MetaMessage::Named { name, value })
            }
            Category::Nullable => {
                let value = get_nullable(buf, shape)?;
                Ok(MetaMessage::Nullable { shape, value })
            }
            Category::NamedNullable => {
                let name = read_ascii(buf)?;
                let value = get_nullable(buf, shape)?;
                Ok(MetaMessage::NamedNullable { name, shape, value })
            }
            Category::BeginGroup => Ok(MetaMessage::BeginGroup),
            Category::EndGroup => Ok(MetaMessage::EndGroup),
        }
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Read the template ID that starts every message.
pub fn read_header(buf: &mut Bytes) -> CodecResult<TemplateId> {
    Ok(TemplateId(get_u32(buf, "header")?))
}

fn put_nullable(buf: &mut BytesMut, shape: Shape, value: Option<&Scalar>) -> CodecResult<()> {
    match value {
        None => buf.put_i32(FLAG_NULL),
        Some(v) => {
            if v.shape() != shape {
                return Err(CodecError::Malformed(format!(
                    "{} value in a {} template",
                    v.shape().name(),
                    shape.name()
                )));
            }
            buf.put_i32(FLAG_NOT_NULL);
            v.put(buf)?;
        }
    }
    Ok(())
}

fn get_nullable(buf: &mut Bytes, shape: Shape) -> CodecResult<Option<Scalar>> {
    match get_i32(buf, "not-null flag")? {
        FLAG_NULL => Ok(None),
        FLAG_NOT_NULL => Ok(Some(Scalar::get(shape, buf)?)),
        other => Err(CodecError::Malformed(format!(
            "Invalid not-null flag: {}",
            other
        ))),
    }
}

fn put_ascii(buf: &mut BytesMut, s: &str) -> CodecResult<()> {
    if !s.is_ascii() {
        return Err(CodecError::Malformed(format!(
            "Non-ASCII text in ASCII field: {:?}",
            s
        )));
    }
    put_bytes(buf, s.as_bytes())
}

fn put_bytes(buf: &mut BytesMut, data: &[u8]) -> CodecResult<()> {
    let len = u32::try_from(data.len())
        .map_err(|_| CodecError::Malformed(format!("Field too large: {} bytes", data.len())))?;
    buf.put_u32(len);
    buf.put_slice(data);
    Ok(())
}

#[inline]
fn ensure(buf: &Bytes, needed: usize, what: &str) -> CodecResult<()> {
    if buf.remaining() < needed {
        return Err(CodecError::Malformed(format!(
            "Short read for {}: need {} bytes, have {}",
            what,
            needed,
            buf.remaining()
        )));
    }
    Ok(())
}

fn get_u32(buf: &mut Bytes, what: &str) -> CodecResult<u32> {
    ensure(buf, 4, what)?;
    Ok(buf.get_u32())
}

fn get_i32(buf: &mut Bytes, what: &str) -> CodecResult<i32> {
    ensure(buf, 4, what)?;
    Ok(buf.get_i32())
}

fn get_u64(buf: &mut Bytes, what: &str) -> CodecResult<u64> {
    ensure(buf, 8, what)?;
    Ok(buf.get_u64())
}

fn get_i64(buf: &mut Bytes, what: &str) -> CodecResult<i64> {
    ensure(buf, 8, what)?;
    Ok(buf.get_i64())
}

/// Read a length-prefixed byte field without copying.
fn read_bytes(buf: &mut Bytes, what: &str) -> CodecResult<Bytes> {
    let len = get_u32(buf, what)? as usize;
    ensure(buf, len, what)?;
    Ok(buf.split_to(len))
}

/// Read a length-prefixed ASCII field.
fn read_ascii(buf: &mut Bytes) -> CodecResult<String> {
    let data = read_bytes(buf, "ASCII")?;
    if !data.is_ascii() {
        return Err(CodecError::Malformed(
            "Non-ASCII byte in ASCII field".to_string(),
        ));
    }
    // ASCII is valid UTF-8
    Ok(String::from_utf8_lossy(&data).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int32_message_structure() {
        let catalog = Catalog::builtin();
        let msg = MetaMessage::Value(Scalar::Int32(42));

        let encoded = msg.encode(&catalog).unwrap();

        assert_eq!(encoded.len(), 8);
        let id = u32::from_be_bytes([encoded[0], encoded[1], encoded[2], encoded[3]]);
        assert_eq!(id, 130);
        let value = i32::from_be_bytes([encoded[4], encoded[5], encoded[6], encoded[7]]);
        assert_eq!(value, 42);
    }

    #[test]
    fn test_unnamed_null_is_flag_only() {
        let catalog = Catalog::builtin();
        let msg = MetaMessage::Nullable {
            shape: Shape::Int32,
            value: None,
        };

        let encoded = msg.encode(&catalog).unwrap();

        // header + flag, no payload
        assert_eq!(&encoded[..], &[0, 0, 1, 130, 0, 0, 0, 0]);
    }

    #[test]
    fn test_named_null_writes_name_then_flag() {
        let catalog = Catalog::builtin();
        let msg = MetaMessage::NamedNullable {
            name: "ID".to_string(),
            shape: Shape::Int32,
            value: None,
        };

        let encoded = msg.encode(&catalog).unwrap();

        // 450 = 0x01C2
        assert_eq!(
            &encoded[..],
            &[0, 0, 1, 0xC2, 0, 0, 0, 2, b'I', b'D', 0, 0, 0, 0]
        );
    }

    #[test]
    fn test_group_markers_have_no_payload() {
        let catalog = Catalog::builtin();
        let begin = MetaMessage::BeginGroup.encode(&catalog).unwrap();
        let end = MetaMessage::EndGroup.encode(&catalog).unwrap();
        assert_eq!(&begin[..], &144u32.to_be_bytes());
        assert_eq!(&end[..], &146u32.to_be_bytes());
    }

    #[test]
    fn test_decimal_field_layout() {
        let catalog = Catalog::builtin();
        let msg = MetaMessage::Value(Scalar::Decimal(Decimal::new(10, 2)));
        let encoded = msg.encode(&catalog).unwrap();

        let mut expected = 140u32.to_be_bytes().to_vec();
        expected.extend_from_slice(&10i64.to_be_bytes());
        expected.extend_from_slice(&2i32.to_be_bytes());
        assert_eq!(&encoded[..], &expected[..]);
    }

    #[test]
    fn test_short_frame_is_malformed() {
        let catalog = Catalog::builtin();
        // Int64 header with only 4 of 8 payload bytes
        let mut frame = Bytes::from_static(&[0, 0, 0, 134, 0, 0, 0, 1]);
        let err = MetaMessage::decode(&catalog, &mut frame).unwrap_err();
        assert!(matches!(err, CodecError::Malformed(_)));
    }

    #[test]
    fn test_unknown_header_is_unknown_template() {
        let catalog = Catalog::builtin();
        let mut frame = Bytes::from_static(&[0, 0, 0, 132]);
        let err = MetaMessage::decode(&catalog, &mut frame).unwrap_err();
        assert!(matches!(err, CodecError::UnknownTemplate(132)));
    }

    #[test]
    fn test_bad_not_null_flag_is_malformed() {
        let catalog = Catalog::builtin();
        let mut frame = Bytes::from_static(&[0, 0, 1, 130, 0, 0, 0, 7]);
        let err = MetaMessage::decode(&catalog, &mut frame).unwrap_err();
        assert!(matches!(err, CodecError::Malformed(_)));
    }

    #[test]
    fn test_non_ascii_name_is_rejected() {
        let catalog = Catalog::builtin();
        let msg = MetaMessage::Named {
            name: "caf\u{e9}".to_string(),
            value: Scalar::Int32(1),
        };
        assert!(msg.encode(&catalog).is_err());
    }
}
