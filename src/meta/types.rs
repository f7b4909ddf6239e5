//! Value types shared by the encoder and decoder.
//!
//! `MetaValue` is what a source adapter hands to the encoder, `Entry` is what
//! the decoder appends to its output sequence. The wire only knows template
//! shapes, so a `Date` column comes back as an `Entry::DateTime` and a zoned
//! timestamp comes back as three entries.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Utc};

// ============================================================================
// Scalar Kinds
// ============================================================================

/// Canonical column categories reported by a source adapter.
///
/// Adapters own the mapping from their native type codes to these kinds. The
/// encoder maps each kind to exactly one wire shape; `Interval` and `Other`
/// have no shape and are rejected with `UnsupportedColumnType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    // Boolean types
    Boolean,

    // Integer types
    TinyInt,
    SmallInt,
    Integer,
    BigInt,

    // Floating point types
    Real,
    Double,

    // Fixed point
    Decimal,

    // Single-byte character types
    Char,
    VarChar,
    LongVarChar,

    // Unicode character types
    NChar,
    NVarChar,
    Clob,

    // Date/time types
    Date,
    Time,
    Timestamp,
    TimestampTz,

    // Binary data
    Binary,
    VarBinary,
    Blob,
    Uuid,

    // Opaque values carried through the object codec
    Object,
    Array,

    // No wire template
    Interval,
    Other,
}

impl ScalarKind {
    /// Check if this is an integer kind (signedness applies)
    pub fn is_integer(self) -> bool {
        matches!(
            self,
            ScalarKind::TinyInt | ScalarKind::SmallInt | ScalarKind::Integer | ScalarKind::BigInt
        )
    }

    /// Check if this is a text-like kind
    pub fn is_text_like(self) -> bool {
        matches!(
            self,
            ScalarKind::Char
                | ScalarKind::VarChar
                | ScalarKind::LongVarChar
                | ScalarKind::NChar
                | ScalarKind::NVarChar
                | ScalarKind::Clob
        )
    }
}

// ============================================================================
// Decimal
// ============================================================================

/// Exact fixed-point number: `mantissa × 10^-exponent`.
///
/// `Decimal::new(10, 2)` is 0.10. Equality is structural, so 0.10 and 0.1
/// are different values; rescale first when comparing across scales.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Decimal {
    mantissa: i64,
    exponent: i32,
}

/// Error returned when a string is not a plain decimal literal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseDecimalError(String);

impl fmt::Display for ParseDecimalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid decimal literal: {}", self.0)
    }
}

impl std::error::Error for ParseDecimalError {}

impl Decimal {
    #[inline]
    pub const fn new(mantissa: i64, exponent: i32) -> Self {
        Self { mantissa, exponent }
    }

    #[inline]
    pub fn mantissa(self) -> i64 {
        self.mantissa
    }

    #[inline]
    pub fn exponent(self) -> i32 {
        self.exponent
    }

    /// Change the exponent without changing the value.
    ///
    /// Returns `None` when the mantissa overflows or when lowering the
    /// exponent would drop non-zero digits.
    pub fn rescale(self, exponent: i32) -> Option<Self> {
        let diff = i64::from(exponent) - i64::from(self.exponent);
        if diff == 0 {
            return Some(self);
        }
        let factor = 10i64.checked_pow(u32::try_from(diff.unsigned_abs()).ok()?)?;
        let mantissa = if diff > 0 {
            self.mantissa.checked_mul(factor)?
        } else {
            if self.mantissa % factor != 0 {
                return None;
            }
            self.mantissa / factor
        };
        Some(Self { mantissa, exponent })
    }

    /// Build a decimal with a fixed scale from a float the source produced.
    ///
    /// The float is rounded to `scale` digits through its shortest decimal
    /// rendering, so `0.1` at scale 2 becomes `10 × 10^-2`.
    pub fn from_f64_scaled(value: f64, scale: u32) -> Option<Self> {
        if !value.is_finite() {
            return None;
        }
        let rendered = format!("{:.*}", scale as usize, value);
        rendered.parse().ok()
    }
}

impl FromStr for Decimal {
    type Err = ParseDecimalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseDecimalError(s.to_string());
        let trimmed = s.trim();
        let (negative, body) = match trimmed.as_bytes().first() {
            Some(b'-') => (true, &trimmed[1..]),
            Some(b'+') => (false, &trimmed[1..]),
            _ => (false, trimmed),
        };
        let (int_part, frac_part) = match body.split_once('.') {
            Some((i, f)) => (i, f),
            None => (body, ""),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(err());
        }

        let mut mantissa: i64 = 0;
        for b in int_part.bytes().chain(frac_part.bytes()) {
            if !b.is_ascii_digit() {
                return Err(err());
            }
            mantissa = mantissa
                .checked_mul(10)
                .and_then(|m| m.checked_add(i64::from(b - b'0')))
                .ok_or_else(err)?;
        }
        let exponent = i32::try_from(frac_part.len()).map_err(|_| err())?;

        Ok(Self {
            mantissa: if negative { -mantissa } else { mantissa },
            exponent,
        })
    }
}

/// Widest exponent written in plain notation. Frames carry any i32 exponent,
/// so anything wider is written as `<mantissa>e<power>`.
const MAX_PLAIN_EXPONENT: u32 = 64;

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.exponent.unsigned_abs() > MAX_PLAIN_EXPONENT {
            return write!(f, "{}e{}", self.mantissa, -i64::from(self.exponent));
        }
        if self.exponent <= 0 {
            write!(f, "{}", self.mantissa)?;
            for _ in 0..self.exponent.unsigned_abs() {
                f.write_str("0")?;
            }
            return Ok(());
        }

        let digits = self.mantissa.unsigned_abs().to_string();
        let scale = self.exponent as usize;
        let padded = if digits.len() <= scale {
            format!("{}{}", "0".repeat(scale + 1 - digits.len()), digits)
        } else {
            digits
        };
        let (int_part, frac_part) = padded.split_at(padded.len() - scale);
        if self.mantissa < 0 {
            f.write_str("-")?;
        }
        write!(f, "{}.{}", int_part, frac_part)
    }
}

// ============================================================================
// Source Values
// ============================================================================

/// An already-unwrapped native value supplied by a source adapter.
#[derive(Debug, Clone, PartialEq)]
pub enum MetaValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f32),
    Double(f64),
    Decimal(Decimal),
    Text(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
    Timestamp(DateTime<FixedOffset>),
    Object(serde_json::Value),
}

impl MetaValue {
    /// Check if this value is NULL
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, MetaValue::Null)
    }

    /// Short variant name used in mismatch errors.
    pub fn type_name(&self) -> &'static str {
        match self {
            MetaValue::Null => "null",
            MetaValue::Bool(_) => "bool",
            MetaValue::Int(_) => "int",
            MetaValue::Float(_) => "float",
            MetaValue::Double(_) => "double",
            MetaValue::Decimal(_) => "decimal",
            MetaValue::Text(_) => "text",
            MetaValue::Bytes(_) => "bytes",
            MetaValue::Date(_) => "date",
            MetaValue::Time(_) => "time",
            MetaValue::DateTime(_) => "datetime",
            MetaValue::Timestamp(_) => "timestamp",
            MetaValue::Object(_) => "object",
        }
    }
}

// ============================================================================
// Decoded Entries
// ============================================================================

/// Sentinel emitted for a BeginGroup marker.
pub const BEGIN_GROUP: &str = "**BEGIN GROUP**";

/// Sentinel emitted for an EndGroup marker.
pub const END_GROUP: &str = "**END GROUP**";

/// One element of the flat decoded sequence.
#[derive(Debug, Clone, PartialEq)]
pub enum Entry {
    Null,
    /// Field name preceding a named value
    Name(String),
    UInt32(u32),
    Int32(i32),
    Int64(i64),
    Text(String),
    Decimal(Decimal),
    Bytes(Vec<u8>),
    Bool(bool),
    Float(f32),
    Double(f64),
    DateTime(DateTime<Utc>),
    Object(serde_json::Value),
    BeginGroup,
    EndGroup,
}

impl Entry {
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Entry::Null)
    }

    /// String view of names, text values and group sentinels.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Entry::Name(s) | Entry::Text(s) => Some(s),
            Entry::BeginGroup => Some(BEGIN_GROUP),
            Entry::EndGroup => Some(END_GROUP),
            _ => None,
        }
    }

    /// Widened view of the integer variants.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Entry::UInt32(v) => Some(i64::from(*v)),
            Entry::Int32(v) => Some(i64::from(*v)),
            Entry::Int64(v) => Some(*v),
            _ => None,
        }
    }
}

impl PartialEq<&str> for Entry {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == Some(*other)
    }
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Entry::Null => f.write_str("null"),
            Entry::Name(s) | Entry::Text(s) => f.write_str(s),
            Entry::UInt32(v) => write!(f, "{}", v),
            Entry::Int32(v) => write!(f, "{}", v),
            Entry::Int64(v) => write!(f, "{}", v),
            Entry::Decimal(d) => write!(f, "{}", d),
            Entry::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            Entry::Bool(v) => write!(f, "{}", v),
            Entry::Float(v) => write!(f, "{}", v),
            Entry::Double(v) => write!(f, "{}", v),
            Entry::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S%.3f")),
            Entry::Object(v) => write!(f, "{}", v),
            Entry::BeginGroup => f.write_str(BEGIN_GROUP),
            Entry::EndGroup => f.write_str(END_GROUP),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        assert!(ScalarKind::TinyInt.is_integer());
        assert!(ScalarKind::BigInt.is_integer());
        assert!(!ScalarKind::Decimal.is_integer());

        assert!(ScalarKind::Char.is_text_like());
        assert!(ScalarKind::Clob.is_text_like());
        assert!(!ScalarKind::Blob.is_text_like());
    }

    #[test]
    fn test_decimal_parse_keeps_scale() {
        let d: Decimal = "0.10".parse().unwrap();
        assert_eq!(d.mantissa(), 10);
        assert_eq!(d.exponent(), 2);

        let d: Decimal = "-12.5".parse().unwrap();
        assert_eq!(d, Decimal::new(-125, 1));

        let d: Decimal = "42".parse().unwrap();
        assert_eq!(d, Decimal::new(42, 0));
    }

    #[test]
    fn test_decimal_parse_rejects_garbage() {
        assert!("".parse::<Decimal>().is_err());
        assert!("1.2.3".parse::<Decimal>().is_err());
        assert!("1e5".parse::<Decimal>().is_err());
        assert!("99999999999999999999".parse::<Decimal>().is_err());
    }

    #[test]
    fn test_decimal_rescale() {
        let d = Decimal::new(4, 1);
        assert_eq!(d.rescale(4), Some(Decimal::new(4000, 4)));
        assert_eq!(Decimal::new(4000, 4).rescale(1), Some(d));
        assert_eq!(Decimal::new(4001, 4).rescale(1), None);
        assert_eq!(Decimal::new(i64::MAX, 0).rescale(1), None);
    }

    #[test]
    fn test_decimal_from_float() {
        assert_eq!(Decimal::from_f64_scaled(0.1, 2), Some(Decimal::new(10, 2)));
        assert_eq!(Decimal::from_f64_scaled(0.4, 4), Some(Decimal::new(4000, 4)));
        assert_eq!(Decimal::from_f64_scaled(f64::NAN, 2), None);
    }

    #[test]
    fn test_decimal_display() {
        assert_eq!(Decimal::new(10, 2).to_string(), "0.10");
        assert_eq!(Decimal::new(-5, 3).to_string(), "-0.005");
        assert_eq!(Decimal::new(12345, 2).to_string(), "123.45");
        assert_eq!(Decimal::new(7, -2).to_string(), "700");
    }

    #[test]
    fn test_decimal_display_extreme_exponents() {
        assert_eq!(Decimal::new(3, i32::MIN).to_string(), "3e2147483648");
        assert_eq!(Decimal::new(-3, i32::MAX).to_string(), "-3e-2147483647");
        assert_eq!(Decimal::new(1, 64).to_string().len(), 66);
        assert_eq!(Decimal::new(1, 65).to_string(), "1e-65");
    }

    #[test]
    fn test_entry_string_views() {
        assert_eq!(Entry::BeginGroup, BEGIN_GROUP);
        assert_eq!(Entry::EndGroup, END_GROUP);
        assert_eq!(Entry::Name("FIELD".to_string()), "FIELD");
        assert_ne!(Entry::Int32(0), "0");
        assert_eq!(Entry::UInt32(7).as_i64(), Some(7));
    }
}
