//! Attribute value kinds and their order-preserving byte codecs.
//!
//! Every kind encodes so that unsigned lexicographic comparison of the
//! encoded bytes agrees with the natural order of the values:
//!
//! - BOOL: one byte, `false < true`
//! - LONG: 8 bytes big-endian with the sign bit flipped
//! - DOUBLE: 8 bytes IEEE-754 big-endian; positive values flip the sign
//!   bit, negative values flip all bits (standard total-order transform)
//! - STRING: 1-byte length prefix (max 255) followed by UTF-8 bytes
//! - DATETIME: epoch milliseconds in UTC, encoded like LONG

use crate::error::EncodingError;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Maximum byte length of an encodable string value
pub const STRING_MAX_LENGTH: usize = 255;

/// Value kind of an attribute type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    Bool,
    Long,
    Double,
    String,
    DateTime,
}

impl ValueKind {
    /// The value-type tag byte embedded in attribute IIDs
    pub fn tag(self) -> u8 {
        match self {
            ValueKind::Bool => 0x01,
            ValueKind::Long => 0x02,
            ValueKind::Double => 0x03,
            ValueKind::String => 0x04,
            ValueKind::DateTime => 0x05,
        }
    }

    pub fn from_tag(tag: u8) -> Option<ValueKind> {
        match tag {
            0x01 => Some(ValueKind::Bool),
            0x02 => Some(ValueKind::Long),
            0x03 => Some(ValueKind::Double),
            0x04 => Some(ValueKind::String),
            0x05 => Some(ValueKind::DateTime),
            _ => None,
        }
    }

    /// Whether values of this kind are comparable with values of `other`.
    /// LONG and DOUBLE compare across kinds; everything else only within
    /// its own kind.
    pub fn comparable_to(self, other: ValueKind) -> bool {
        match (self, other) {
            (ValueKind::Long | ValueKind::Double, ValueKind::Long | ValueKind::Double) => true,
            (a, b) => a == b,
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Bool => "bool",
            ValueKind::Long => "long",
            ValueKind::Double => "double",
            ValueKind::String => "string",
            ValueKind::DateTime => "datetime",
        };
        write!(f, "{name}")
    }
}

/// A typed attribute value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Bool(bool),
    Long(i64),
    Double(f64),
    String(String),
    DateTime(NaiveDateTime),
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Bool(_) => ValueKind::Bool,
            Value::Long(_) => ValueKind::Long,
            Value::Double(_) => ValueKind::Double,
            Value::String(_) => ValueKind::String,
            Value::DateTime(_) => ValueKind::DateTime,
        }
    }

    /// Encode the value bytes (without the kind tag)
    pub fn encode(&self) -> Result<Vec<u8>, EncodingError> {
        match self {
            Value::Bool(b) => Ok(vec![u8::from(*b)]),
            Value::Long(v) => Ok(encode_i64(*v).to_vec()),
            Value::Double(v) => Ok(encode_f64(*v).to_vec()),
            Value::String(s) => {
                if s.len() > STRING_MAX_LENGTH {
                    return Err(EncodingError::ValueTooLong { length: s.len() });
                }
                let mut bytes = Vec::with_capacity(1 + s.len());
                bytes.push(s.len() as u8);
                bytes.extend_from_slice(s.as_bytes());
                Ok(bytes)
            }
            Value::DateTime(dt) => Ok(encode_i64(dt.and_utc().timestamp_millis()).to_vec()),
        }
    }

    /// Decode value bytes of a known kind. Returns None on a malformed
    /// slice; callers translate that into a fatal internal error.
    pub fn decode(kind: ValueKind, bytes: &[u8]) -> Option<Value> {
        match kind {
            ValueKind::Bool => match bytes {
                [0] => Some(Value::Bool(false)),
                [1] => Some(Value::Bool(true)),
                _ => None,
            },
            ValueKind::Long => Some(Value::Long(decode_i64(bytes.try_into().ok()?))),
            ValueKind::Double => Some(Value::Double(decode_f64(bytes.try_into().ok()?))),
            ValueKind::String => {
                let (&len, rest) = bytes.split_first()?;
                if rest.len() != len as usize {
                    return None;
                }
                Some(Value::String(String::from_utf8(rest.to_vec()).ok()?))
            }
            ValueKind::DateTime => {
                let millis = decode_i64(bytes.try_into().ok()?);
                chrono::DateTime::from_timestamp_millis(millis)
                    .map(|dt| Value::DateTime(dt.naive_utc()))
            }
        }
    }

    /// Number of value bytes occupied at the head of `bytes`, given the
    /// kind. Used when parsing attribute IIDs out of edge keys.
    pub fn encoded_len(kind: ValueKind, bytes: &[u8]) -> Option<usize> {
        match kind {
            ValueKind::Bool => Some(1),
            ValueKind::Long | ValueKind::Double | ValueKind::DateTime => Some(8),
            ValueKind::String => bytes.first().map(|&len| 1 + len as usize),
        }
    }

    /// Order two values, numerically across LONG/DOUBLE. None when the
    /// kinds are not comparable.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::Long(a), Value::Long(b)) => Some(a.cmp(b)),
            (Value::Double(a), Value::Double(b)) => a.partial_cmp(b),
            (Value::Long(a), Value::Double(b)) => (*a as f64).partial_cmp(b),
            (Value::Double(a), Value::Long(b)) => a.partial_cmp(&(*b as f64)),
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::DateTime(a), Value::DateTime(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Long(v) => write!(f, "{v}"),
            Value::Double(v) => write!(f, "{v}"),
            Value::String(s) => write!(f, "\"{s}\""),
            Value::DateTime(dt) => write!(f, "{dt}"),
        }
    }
}

fn encode_i64(v: i64) -> [u8; 8] {
    // Flipping the sign bit maps i64 order onto unsigned byte order
    ((v as u64) ^ (1 << 63)).to_be_bytes()
}

fn decode_i64(bytes: [u8; 8]) -> i64 {
    (u64::from_be_bytes(bytes) ^ (1 << 63)) as i64
}

fn encode_f64(v: f64) -> [u8; 8] {
    let bits = v.to_bits();
    let ordered = if bits & (1 << 63) == 0 {
        bits ^ (1 << 63)
    } else {
        !bits
    };
    ordered.to_be_bytes()
}

fn decode_f64(bytes: [u8; 8]) -> f64 {
    let ordered = u64::from_be_bytes(bytes);
    let bits = if ordered & (1 << 63) != 0 {
        ordered ^ (1 << 63)
    } else {
        !ordered
    };
    f64::from_bits(bits)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_each_kind() {
        let values = vec![
            Value::Bool(true),
            Value::Long(-42),
            Value::Double(3.5),
            Value::String("foo".into()),
            Value::DateTime(
                chrono::DateTime::from_timestamp_millis(1_500_000_000_123)
                    .expect("in range")
                    .naive_utc(),
            ),
        ];
        for v in values {
            let bytes = v.encode().expect("encodes");
            assert_eq!(Value::decode(v.kind(), &bytes), Some(v));
        }
    }

    #[test]
    fn test_long_encoding_orders_negatives_before_positives() {
        let lo = Value::Long(-5).encode().expect("encodes");
        let hi = Value::Long(5).encode().expect("encodes");
        assert!(lo < hi);
    }

    #[test]
    fn test_double_encoding_total_order() {
        let samples = [-1.0e9, -2.5, -0.0, 0.0, 1.0e-9, 2.5, 1.0e9];
        for window in samples.windows(2) {
            let a = Value::Double(window[0]).encode().expect("encodes");
            let b = Value::Double(window[1]).encode().expect("encodes");
            assert!(a <= b, "{} should encode <= {}", window[0], window[1]);
        }
    }

    #[test]
    fn test_string_too_long_rejected() {
        let long = "x".repeat(256);
        assert_eq!(
            Value::String(long.clone()).encode(),
            Err(EncodingError::ValueTooLong { length: 256 })
        );
        assert!(Value::String("x".repeat(255)).encode().is_ok());
    }

    #[test]
    fn test_cross_kind_numeric_compare() {
        assert_eq!(
            Value::Long(2).compare(&Value::Double(2.5)),
            Some(Ordering::Less)
        );
        assert_eq!(Value::Long(2).compare(&Value::String("2".into())), None);
    }
}
