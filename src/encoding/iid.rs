//! Typed identifiers for vertices.
//!
//! A type IID is 3 bytes; a thing IID embeds its type's IID so the forward
//! ISA edge never touches storage, and attribute IIDs are content addresses
//! of their typed value.

use super::{Prefix, Value, ValueKind};
use crate::error::EncodingError;
use std::fmt;

/// Identifier of a type vertex: `prefix(1) ∥ key(2)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeIid {
    bytes: [u8; 3],
}

impl TypeIid {
    pub const LENGTH: usize = 3;

    pub fn new(prefix: Prefix, key: u16) -> TypeIid {
        debug_assert!(prefix.is_type());
        let k = key.to_be_bytes();
        TypeIid {
            bytes: [prefix.byte(), k[0], k[1]],
        }
    }

    pub fn from_bytes(bytes: [u8; 3]) -> Option<TypeIid> {
        Prefix::from_byte(bytes[0]).filter(|p| p.is_type())?;
        Some(TypeIid { bytes })
    }

    pub fn bytes(self) -> [u8; 3] {
        self.bytes
    }

    pub fn prefix(self) -> Prefix {
        // Constructors guarantee a valid type prefix byte
        Prefix::from_byte(self.bytes[0]).unwrap_or(Prefix::TypeEntity)
    }

    pub fn key(self) -> u16 {
        u16::from_be_bytes([self.bytes[1], self.bytes[2]])
    }
}

impl fmt::Display for TypeIid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02x}{:02x}{:02x}", self.bytes[0], self.bytes[1], self.bytes[2])
    }
}

/// Identifier of a thing vertex.
///
/// Entities, relations and role instances are fixed 12 bytes:
/// `prefix(1) ∥ type-iid(3) ∥ key(8)`. Attributes are variable length:
/// `prefix(1) ∥ type-iid(3) ∥ value-tag(1) ∥ value-bytes`, which makes the
/// IID a content address of the typed value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ThingIid {
    bytes: Vec<u8>,
}

impl ThingIid {
    pub const OBJECT_LENGTH: usize = 12;

    /// IID of an entity, relation or role instance
    pub fn object(type_iid: TypeIid, key: u64) -> ThingIid {
        let thing_prefix = type_iid
            .prefix()
            .instance_prefix()
            .unwrap_or(Prefix::ThingEntity);
        let mut bytes = Vec::with_capacity(Self::OBJECT_LENGTH);
        bytes.push(thing_prefix.byte());
        bytes.extend_from_slice(&type_iid.bytes());
        bytes.extend_from_slice(&key.to_be_bytes());
        ThingIid { bytes }
    }

    /// Content-addressed IID of an attribute
    pub fn attribute(type_iid: TypeIid, value: &Value) -> Result<ThingIid, EncodingError> {
        let value_bytes = value.encode()?;
        let mut bytes = Vec::with_capacity(5 + value_bytes.len());
        bytes.push(Prefix::ThingAttribute.byte());
        bytes.extend_from_slice(&type_iid.bytes());
        bytes.push(value.kind().tag());
        bytes.extend_from_slice(&value_bytes);
        Ok(ThingIid { bytes })
    }

    /// Parse one thing IID from the head of `bytes` (as found after the
    /// infix in an edge key), returning it and the number of bytes read.
    pub fn parse(bytes: &[u8]) -> Option<(ThingIid, usize)> {
        let prefix = Prefix::from_byte(*bytes.first()?)?;
        if !prefix.is_thing() {
            return None;
        }
        if prefix == Prefix::ThingAttribute {
            let kind = ValueKind::from_tag(*bytes.get(4)?)?;
            let value_len = Value::encoded_len(kind, bytes.get(5..)?)?;
            let total = 5 + value_len;
            if bytes.len() < total {
                return None;
            }
            Some((
                ThingIid {
                    bytes: bytes[..total].to_vec(),
                },
                total,
            ))
        } else {
            if bytes.len() < Self::OBJECT_LENGTH {
                return None;
            }
            Some((
                ThingIid {
                    bytes: bytes[..Self::OBJECT_LENGTH].to_vec(),
                },
                Self::OBJECT_LENGTH,
            ))
        }
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Option<ThingIid> {
        let (iid, len) = Self::parse(&bytes)?;
        (len == bytes.len()).then_some(iid)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn prefix(&self) -> Prefix {
        Prefix::from_byte(self.bytes[0]).unwrap_or(Prefix::ThingEntity)
    }

    /// The embedded type IID (forward ISA, constant-time)
    pub fn type_iid(&self) -> TypeIid {
        TypeIid {
            bytes: [self.bytes[1], self.bytes[2], self.bytes[3]],
        }
    }

    pub fn is_attribute(&self) -> bool {
        self.prefix() == Prefix::ThingAttribute
    }

    /// Decode the attribute value embedded in an attribute IID
    pub fn value(&self) -> Option<Value> {
        if !self.is_attribute() {
            return None;
        }
        let kind = ValueKind::from_tag(self.bytes[4])?;
        Value::decode(kind, &self.bytes[5..])
    }
}

impl fmt::Display for ThingIid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x")?;
        for b in &self.bytes {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_iid_layout() {
        let iid = TypeIid::new(Prefix::TypeRelation, 0x0102);
        assert_eq!(iid.bytes(), [0x21, 0x01, 0x02]);
        assert_eq!(iid.key(), 0x0102);
        assert_eq!(iid.prefix(), Prefix::TypeRelation);
    }

    #[test]
    fn test_object_iid_embeds_type() {
        let person = TypeIid::new(Prefix::TypeEntity, 5);
        let thing = ThingIid::object(person, 99);
        assert_eq!(thing.bytes().len(), ThingIid::OBJECT_LENGTH);
        assert_eq!(thing.prefix(), Prefix::ThingEntity);
        assert_eq!(thing.type_iid(), person);
        assert!(!thing.is_attribute());
    }

    #[test]
    fn test_attribute_iid_is_content_address() {
        let name = TypeIid::new(Prefix::TypeAttribute, 3);
        let a = ThingIid::attribute(name, &Value::String("foo".into())).expect("encodes");
        let b = ThingIid::attribute(name, &Value::String("foo".into())).expect("encodes");
        assert_eq!(a, b);
        assert_eq!(a.value(), Some(Value::String("foo".into())));

        // attr-prefix ∥ type-iid ∥ STRING tag ∥ len=3 ∥ "foo"
        let expected: Vec<u8> = [
            &[Prefix::ThingAttribute.byte()][..],
            &name.bytes(),
            &[ValueKind::String.tag(), 3],
            b"foo",
        ]
        .concat();
        assert_eq!(a.bytes(), &expected[..]);
    }

    #[test]
    fn test_parse_consumes_exactly_one_iid() {
        let person = TypeIid::new(Prefix::TypeEntity, 5);
        let age = TypeIid::new(Prefix::TypeAttribute, 8);
        let owner = ThingIid::object(person, 1);
        let attr = ThingIid::attribute(age, &Value::Long(10)).expect("encodes");

        let mut buf = owner.bytes().to_vec();
        buf.extend_from_slice(attr.bytes());

        let (first, consumed) = ThingIid::parse(&buf).expect("parses");
        assert_eq!(first, owner);
        let (second, rest) = ThingIid::parse(&buf[consumed..]).expect("parses");
        assert_eq!(second, attr);
        assert_eq!(consumed + rest, buf.len());
    }
}
