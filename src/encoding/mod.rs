//! Byte Encoding Scheme
//!
//! Defines the prefix byte of every vertex partition, the infix byte of every
//! edge kind and direction, and the fixed IID layouts:
//!
//! ```text
//! type iid      prefix(1) ∥ key(2)
//! thing iid     prefix(1) ∥ type-iid(3) ∥ key(8)
//! attribute iid prefix(1) ∥ type-iid(3) ∥ value-tag(1) ∥ value-bytes
//! edge key      from-iid ∥ infix(1) ∥ to-iid
//! role-player   rel-iid ∥ infix(1) ∥ role-type-iid(3) ∥ player-iid
//! ```
//!
//! Encoding is deterministic and total-order-preserving within each value
//! kind, so range scans over attribute instances walk values in their
//! natural order. Decoding well-formed keys is O(1) and infallible; a
//! malformed key surfaces as a fatal `Internal` error.
//!
//! ISA has no stored edge: the forward direction is decoded from the thing
//! IID itself, and the backward direction is the instance-scan prefix of
//! the type.

pub mod iid;
pub mod value;

pub use iid::{ThingIid, TypeIid};
pub use value::{Value, ValueKind};

/// Key-space prefix byte: the first byte of every stored key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Prefix {
    /// Reserved system keys (key-generator counters)
    System = 0x00,
    /// Label → type-iid index
    LabelIndex = 0x01,

    TypeEntity = 0x20,
    TypeRelation = 0x21,
    TypeRole = 0x22,
    TypeAttribute = 0x23,

    ThingEntity = 0x40,
    ThingRelation = 0x41,
    ThingRole = 0x42,
    ThingAttribute = 0x43,
}

impl Prefix {
    pub fn byte(self) -> u8 {
        self as u8
    }

    /// Decode a prefix byte. Returns None for bytes outside the key space.
    pub fn from_byte(b: u8) -> Option<Prefix> {
        match b {
            0x00 => Some(Prefix::System),
            0x01 => Some(Prefix::LabelIndex),
            0x20 => Some(Prefix::TypeEntity),
            0x21 => Some(Prefix::TypeRelation),
            0x22 => Some(Prefix::TypeRole),
            0x23 => Some(Prefix::TypeAttribute),
            0x40 => Some(Prefix::ThingEntity),
            0x41 => Some(Prefix::ThingRelation),
            0x42 => Some(Prefix::ThingRole),
            0x43 => Some(Prefix::ThingAttribute),
            _ => None,
        }
    }

    pub fn is_type(self) -> bool {
        matches!(
            self,
            Prefix::TypeEntity | Prefix::TypeRelation | Prefix::TypeRole | Prefix::TypeAttribute
        )
    }

    pub fn is_thing(self) -> bool {
        matches!(
            self,
            Prefix::ThingEntity
                | Prefix::ThingRelation
                | Prefix::ThingRole
                | Prefix::ThingAttribute
        )
    }

    /// The thing prefix for instances of a type partition
    pub fn instance_prefix(self) -> Option<Prefix> {
        match self {
            Prefix::TypeEntity => Some(Prefix::ThingEntity),
            Prefix::TypeRelation => Some(Prefix::ThingRelation),
            Prefix::TypeRole => Some(Prefix::ThingRole),
            Prefix::TypeAttribute => Some(Prefix::ThingAttribute),
            _ => None,
        }
    }
}

/// Edge infix byte. Forward and backward variants give both endpoints a
/// contiguous scan prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Infix {
    // type → type, forward
    Sub = 0x60,
    Owns = 0x61,
    OwnsKey = 0x62,
    Plays = 0x63,
    Relates = 0x64,
    // type → type, backward
    SubReverse = 0x70,
    OwnsReverse = 0x71,
    OwnsKeyReverse = 0x72,
    PlaysReverse = 0x73,
    RelatesReverse = 0x74,
    // thing → thing, forward
    Has = 0x80,
    Playing = 0x81,
    Relating = 0x82,
    RolePlayer = 0x83,
    // thing → thing, backward
    HasReverse = 0x90,
    PlayingReverse = 0x91,
    RelatingReverse = 0x92,
    RolePlayerReverse = 0x93,
}

impl Infix {
    pub fn byte(self) -> u8 {
        self as u8
    }

    /// The opposite-direction infix of the same edge kind
    pub fn reverse(self) -> Infix {
        match self {
            Infix::Sub => Infix::SubReverse,
            Infix::Owns => Infix::OwnsReverse,
            Infix::OwnsKey => Infix::OwnsKeyReverse,
            Infix::Plays => Infix::PlaysReverse,
            Infix::Relates => Infix::RelatesReverse,
            Infix::SubReverse => Infix::Sub,
            Infix::OwnsReverse => Infix::Owns,
            Infix::OwnsKeyReverse => Infix::OwnsKey,
            Infix::PlaysReverse => Infix::Plays,
            Infix::RelatesReverse => Infix::Relates,
            Infix::Has => Infix::HasReverse,
            Infix::Playing => Infix::PlayingReverse,
            Infix::Relating => Infix::RelatingReverse,
            Infix::RolePlayer => Infix::RolePlayerReverse,
            Infix::HasReverse => Infix::Has,
            Infix::PlayingReverse => Infix::Playing,
            Infix::RelatingReverse => Infix::Relating,
            Infix::RolePlayerReverse => Infix::RolePlayer,
        }
    }

    /// Role-player edges interleave the role-type iid before the target
    pub fn carries_role_type(self) -> bool {
        matches!(self, Infix::RolePlayer | Infix::RolePlayerReverse)
    }
}

/// Key of a type vertex record
pub fn type_vertex_key(iid: TypeIid) -> Vec<u8> {
    iid.bytes().to_vec()
}

/// System key holding the thing-key generator's high-water mark
pub fn key_counter_key() -> Vec<u8> {
    vec![Prefix::System.byte(), 0x01]
}

/// Key of the label index entry for a type. Role labels are scoped by their
/// relation label (`relation:role`).
pub fn label_index_key(scoped_label: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + scoped_label.len());
    key.push(Prefix::LabelIndex.byte());
    key.extend_from_slice(scoped_label.as_bytes());
    key
}

/// Key of an edge between two type vertices
pub fn type_edge_key(from: TypeIid, infix: Infix, to: TypeIid) -> Vec<u8> {
    let mut key = Vec::with_capacity(7);
    key.extend_from_slice(&from.bytes());
    key.push(infix.byte());
    key.extend_from_slice(&to.bytes());
    key
}

/// Scan prefix for all edges of one kind leaving a type vertex
pub fn type_edge_prefix(from: TypeIid, infix: Infix) -> Vec<u8> {
    let mut key = Vec::with_capacity(4);
    key.extend_from_slice(&from.bytes());
    key.push(infix.byte());
    key
}

/// Key of an edge between two thing vertices
pub fn thing_edge_key(from: &ThingIid, infix: Infix, to: &ThingIid) -> Vec<u8> {
    debug_assert!(!infix.carries_role_type());
    let mut key = Vec::with_capacity(from.bytes().len() + 1 + to.bytes().len());
    key.extend_from_slice(from.bytes());
    key.push(infix.byte());
    key.extend_from_slice(to.bytes());
    key
}

/// Key of a role-player edge, tagged with the role type
pub fn role_player_key(from: &ThingIid, infix: Infix, role_type: TypeIid, to: &ThingIid) -> Vec<u8> {
    debug_assert!(infix.carries_role_type());
    let mut key = Vec::with_capacity(from.bytes().len() + 4 + to.bytes().len());
    key.extend_from_slice(from.bytes());
    key.push(infix.byte());
    key.extend_from_slice(&role_type.bytes());
    key.extend_from_slice(to.bytes());
    key
}

/// Scan prefix for all edges of one kind leaving a thing vertex
pub fn thing_edge_prefix(from: &ThingIid, infix: Infix) -> Vec<u8> {
    let mut key = Vec::with_capacity(from.bytes().len() + 1);
    key.extend_from_slice(from.bytes());
    key.push(infix.byte());
    key
}

/// Scan prefix for instances of a single type (backward ISA)
pub fn instance_prefix(type_iid: TypeIid) -> Option<Vec<u8>> {
    let thing_prefix = type_iid.prefix().instance_prefix()?;
    let mut key = Vec::with_capacity(4);
    key.push(thing_prefix.byte());
    key.extend_from_slice(&type_iid.bytes());
    Some(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_round_trip() {
        for p in [
            Prefix::System,
            Prefix::LabelIndex,
            Prefix::TypeEntity,
            Prefix::TypeRelation,
            Prefix::TypeRole,
            Prefix::TypeAttribute,
            Prefix::ThingEntity,
            Prefix::ThingRelation,
            Prefix::ThingRole,
            Prefix::ThingAttribute,
        ] {
            assert_eq!(Prefix::from_byte(p.byte()), Some(p));
        }
        assert_eq!(Prefix::from_byte(0xff), None);
    }

    #[test]
    fn test_infix_reverse_is_involution() {
        for i in [
            Infix::Sub,
            Infix::Owns,
            Infix::OwnsKey,
            Infix::Plays,
            Infix::Relates,
            Infix::Has,
            Infix::Playing,
            Infix::Relating,
            Infix::RolePlayer,
        ] {
            assert_eq!(i.reverse().reverse(), i);
            assert_ne!(i.reverse().byte(), i.byte());
        }
    }

    #[test]
    fn test_instance_prefix_embeds_type_iid() {
        let person = TypeIid::new(Prefix::TypeEntity, 7);
        let prefix = instance_prefix(person).expect("entity type has instances");
        assert_eq!(prefix[0], Prefix::ThingEntity.byte());
        assert_eq!(&prefix[1..4], &person.bytes());
    }
}
