//! Encoding round-trips and ordering laws.

use proptest::prelude::*;
use typegraph::encoding::{instance_prefix, Prefix, ThingIid, TypeIid, Value, ValueKind};

#[test]
fn test_round_trip_every_kind() {
    let values = vec![
        Value::Bool(false),
        Value::Bool(true),
        Value::Long(i64::MIN),
        Value::Long(-1),
        Value::Long(0),
        Value::Long(i64::MAX),
        Value::Double(-1.5e300),
        Value::Double(0.0),
        Value::Double(2.5),
        Value::String(String::new()),
        Value::String("hello world".into()),
        Value::DateTime(
            chrono::DateTime::from_timestamp_millis(0)
                .expect("epoch")
                .naive_utc(),
        ),
        Value::DateTime(
            chrono::DateTime::from_timestamp_millis(1_700_000_000_000)
                .expect("in range")
                .naive_utc(),
        ),
    ];
    for value in values {
        let bytes = value.encode().expect("encodes");
        assert_eq!(
            Value::decode(value.kind(), &bytes),
            Some(value.clone()),
            "round trip failed for {value}"
        );
    }
}

#[test]
fn test_string_length_limit_enforced() {
    assert!(Value::String("x".repeat(255)).encode().is_ok());
    assert!(Value::String("x".repeat(256)).encode().is_err());
}

#[test]
fn test_attribute_iid_layout_is_byte_exact() {
    // attr-prefix ∥ type-iid ∥ STRING ∥ len=3 ∥ "foo"
    let name_type = TypeIid::new(Prefix::TypeAttribute, 4);
    let iid = ThingIid::attribute(name_type, &Value::String("foo".into())).expect("encodes");
    let mut expected = vec![Prefix::ThingAttribute.byte()];
    expected.extend_from_slice(&name_type.bytes());
    expected.push(ValueKind::String.tag());
    expected.push(3);
    expected.extend_from_slice(b"foo");
    assert_eq!(iid.bytes(), &expected[..]);
}

#[test]
fn test_thing_iid_embeds_type_for_constant_time_isa() {
    let person = TypeIid::new(Prefix::TypeEntity, 9);
    let thing = ThingIid::object(person, 1234);
    assert_eq!(thing.bytes().len(), 12);
    assert_eq!(thing.type_iid(), person);
}

#[test]
fn test_instance_prefix_is_iid_prefix() {
    let person = TypeIid::new(Prefix::TypeEntity, 9);
    let thing = ThingIid::object(person, 7);
    let prefix = instance_prefix(person).expect("entity instances");
    assert!(thing.bytes().starts_with(&prefix));
}

proptest! {
    #[test]
    fn prop_long_encoding_agrees_with_numeric_order(a: i64, b: i64) {
        let ea = Value::Long(a).encode().expect("encodes");
        let eb = Value::Long(b).encode().expect("encodes");
        prop_assert_eq!(a.cmp(&b), ea.cmp(&eb));
    }

    #[test]
    fn prop_double_encoding_agrees_with_numeric_order(a: f64, b: f64) {
        prop_assume!(a.is_finite() && b.is_finite());
        let ea = Value::Double(a).encode().expect("encodes");
        let eb = Value::Double(b).encode().expect("encodes");
        if a < b {
            prop_assert!(ea < eb);
        } else if a > b {
            prop_assert!(ea > eb);
        }
    }

    #[test]
    fn prop_datetime_encoding_agrees_with_temporal_order(a in -8_000_000_000_000i64..8_000_000_000_000i64,
                                                          b in -8_000_000_000_000i64..8_000_000_000_000i64) {
        let da = chrono::DateTime::from_timestamp_millis(a).expect("in range").naive_utc();
        let db = chrono::DateTime::from_timestamp_millis(b).expect("in range").naive_utc();
        let ea = Value::DateTime(da).encode().expect("encodes");
        let eb = Value::DateTime(db).encode().expect("encodes");
        prop_assert_eq!(a.cmp(&b), ea.cmp(&eb));
    }

    #[test]
    fn prop_string_round_trip(s in "[a-zA-Z0-9 ]{0,255}") {
        let value = Value::String(s);
        let bytes = value.encode().expect("encodes");
        prop_assert_eq!(Value::decode(ValueKind::String, &bytes), Some(value));
    }

    #[test]
    fn prop_long_round_trip(v: i64) {
        let bytes = Value::Long(v).encode().expect("encodes");
        prop_assert_eq!(Value::decode(ValueKind::Long, &bytes), Some(Value::Long(v)));
    }

    #[test]
    fn prop_attribute_iid_parse_consumes_exact_length(v: i64, key: u64) {
        let attr_type = TypeIid::new(Prefix::TypeAttribute, 1);
        let entity_type = TypeIid::new(Prefix::TypeEntity, 2);
        let attr = ThingIid::attribute(attr_type, &Value::Long(v)).expect("encodes");
        let entity = ThingIid::object(entity_type, key);

        // Concatenated IIDs (as in an edge key) parse back apart
        let mut buf = attr.bytes().to_vec();
        buf.extend_from_slice(entity.bytes());
        let (first, used) = ThingIid::parse(&buf).expect("parses");
        prop_assert_eq!(&first, &attr);
        let (second, _) = ThingIid::parse(&buf[used..]).expect("parses");
        prop_assert_eq!(&second, &entity);
    }
}
