//! Instance-graph behaviour through the public database surface.

use typegraph::encoding::{Prefix, Value, ValueKind};
use typegraph::graph::Kind;
use typegraph::pattern::Conjunction;
use typegraph::{Config, Database, Options, SessionKind, TransactionKind};

fn db_with_schema() -> std::sync::Arc<Database> {
    let db = Database::new(Config::default());
    let session = db.session(SessionKind::Schema);
    let mut tx = session.transaction(TransactionKind::Write);
    tx.define(|schema| {
        schema.define_type("person", Kind::Entity)?;
        schema.define_attribute_type("name", ValueKind::String)?;
        schema.set_owns("person", "name", false)?;
        schema.define_type("marriage", Kind::Relation)?;
        schema.set_relates("marriage", "spouse")?;
        schema.set_plays("person", "marriage:spouse")?;
        Ok(())
    })
    .expect("schema defined");
    tx.commit().expect("commits");
    db
}

#[test]
fn test_attribute_identity_across_double_insert() {
    let db = db_with_schema();
    let session = db.session(SessionKind::Data);
    let mut tx = session.transaction(TransactionKind::Write);

    // Insert $a "foo" isa name twice in one transaction
    let insert = Conjunction::build(|b| {
        let a = b.var("a");
        b.isa(a, "name");
        b.value(a, typegraph::Comparator::Eq, Value::String("foo".into()));
    });
    let first = tx.insert(&insert).expect("inserts");
    let second = tx.insert(&insert).expect("inserts");
    let iid_a = first[0].get("a").and_then(|c| c.as_thing()).expect("thing");
    let iid_b = second[0].get("a").and_then(|c| c.as_thing()).expect("thing");
    assert_eq!(iid_a.iid, iid_b.iid, "content address must coincide");
    tx.commit().expect("commits");

    // A single persisted vertex
    let tx = session.transaction(TransactionKind::Read);
    let query = Conjunction::build(|b| {
        let a = b.var("a");
        b.isa(a, "name");
    });
    let answers: Vec<_> = tx
        .match_(&query, &Options::default())
        .expect("matches")
        .collect::<typegraph::Result<Vec<_>>>()
        .expect("no errors");
    assert_eq!(answers.len(), 1);

    // And the IID is the typed-value content address
    let schema = db.schema();
    let name_type = schema.get("name").expect("exists").iid;
    let concept = answers[0].get("a").and_then(|c| c.as_thing()).expect("thing");
    let mut expected = vec![Prefix::ThingAttribute.byte()];
    expected.extend_from_slice(&name_type.bytes());
    expected.push(ValueKind::String.tag());
    expected.push(3);
    expected.extend_from_slice(b"foo");
    assert_eq!(concept.iid.bytes(), &expected[..]);
    assert_eq!(concept.value(), Some(Value::String("foo".into())));
}

#[test]
fn test_delete_respects_referential_integrity() {
    let db = db_with_schema();
    let session = db.session(SessionKind::Data);
    let mut tx = session.transaction(TransactionKind::Write);
    let insert = Conjunction::build(|b| {
        let x = b.var("x");
        b.isa(x, "person");
        b.has_value(x, "name", Value::String("ada".into()));
    });
    tx.insert(&insert).expect("inserts");
    tx.commit().expect("commits");

    // Deleting the person while its has-edge lives must fail
    let mut tx = session.transaction(TransactionKind::Write);
    let when = Conjunction::build(|b| {
        let x = b.var("x");
        b.isa(x, "person");
    });
    let deletion = Conjunction::build(|b| {
        let x = b.var("x");
        b.isa(x, "person");
    });
    let err = tx
        .delete(&when, &deletion, &Options::default())
        .expect_err("live edges");
    assert_eq!(err.code(), 207); // VertexHasEdges
    tx.rollback();

    // Deleting the edge and the vertex together succeeds
    let mut tx = session.transaction(TransactionKind::Write);
    let when = Conjunction::build(|b| {
        let x = b.var("x");
        b.isa(x, "person");
        let n = b.var("n");
        b.isa(n, "name");
        b.has(x, n);
    });
    let deletion = Conjunction::build(|b| {
        let x = b.var("x");
        let n = b.var("n");
        b.has(x, n);
        b.isa(x, "person");
    });
    let deleted = tx
        .delete(&when, &deletion, &Options::default())
        .expect("deletes");
    assert_eq!(deleted, 1);
    tx.commit().expect("commits");

    let tx = session.transaction(TransactionKind::Read);
    let query = Conjunction::build(|b| {
        let x = b.var("x");
        b.isa(x, "person");
    });
    let remaining = tx
        .match_(&query, &Options::default())
        .expect("matches")
        .count();
    assert_eq!(remaining, 0);
}

#[test]
fn test_relation_round_trip_through_role_player_edges() {
    let db = db_with_schema();
    let session = db.session(SessionKind::Data);
    let mut tx = session.transaction(TransactionKind::Write);
    let insert = Conjunction::build(|b| {
        let x = b.var("x");
        let y = b.var("y");
        b.isa(x, "person");
        b.isa(y, "person");
        let m = b.var("m");
        b.isa(m, "marriage");
        b.rel(m, &[(Some("spouse"), x), (Some("spouse"), y)]);
    });
    tx.insert(&insert).expect("inserts");
    tx.commit().expect("commits");

    let tx = session.transaction(TransactionKind::Read);
    let query = Conjunction::build(|b| {
        let a = b.var("a");
        let bb = b.var("b");
        let m = b.anon();
        b.isa(m, "marriage");
        b.rel(m, &[(Some("marriage:spouse"), a), (Some("marriage:spouse"), bb)]);
    });
    let answers: Vec<_> = tx
        .match_(&query, &Options::default())
        .expect("matches")
        .collect::<typegraph::Result<Vec<_>>>()
        .expect("no errors");
    // Two role-player slots over two distinct edges: both orders, never
    // the same player twice
    assert_eq!(answers.len(), 2);
    for answer in &answers {
        assert_ne!(answer.get("a"), answer.get("b"));
    }
}

#[test]
fn test_statistics_snapshot_advances_on_commit() {
    let db = db_with_schema();
    let before = db.statistics_snapshot();
    let session = db.session(SessionKind::Data);
    let mut tx = session.transaction(TransactionKind::Write);
    let insert = Conjunction::build(|b| {
        let x = b.var("x");
        b.isa(x, "person");
    });
    tx.insert(&insert).expect("inserts");
    tx.commit().expect("commits");
    assert!(db.statistics_snapshot() > before);
}

#[test]
fn test_reopen_resumes_schema_and_key_generator() {
    let storage: std::sync::Arc<dyn typegraph::storage::Storage> =
        std::sync::Arc::new(typegraph::storage::MemoryStorage::new());

    let db = Database::with_storage(storage.clone(), Config::default());
    let session = db.session(SessionKind::Schema);
    let mut tx = session.transaction(TransactionKind::Write);
    tx.define(|schema| {
        schema.define_type("person", Kind::Entity)?;
        Ok(())
    })
    .expect("schema defined");
    tx.commit().expect("commits");

    let session = db.session(SessionKind::Data);
    let mut tx = session.transaction(TransactionKind::Write);
    let insert = Conjunction::build(|b| {
        let x = b.var("x");
        b.isa(x, "person");
    });
    let first = tx.insert(&insert).expect("inserts");
    tx.commit().expect("commits");
    let first_iid = first[0].get("x").and_then(|c| c.as_thing()).expect("thing");
    drop(db);

    // Reopen over the same storage: the schema loads back and new keys
    // never collide with persisted ones
    let reopened = Database::with_storage(storage, Config::default());
    assert!(reopened.schema().get("person").is_some());

    let session = reopened.session(SessionKind::Data);
    let mut tx = session.transaction(TransactionKind::Write);
    let second = tx.insert(&insert).expect("inserts");
    tx.commit().expect("commits");
    let second_iid = second[0].get("x").and_then(|c| c.as_thing()).expect("thing");
    assert_ne!(first_iid.iid, second_iid.iid);

    let tx = session.transaction(TransactionKind::Read);
    let query = Conjunction::build(|b| {
        let x = b.var("x");
        b.isa(x, "person");
    });
    assert_eq!(
        tx.match_(&query, &Options::default()).expect("matches").count(),
        2
    );
}

#[test]
fn test_abstract_type_rejects_instances() {
    let db = Database::new(Config::default());
    let session = db.session(SessionKind::Schema);
    let mut tx = session.transaction(TransactionKind::Write);
    tx.define(|schema| {
        schema.define_type("vehicle", Kind::Entity)?;
        schema.set_abstract("vehicle")?;
        Ok(())
    })
    .expect("schema defined");
    tx.commit().expect("commits");

    let session = db.session(SessionKind::Data);
    let mut tx = session.transaction(TransactionKind::Write);
    let insert = Conjunction::build(|b| {
        let x = b.var("x");
        b.isa(x, "vehicle");
    });
    let err = tx.insert(&insert).expect_err("abstract");
    assert_eq!(err.code(), 205); // IllegalAbstractWrite
}
