//! Dispatcher behaviour: routing, transaction-kind enforcement, write
//! validation, aggregates, grouping, negation and disjunction.

use typegraph::encoding::{Value, ValueKind};
use typegraph::graph::Kind;
use typegraph::pattern::Conjunction;
use typegraph::{
    AggregateOp, Comparator, Config, Database, Numeric, Options, SessionKind, TransactionKind,
};

fn db_with_schema() -> std::sync::Arc<Database> {
    let db = Database::new(Config::default());
    let session = db.session(SessionKind::Schema);
    let mut tx = session.transaction(TransactionKind::Write);
    tx.define(|schema| {
        schema.define_type("person", Kind::Entity)?;
        schema.define_attribute_type("name", ValueKind::String)?;
        schema.define_attribute_type("age", ValueKind::Long)?;
        schema.set_owns("person", "name", true)?;
        schema.set_owns("person", "age", false)?;
        Ok(())
    })
    .expect("schema defined");
    tx.commit().expect("commits");
    db
}

fn insert_person(db: &std::sync::Arc<Database>, name: &str, age: i64) {
    let session = db.session(SessionKind::Data);
    let mut tx = session.transaction(TransactionKind::Write);
    let insert = Conjunction::build(|b| {
        let x = b.var("x");
        b.isa(x, "person");
        b.has_value(x, "name", Value::String(name.into()));
        b.has_value(x, "age", Value::Long(age));
    });
    tx.insert(&insert).expect("inserts");
    tx.commit().expect("commits");
}

#[test]
fn test_write_in_read_transaction_rejected() {
    let db = db_with_schema();
    let session = db.session(SessionKind::Data);
    let mut tx = session.transaction(TransactionKind::Read);
    let insert = Conjunction::build(|b| {
        let x = b.var("x");
        b.isa(x, "person");
    });
    let err = tx.insert(&insert).expect_err("read transaction");
    assert_eq!(err.code(), 301);
}

#[test]
fn test_schema_mutation_in_data_session_rejected() {
    let db = db_with_schema();
    let session = db.session(SessionKind::Data);
    let mut tx = session.transaction(TransactionKind::Write);
    let err = tx
        .define(|schema| {
            schema.define_type("animal", Kind::Entity)?;
            Ok(())
        })
        .expect_err("data session");
    assert_eq!(err.code(), 302);
}

#[test]
fn test_data_write_in_schema_session_rejected() {
    let db = db_with_schema();
    let session = db.session(SessionKind::Schema);
    let mut tx = session.transaction(TransactionKind::Write);
    let insert = Conjunction::build(|b| {
        let x = b.var("x");
        b.isa(x, "person");
    });
    let err = tx.insert(&insert).expect_err("schema session");
    assert_eq!(err.code(), 303);
}

#[test]
fn test_insert_validation_errors() {
    let db = db_with_schema();
    let session = db.session(SessionKind::Data);
    let mut tx = session.transaction(TransactionKind::Write);

    // Missing isa
    let no_isa = Conjunction::build(|b| {
        b.var("x");
    });
    assert_eq!(tx.insert(&no_isa).expect_err("no isa").code(), 201);

    // Multiple isa
    let double_isa = Conjunction::build(|b| {
        let x = b.var("x");
        b.isa(x, "person");
        b.isa(x, "person");
    });
    assert_eq!(tx.insert(&double_isa).expect_err("two isas").code(), 202);

    // Attribute without a value
    let no_value = Conjunction::build(|b| {
        let a = b.var("a");
        b.isa(a, "name");
    });
    assert_eq!(tx.insert(&no_value).expect_err("no value").code(), 203);

    // iid constraints are illegal on insert
    let person = db.schema().get("person").expect("exists").iid;
    let with_iid = Conjunction::build(|b| {
        let x = b.var("x");
        b.isa(x, "person");
        b.iid(x, typegraph::ThingIid::object(person, 42));
    });
    assert_eq!(tx.insert(&with_iid).expect_err("iid").code(), 204);
}

#[test]
fn test_match_insert_runs_per_answer() {
    let db = db_with_schema();
    insert_person(&db, "ada", 36);
    insert_person(&db, "alan", 41);

    // Give every matched person a second name attribute
    let session = db.session(SessionKind::Data);
    let mut tx = session.transaction(TransactionKind::Write);
    let when = Conjunction::build(|b| {
        let x = b.var("x");
        b.isa(x, "person");
    });
    let things = Conjunction::build(|b| {
        let x = b.var("x");
        b.has_value(x, "name", Value::String("renamed".into()));
    });
    let inserted = tx
        .insert_when(&when, &things, &Options::default())
        .expect("inserts");
    assert_eq!(inserted.len(), 2);
    tx.commit().expect("commits");

    let tx = session.transaction(TransactionKind::Read);
    let query = Conjunction::build(|b| {
        let x = b.var("x");
        b.isa(x, "person");
        b.has_value(x, "name", Value::String("renamed".into()));
    });
    assert_eq!(
        tx.match_(&query, &Options::default()).expect("matches").count(),
        2
    );
}

#[test]
fn test_update_is_delete_then_insert() {
    let db = db_with_schema();
    insert_person(&db, "ada", 36);

    let session = db.session(SessionKind::Data);
    let mut tx = session.transaction(TransactionKind::Write);
    let when = Conjunction::build(|b| {
        let x = b.var("x");
        b.isa(x, "person");
        let a = b.var("a");
        b.isa(a, "age");
        b.has(x, a);
    });
    let deletion = Conjunction::build(|b| {
        let x = b.var("x");
        let a = b.var("a");
        b.has(x, a);
    });
    let insertion = Conjunction::build(|b| {
        let x = b.var("x");
        b.has_value(x, "age", Value::Long(37));
    });
    tx.update(&when, &deletion, &insertion, &Options::default())
        .expect("updates");
    tx.commit().expect("commits");

    let tx = session.transaction(TransactionKind::Read);
    let aged = Conjunction::build(|b| {
        let x = b.var("x");
        b.isa(x, "person");
        let a = b.var("a");
        b.isa(a, "age");
        b.has(x, a);
    });
    let answers: Vec<_> = tx
        .match_(&aged, &Options::default())
        .expect("matches")
        .collect::<typegraph::Result<Vec<_>>>()
        .expect("no errors");
    assert_eq!(answers.len(), 1);
    let value = answers[0]
        .get("a")
        .and_then(|c| c.as_thing())
        .and_then(|t| t.value());
    assert_eq!(value, Some(Value::Long(37)));
}

#[test]
fn test_aggregates() {
    let db = db_with_schema();
    insert_person(&db, "ada", 36);
    insert_person(&db, "alan", 41);
    insert_person(&db, "grace", 85);

    let session = db.session(SessionKind::Data);
    let tx = session.transaction(TransactionKind::Read);
    let query = Conjunction::build(|b| {
        let x = b.var("x");
        b.isa(x, "person");
        let a = b.var("a");
        b.isa(a, "age");
        b.has(x, a);
    });
    let options = Options::default();

    assert_eq!(
        tx.match_aggregate(&query, AggregateOp::Count, "a", &options)
            .expect("aggregates"),
        Numeric::Long(3)
    );
    assert_eq!(
        tx.match_aggregate(&query, AggregateOp::Sum, "a", &options)
            .expect("aggregates"),
        Numeric::Long(162)
    );
    assert_eq!(
        tx.match_aggregate(&query, AggregateOp::Min, "a", &options)
            .expect("aggregates"),
        Numeric::Long(36)
    );
    assert_eq!(
        tx.match_aggregate(&query, AggregateOp::Max, "a", &options)
            .expect("aggregates"),
        Numeric::Long(85)
    );
    assert_eq!(
        tx.match_aggregate(&query, AggregateOp::Mean, "a", &options)
            .expect("aggregates"),
        Numeric::Double(54.0)
    );

    // Aggregating an empty stream
    let none = Conjunction::build(|b| {
        let x = b.var("x");
        b.isa(x, "person");
        b.has_value(x, "name", Value::String("nobody".into()));
    });
    assert_eq!(
        tx.match_aggregate(&none, AggregateOp::Min, "x", &options)
            .expect("aggregates"),
        Numeric::Empty
    );
}

#[test]
fn test_group_by_owner() {
    let db = db_with_schema();
    insert_person(&db, "ada", 36);
    insert_person(&db, "alan", 41);

    let session = db.session(SessionKind::Data);
    let tx = session.transaction(TransactionKind::Read);
    let query = Conjunction::build(|b| {
        let x = b.var("x");
        b.isa(x, "person");
        let a = b.var("a");
        b.isa(a, "age");
        b.has(x, a);
    });
    let groups = tx
        .match_group(&query, "x", &Options::default())
        .expect("groups");
    assert_eq!(groups.len(), 2);
    for group in &groups {
        assert_eq!(group.answers.len(), 1);
    }
}

#[test]
fn test_negation_filters_answers() {
    let db = db_with_schema();
    insert_person(&db, "ada", 36);

    // A person with no name attribute at all
    let session = db.session(SessionKind::Data);
    let mut tx = session.transaction(TransactionKind::Write);
    let nameless = Conjunction::build(|b| {
        let x = b.var("x");
        b.isa(x, "person");
    });
    tx.insert(&nameless).expect("inserts");
    tx.commit().expect("commits");

    let query = Conjunction::build(|b| {
        let x = b.var("x");
        b.isa(x, "person");
        b.not(|n| {
            let x = n.var("x");
            let a = n.anon();
            n.isa(a, "name");
            n.has(x, a);
        });
    });
    let tx = session.transaction(TransactionKind::Read);
    let answers = tx
        .match_(&query, &Options::default())
        .expect("matches")
        .count();
    assert_eq!(answers, 1, "only the nameless person survives the negation");
}

#[test]
fn test_disjunction_unions_branches() {
    let db = db_with_schema();
    insert_person(&db, "ada", 36);
    insert_person(&db, "alan", 41);
    insert_person(&db, "grace", 85);

    let branch = |name: &str| {
        Conjunction::build(|b| {
            let x = b.var("x");
            b.has_value(x, "name", Value::String(name.into()));
        })
    };
    let query = Conjunction::build(|b| {
        let x = b.var("x");
        b.isa(x, "person");
        b.or(vec![branch("ada"), branch("grace")]);
    });
    let session = db.session(SessionKind::Data);
    let tx = session.transaction(TransactionKind::Read);
    let answers = tx
        .match_(&query, &Options::default())
        .expect("matches")
        .count();
    assert_eq!(answers, 2);
}

#[test]
fn test_value_range_queries_use_ordered_encoding() {
    let db = db_with_schema();
    insert_person(&db, "ada", 36);
    insert_person(&db, "alan", 41);
    insert_person(&db, "grace", 85);

    let session = db.session(SessionKind::Data);
    let tx = session.transaction(TransactionKind::Read);
    let query = Conjunction::build(|b| {
        let x = b.var("x");
        b.isa(x, "person");
        let a = b.var("a");
        b.isa(a, "age");
        b.value(a, Comparator::Gt, Value::Long(40));
        b.has(x, a);
    });
    let answers: Vec<_> = tx
        .match_(&query, &Options::default())
        .expect("matches")
        .collect::<typegraph::Result<Vec<_>>>()
        .expect("no errors");
    assert_eq!(answers.len(), 2);
    for answer in &answers {
        let age = answer
            .get("a")
            .and_then(|c| c.as_thing())
            .and_then(|t| t.value());
        match age {
            Some(Value::Long(v)) => assert!(v > 40),
            other => panic!("expected a long age, got {other:?}"),
        }
    }
}

#[test]
fn test_undefine_type_removes_it() {
    let db = db_with_schema();
    let session = db.session(SessionKind::Schema);
    let mut tx = session.transaction(TransactionKind::Write);
    tx.define(|schema| {
        schema.define_type("temporary", Kind::Entity)?;
        Ok(())
    })
    .expect("defines");
    tx.commit().expect("commits");
    assert!(db.schema().get("temporary").is_some());

    let mut tx = session.transaction(TransactionKind::Write);
    tx.undefine_type("temporary").expect("undefines");
    tx.commit().expect("commits");
    assert!(db.schema().get("temporary").is_none());
}
