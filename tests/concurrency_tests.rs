//! Concurrency: snapshot isolation, writer serialisation, the planner
//! latch, cooperative cancellation and the parallel producer.

use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use typegraph::config::PlannerConfig;
use typegraph::encoding::{Value, ValueKind};
use typegraph::graph::{Kind, StatisticsManager};
use typegraph::pattern::Conjunction;
use typegraph::planner::Planner;
use typegraph::structure::Structure;
use typegraph::{Config, Database, Options, SessionKind, TransactionKind};

fn db_with_schema() -> Arc<Database> {
    let db = Database::new(Config::default());
    let session = db.session(SessionKind::Schema);
    let mut tx = session.transaction(TransactionKind::Write);
    tx.define(|schema| {
        schema.define_type("person", Kind::Entity)?;
        schema.define_attribute_type("name", ValueKind::String)?;
        schema.set_owns("person", "name", false)?;
        Ok(())
    })
    .expect("schema defined");
    tx.commit().expect("commits");
    db
}

fn insert_people(db: &Arc<Database>, count: usize) {
    let session = db.session(SessionKind::Data);
    let mut tx = session.transaction(TransactionKind::Write);
    for i in 0..count {
        let insert = Conjunction::build(|b| {
            let x = b.var("x");
            b.isa(x, "person");
            b.has_value(x, "name", Value::String(format!("p{i}")));
        });
        tx.insert(&insert).expect("inserts");
    }
    tx.commit().expect("commits");
}

fn person_query() -> Conjunction {
    Conjunction::build(|b| {
        let x = b.var("x");
        b.isa(x, "person");
    })
}

#[test]
fn test_readers_see_a_consistent_snapshot() {
    let db = db_with_schema();
    insert_people(&db, 2);

    let session = db.session(SessionKind::Data);
    let reader = session.transaction(TransactionKind::Read);

    // A later commit must not leak into the open reader
    insert_people(&db, 3);

    let before = reader
        .match_(&person_query(), &Options::default())
        .expect("matches")
        .count();
    assert_eq!(before, 2);

    let fresh = session.transaction(TransactionKind::Read);
    let after = fresh
        .match_(&person_query(), &Options::default())
        .expect("matches")
        .count();
    assert_eq!(after, 5);
}

#[test]
fn test_writers_serialise_per_session() {
    let db = db_with_schema();
    let session = Arc::new(db.session(SessionKind::Data));

    let first = session.transaction(TransactionKind::Write);
    let (started, started_rx) = mpsc::channel();
    let (finished, finished_rx) = mpsc::channel();

    let session2 = Arc::clone(&session);
    let handle = thread::spawn(move || {
        started.send(()).expect("sends");
        // Blocks until the first writer releases
        let mut tx = session2.transaction(TransactionKind::Write);
        let insert = Conjunction::build(|b| {
            let x = b.var("x");
            b.isa(x, "person");
        });
        tx.insert(&insert).expect("inserts");
        tx.commit().expect("commits");
        finished.send(()).expect("sends");
    });

    started_rx.recv().expect("second writer started");
    // While the first transaction is open, the second cannot finish
    assert!(
        finished_rx.recv_timeout(Duration::from_millis(200)).is_err(),
        "second writer must block on the session latch"
    );

    first.rollback();
    finished_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("second writer proceeds after release");
    handle.join().expect("joins");
}

#[test]
fn test_planner_latch_serves_concurrent_callers() {
    let mut schema = typegraph::SchemaGraph::new();
    schema.define_type("person", Kind::Entity).expect("defines");
    schema
        .define_attribute_type("name", ValueKind::String)
        .expect("defines");
    schema.set_owns("person", "name", false).expect("owns");
    let schema = Arc::new(schema);
    let manager = StatisticsManager::new();

    let query = Conjunction::build(|b| {
        let x = b.var("x");
        b.isa(x, "person");
        let n = b.var("n");
        b.isa(n, "name");
        b.has(x, n);
    });
    let structure = Structure::project(&query, &schema).expect("projects");
    let planner = Arc::new(Planner::new(structure, PlannerConfig::default()));

    let stats = Arc::new(manager.handle());
    let mut handles = Vec::new();
    for _ in 0..4 {
        let planner = Arc::clone(&planner);
        let schema = Arc::clone(&schema);
        let stats = Arc::clone(&stats);
        handles.push(thread::spawn(move || {
            planner.optimise(&schema, &stats, false).expect("plans")
        }));
    }
    let procedures: Vec<_> = handles
        .into_iter()
        .map(|h| h.join().expect("joins"))
        .collect();
    // All callers observe the same published procedure
    for pair in procedures.windows(2) {
        assert!(Arc::ptr_eq(&pair[0], &pair[1]));
    }
}

#[test]
fn test_cancellation_stops_iteration() {
    let db = db_with_schema();
    insert_people(&db, 50);

    let session = db.session(SessionKind::Data);
    let tx = session.transaction(TransactionKind::Read);
    let mut answers = tx
        .match_(&person_query(), &Options::default())
        .expect("matches");

    assert!(answers.next().is_some());
    tx.cancel_flag().cancel();
    assert!(answers.next().is_none(), "cancelled iterators stop yielding");
}

#[test]
fn test_parallel_producer_matches_sequential_answers() {
    let db = db_with_schema();
    insert_people(&db, 20);

    let session = db.session(SessionKind::Data);
    let tx = session.transaction(TransactionKind::Read);

    let query = Conjunction::build(|b| {
        let x = b.var("x");
        b.isa(x, "person");
        let n = b.var("n");
        b.isa(n, "name");
        b.has(x, n);
    });

    let mut sequential: Vec<String> = tx
        .match_(&query, &Options::default())
        .expect("matches")
        .map(|a| a.expect("no errors").to_string())
        .collect();
    let mut parallel: Vec<String> = tx
        .match_(&query, &Options::default().parallel(true))
        .expect("matches")
        .map(|a| a.expect("no errors").to_string())
        .collect();

    sequential.sort();
    parallel.sort();
    assert_eq!(sequential, parallel, "no ordering guarantee, same answer set");
}

#[test]
fn test_many_readers_during_writes() {
    let db = db_with_schema();
    insert_people(&db, 10);

    let mut handles = Vec::new();
    for _ in 0..4 {
        let db = Arc::clone(&db);
        handles.push(thread::spawn(move || {
            let session = db.session(SessionKind::Data);
            for _ in 0..20 {
                let tx = session.transaction(TransactionKind::Read);
                let count = tx
                    .match_(&person_query(), &Options::default())
                    .expect("matches")
                    .count();
                assert!(count >= 10, "readers never see fewer than committed");
            }
        }));
    }
    // Concurrent writes while readers run
    for _ in 0..3 {
        insert_people(&db, 2);
    }
    for handle in handles {
        handle.join().expect("joins");
    }
}
