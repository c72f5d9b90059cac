//! Planner benchmarks: cold solve vs snapshot-cached reuse.

use criterion::{criterion_group, criterion_main, Criterion};
use typegraph::config::PlannerConfig;
use typegraph::encoding::ValueKind;
use typegraph::graph::{Kind, SchemaGraph, StatisticsDelta, StatisticsManager};
use typegraph::pattern::Conjunction;
use typegraph::planner::Planner;
use typegraph::structure::Structure;

fn setup() -> (SchemaGraph, StatisticsManager, Conjunction) {
    let mut schema = SchemaGraph::new();
    schema.define_type("person", Kind::Entity).expect("defines");
    schema
        .define_attribute_type("name", ValueKind::String)
        .expect("defines");
    schema.set_owns("person", "name", false).expect("owns");
    schema
        .define_type("employment", Kind::Relation)
        .expect("defines");
    schema.set_relates("employment", "employee").expect("relates");
    schema.set_relates("employment", "employer").expect("relates");
    schema.define_type("company", Kind::Entity).expect("defines");
    schema
        .set_plays("person", "employment:employee")
        .expect("plays");
    schema
        .set_plays("company", "employment:employer")
        .expect("plays");

    let manager = StatisticsManager::new();
    let mut delta = StatisticsDelta::new();
    let person = schema.get("person").expect("exists").iid;
    let company = schema.get("company").expect("exists").iid;
    for _ in 0..1000 {
        delta.thing_created(person);
    }
    for _ in 0..50 {
        delta.thing_created(company);
    }
    manager.apply(&delta);

    let query = Conjunction::build(|b| {
        let x = b.var("x");
        b.isa(x, "person");
        let c = b.var("c");
        b.isa(c, "company");
        let e = b.var("e");
        b.isa(e, "employment");
        b.rel(
            e,
            &[
                (Some("employment:employee"), x),
                (Some("employment:employer"), c),
            ],
        );
        let n = b.var("n");
        b.isa(n, "name");
        b.has(x, n);
    });
    (schema, manager, query)
}

fn bench_cold_solve(c: &mut Criterion) {
    let (schema, manager, query) = setup();
    c.bench_function("planner_cold_solve", |bench| {
        bench.iter(|| {
            let structure = Structure::project(&query, &schema).expect("projects");
            let planner = Planner::new(structure, PlannerConfig::default());
            planner
                .optimise(&schema, &manager.handle(), false)
                .expect("plans")
        });
    });
}

fn bench_cached_reuse(c: &mut Criterion) {
    let (schema, manager, query) = setup();
    let structure = Structure::project(&query, &schema).expect("projects");
    let planner = Planner::new(structure, PlannerConfig::default());
    planner
        .optimise(&schema, &manager.handle(), false)
        .expect("plans");
    c.bench_function("planner_snapshot_reuse", |bench| {
        bench.iter(|| {
            planner
                .optimise(&schema, &manager.handle(), false)
                .expect("plans")
        });
    });
}

criterion_group!(benches, bench_cold_solve, bench_cached_reuse);
criterion_main!(benches);
