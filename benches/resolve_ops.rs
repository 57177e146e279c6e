//! Benchmarks for grant resolution and demotion planning.

use std::collections::BTreeSet;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use rolewarden::degrade::plan_demotion;
use rolewarden::graph::{RoleCatalog, RoleGraph};
use rolewarden::marker::MarkerKey;
use rolewarden::resolve::GrantResolver;

fn bench_build_graph(c: &mut Criterion) {
    c.bench_function("graph_from_standard_catalog", |bench| {
        bench.iter(|| black_box(RoleGraph::from_catalog(RoleCatalog::standard()).unwrap()))
    });
}

fn bench_resolve_substitution(c: &mut Criterion) {
    let graph = RoleGraph::standard();
    let resolver = GrantResolver::new(&graph);
    let held: BTreeSet<MarkerKey> = [
        MarkerKey::DuoMaster,
        MarkerKey::Extreme,
        MarkerKey::SolakLegend,
    ]
    .into_iter()
    .collect();

    c.bench_function("resolve_sibling_substitution", |bench| {
        bench.iter(|| black_box(resolver.resolve(&held, MarkerKey::ThreeSevenMaster).unwrap()))
    });
}

fn bench_resolve_all(c: &mut Criterion) {
    let graph = RoleGraph::standard();
    let resolver = GrantResolver::new(&graph);
    let held = BTreeSet::new();
    let grants = [
        MarkerKey::DuoRootskips,
        MarkerKey::ThreeSevenExperienced,
        MarkerKey::DuoMaster,
        MarkerKey::ThreeSevenGrandmaster,
        MarkerKey::DuoGrandmaster,
    ];

    c.bench_function("resolve_all_5", |bench| {
        bench.iter(|| black_box(resolver.resolve_all(&held, &grants).unwrap()))
    });
}

fn bench_plan_demotion(c: &mut Criterion) {
    let graph = RoleGraph::standard();
    let held: BTreeSet<MarkerKey> = [MarkerKey::Grandmaster, MarkerKey::Mastery]
        .into_iter()
        .collect();

    c.bench_function("plan_demotion_grandmaster", |bench| {
        bench.iter(|| black_box(plan_demotion(&graph, &held, MarkerKey::Grandmaster).unwrap()))
    });
}

criterion_group!(
    benches,
    bench_build_graph,
    bench_resolve_substitution,
    bench_resolve_all,
    bench_plan_demotion
);
criterion_main!(benches);
