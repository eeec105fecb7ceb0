//! Benchmark suite for the client-side request path
//!
//! Covers the work done before and after the network:
//! - Build: chaining steps and validating the plan
//! - Encode: MessagePack request envelope for a plan
//! - Round-trip: in-process submit + decode against the modern graph
//!
//! Run: cargo bench --bench plan_encoding

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use gremlin_client::protocol::{encode_request, Request, RequestEnvelope};
use gremlin_client::statics::*;
use gremlin_client::{MemoryGraph, Traversal};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn tutorial_traversal() -> Traversal {
    g().v(())
        .has_label("person")
        .has("age", gt(30))
        .order()
        .by(("age", DESC))
        .unwrap()
        .values("name")
}

/// `hops` nested out() steps inside a repeat body
fn deep_traversal(hops: usize) -> Traversal {
    let body = (0..hops).fold(Traversal::anonymous(), |t, _| t.out("knows"));
    g().v(()).repeat(body).times(3).unwrap().dedup().count()
}

// ---------------------------------------------------------------------------
// Benchmarks
// ---------------------------------------------------------------------------

fn bench_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("build");

    group.bench_function("tutorial", |b| {
        b.iter(|| black_box(tutorial_traversal().build().unwrap()));
    });

    for hops in [1, 10, 100] {
        group.bench_with_input(BenchmarkId::new("repeat_body", hops), &hops, |b, &hops| {
            let t = deep_traversal(hops);
            b.iter(|| black_box(t.build().unwrap()));
        });
    }

    group.finish();
}

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");

    for hops in [1, 10, 100] {
        let plan = deep_traversal(hops).build().unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(hops), &plan, |b, plan| {
            b.iter(|| {
                let envelope = RequestEnvelope {
                    request_id: Some("1".to_string()),
                    request: Request::Traverse { plan: plan.clone() },
                };
                black_box(encode_request(black_box(&envelope)).unwrap())
            });
        });
    }

    group.finish();
}

fn bench_round_trip(c: &mut Criterion) {
    let graph = Arc::new(MemoryGraph::modern());
    let mut conn = graph.connect().unwrap();

    c.bench_function("round_trip/tutorial", |b| {
        b.iter(|| black_box(tutorial_traversal().to_list::<String>(&mut conn).unwrap()));
    });
}

criterion_group!(benches, bench_build, bench_encode, bench_round_trip);
criterion_main!(benches);
