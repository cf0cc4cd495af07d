//! Benchmarks for the observation hot paths.
//!
//! Run with: cargo bench -p cozy-core --bench observe_bench

use std::hint::black_box;

use cozy_core::dispatch;
use cozy_core::{Callback, Object, ObserveOptions, Registry, ValueCell, deep_observe};
use criterion::{Criterion, criterion_group, criterion_main};
use serde_json::{Value, json};

// =============================================================================
// ValueCell
// =============================================================================

fn bench_cell(c: &mut Criterion) {
    let mut group = c.benchmark_group("cell");

    let cell = ValueCell::new(0u64);
    let _subs: Vec<_> = (0..4)
        .map(|_| {
            cell.subscribe(|n, _| {
                black_box(n);
            })
        })
        .collect();

    group.bench_function("set_changed_4_subscribers", |b| {
        let mut n = 0u64;
        b.iter(|| {
            n += 1;
            cell.set(black_box(n));
        })
    });

    group.bench_function("set_unchanged", |b| {
        let value = cell.get();
        b.iter(|| cell.set(black_box(value)))
    });

    group.finish();
}

// =============================================================================
// Object graphs
// =============================================================================

fn nested(depth: usize) -> Value {
    (0..depth).fold(json!({"count": 0}), |inner, _| json!({"child": inner}))
}

fn bench_object(c: &mut Criterion) {
    let mut group = c.benchmark_group("object");

    group.bench_function("build_depth_16", |b| {
        b.iter(|| black_box(Object::try_from(nested(16))))
    });

    let root = Object::try_from(nested(16)).expect("container");
    let _obs = deep_observe(&root, |new, _| {
        black_box(new);
    });
    let mut leaf = root.clone();
    while let Some(next) = leaf.child("child") {
        leaf = next;
    }
    group.bench_function("write_leaf_depth_16", |b| {
        let mut n = 0i64;
        b.iter(|| {
            n += 1;
            leaf.set("count", black_box(n))
        })
    });

    let list = Object::array();
    group.bench_function("push_pop", |b| {
        b.iter(|| {
            list.push(black_box(1)).ok();
            list.pop().ok()
        })
    });

    group.finish();
}

// =============================================================================
// Registry
// =============================================================================

fn bench_registry(c: &mut Criterion) {
    let mut group = c.benchmark_group("registry");

    group.bench_function("observe_unobserve_object", |b| {
        let registry = Registry::new();
        let target = Object::new();
        let cb = Callback::new(|_: &Value, _: &Value| {});
        b.iter(|| {
            registry.observe(ObserveOptions::new(&target, cb.clone()));
            registry.unobserve(&target, None)
        })
    });

    group.bench_function("deferred_write_and_drain", |b| {
        let registry = Registry::new();
        let target = Object::new();
        let cb = Callback::new(|new: &Value, _: &Value| {
            black_box(new);
        });
        registry.observe(ObserveOptions::new(&target, cb).with_async(true));
        let mut n = 0i64;
        b.iter(|| {
            n += 1;
            target.set("n", n).ok();
            dispatch::drain()
        })
    });

    group.finish();
}

criterion_group!(benches, bench_cell, bench_object, bench_registry);
criterion_main!(benches);
