//! Benchmark: write propagation
//!
//! Measures one signal write end to end (mark, queue, flush, pull) for the
//! two graph shapes that stress the engine differently:
//!
//! - wide: one signal feeding N computeds, each watched by its own effect
//! - deep: a chain of N computeds with a single effect at the end
//!
//! Plus the batch case, where N writes should cost about one flush.

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use lattice_reactive::{Computed, Effect, Runtime, Signal};

fn wide(runtime: &Runtime, width: usize) -> (Signal<u64>, Vec<Computed<u64>>, Vec<Effect>) {
    let source = runtime.signal(0u64);
    let mut computeds = Vec::with_capacity(width);
    let mut effects = Vec::with_capacity(width);

    for offset in 0..width as u64 {
        let computed = {
            let source = source.clone();
            runtime.computed(move || source.get() + offset)
        };
        let effect = {
            let computed = computed.clone();
            runtime
                .effect(move || {
                    black_box(computed.get());
                })
                .expect("effect setup")
        };
        computeds.push(computed);
        effects.push(effect);
    }

    (source, computeds, effects)
}

fn deep(runtime: &Runtime, depth: usize) -> (Signal<u64>, Vec<Computed<u64>>, Effect) {
    let source = runtime.signal(0u64);
    let mut chain: Vec<Computed<u64>> = Vec::with_capacity(depth);

    for _ in 0..depth {
        let next = match chain.last() {
            Some(previous) => {
                let previous = previous.clone();
                runtime.computed(move || previous.get() + 1)
            }
            None => {
                let source = source.clone();
                runtime.computed(move || source.get() + 1)
            }
        };
        chain.push(next);
    }

    let effect = {
        let tail = chain.last().cloned();
        runtime
            .effect(move || {
                if let Some(tail) = &tail {
                    black_box(tail.get());
                }
            })
            .expect("effect setup")
    };

    (source, chain, effect)
}

fn bench_propagation(c: &mut Criterion) {
    let mut group = c.benchmark_group("propagation");

    for size in [10usize, 100, 1000] {
        group.bench_with_input(BenchmarkId::new("wide", size), &size, |b, &size| {
            let runtime = Runtime::new();
            let (source, _computeds, _effects) = wide(&runtime, size);
            let mut value = 0u64;
            b.iter(|| {
                value += 1;
                source.set(value).expect("write");
            });
        });

        group.bench_with_input(BenchmarkId::new("deep", size), &size, |b, &size| {
            let runtime = Runtime::new();
            let (source, _chain, _effect) = deep(&runtime, size);
            let mut value = 0u64;
            b.iter(|| {
                value += 1;
                source.set(value).expect("write");
            });
        });

        group.bench_with_input(BenchmarkId::new("batched_writes", size), &size, |b, &size| {
            let runtime = Runtime::new();
            let (source, _computeds, _effects) = wide(&runtime, 10);
            let mut value = 0u64;
            b.iter(|| {
                runtime
                    .batch(|| {
                        for _ in 0..size {
                            value += 1;
                            source.set(value).expect("write");
                        }
                    })
                    .expect("batch");
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_propagation);
criterion_main!(benches);
