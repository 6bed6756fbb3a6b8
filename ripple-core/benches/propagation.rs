//! Benchmarks for change propagation
//!
//! Run with: cargo bench -p ripple-core

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use ripple_core::{batch, Computed, Effect, Signal};

/// Build a chain of `depth` computed values on top of one signal.
fn make_chain(depth: usize) -> (Signal<u64>, Computed<u64>) {
    let source = Signal::new(0_u64);
    let mut tail = Computed::new({
        let source = source.clone();
        move || source.get() + 1
    });
    for _ in 1..depth {
        let previous = tail.clone();
        tail = Computed::new(move || previous.get() + 1);
    }
    (source, tail)
}

fn bench_chain_pull(c: &mut Criterion) {
    let mut group = c.benchmark_group("propagation/chain_pull");

    for depth in [1, 10, 100] {
        let (source, tail) = make_chain(depth);
        group.bench_with_input(BenchmarkId::new("depth", depth), &depth, |b, _| {
            let mut n = 0;
            b.iter(|| {
                n += 1;
                source.set(n);
                black_box(tail.get())
            })
        });
    }

    group.finish();
}

fn bench_fan_out_effects(c: &mut Criterion) {
    let mut group = c.benchmark_group("propagation/fan_out");

    for width in [10, 100, 1000] {
        let source = Signal::new(0_u64);
        let effects: Vec<Effect> = (0..width)
            .map(|_| {
                let source = source.clone();
                Effect::new(move || {
                    black_box(source.get());
                })
            })
            .collect();

        group.bench_with_input(BenchmarkId::new("effects", width), &width, |b, _| {
            let mut n = 0;
            b.iter(|| {
                n += 1;
                source.set(n);
            })
        });
        drop(effects);
    }

    group.finish();
}

fn bench_batched_writes(c: &mut Criterion) {
    let mut group = c.benchmark_group("propagation/batch");

    for writes in [2, 16, 128] {
        let signals: Vec<Signal<u64>> = (0..writes).map(|_| Signal::new(0)).collect();
        let total = Computed::new({
            let signals = signals.clone();
            move || signals.iter().map(Signal::get).sum::<u64>()
        });
        let _effect = Effect::new({
            let total = total.clone();
            move || {
                black_box(total.get());
            }
        });

        group.bench_with_input(BenchmarkId::new("writes", writes), &writes, |b, _| {
            let mut n = 0;
            b.iter(|| {
                n += 1;
                batch(|| {
                    for signal in &signals {
                        signal.set(n);
                    }
                })
            })
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_chain_pull,
    bench_fan_out_effects,
    bench_batched_writes
);
criterion_main!(benches);
