//! Benchmark: propagation through signals, computeds and effects

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use cascade_core::{batch, computed, effect, signal, Computed, Signal};

fn benchmark_computed_creation(c: &mut Criterion) {
    let source = signal(1u64);

    c.bench_function("computed_create_and_read", |b| {
        b.iter(|| {
            let source = source.clone();
            let doubled = computed(move || source.get() * 2);
            black_box(doubled.get())
        });
    });
}

/// `a -> (b, c) -> d`, repeated `depth` times in a chain.
fn diamond_chain(source: &Signal<u64>, depth: usize) -> Computed<u64> {
    let mut tail = {
        let source = source.clone();
        computed(move || source.get())
    };
    for _ in 0..depth {
        let left = {
            let tail = tail.clone();
            computed(move || tail.get() + 1)
        };
        let right = {
            let tail = tail.clone();
            computed(move || tail.get() * 2)
        };
        tail = computed(move || left.get() + right.get());
    }
    tail
}

fn benchmark_diamond_propagation(c: &mut Criterion) {
    let mut group = c.benchmark_group("diamond");

    for depth in [1usize, 8, 32] {
        group.bench_with_input(BenchmarkId::new("unobserved", depth), &depth, |b, &depth| {
            let source = signal(0u64);
            let sink = diamond_chain(&source, depth);
            let mut next = 0;
            b.iter(|| {
                next += 1;
                source.set(next);
                black_box(sink.get())
            });
        });

        group.bench_with_input(BenchmarkId::new("observed", depth), &depth, |b, &depth| {
            let source = signal(0u64);
            let sink = diamond_chain(&source, depth);
            let observer = effect(move || {
                black_box(sink.get());
            });
            let mut next = 0;
            b.iter(|| {
                next += 1;
                source.set(next);
            });
            observer.dispose();
        });
    }

    group.finish();
}

fn benchmark_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("fan_out");

    for width in [10usize, 100, 1000] {
        group.bench_with_input(BenchmarkId::from_parameter(width), &width, |b, &width| {
            let source = signal(0u64);
            let effects: Vec<_> = (0..width)
                .map(|_| {
                    let source = source.clone();
                    effect(move || {
                        black_box(source.get());
                    })
                })
                .collect();

            let mut next = 0;
            b.iter(|| {
                next += 1;
                source.set(next);
            });

            for observer in effects {
                observer.dispose();
            }
        });
    }

    group.finish();
}

fn benchmark_batched_writes(c: &mut Criterion) {
    let signals: Vec<_> = (0..16u64).map(signal).collect();
    let sum = {
        let signals = signals.clone();
        computed(move || signals.iter().map(Signal::get).sum::<u64>())
    };
    let observer = effect(move || {
        black_box(sum.get());
    });

    let mut next = 0;
    c.bench_function("batch_16_writes", |b| {
        b.iter(|| {
            next += 1;
            batch(|| {
                for signal in &signals {
                    signal.set(next);
                }
            });
        });
    });

    observer.dispose();
}

criterion_group!(
    benches,
    benchmark_computed_creation,
    benchmark_diamond_propagation,
    benchmark_fan_out,
    benchmark_batched_writes
);
criterion_main!(benches);
