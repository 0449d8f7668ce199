//! Criterion benchmarks for a full collision step on the reference profile.

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use drizzle_backend::{default_backend, SerialBackend};
use drizzle_bench::{collision_step, reference_profile};
use drizzle_core::Backend;
use drizzle_engine::{MomentRequest, Moments, UniformSource};

fn bench_collision_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("collision_step");
    group.sample_size(20);
    for (name, parallel) in [("serial", false), ("default", true)] {
        group.bench_function(name, |b| {
            b.iter_batched(
                || {
                    let backend: Box<dyn Backend> = if parallel {
                        default_backend()
                    } else {
                        Box::new(SerialBackend::new())
                    };
                    reference_profile(42, backend)
                },
                |mut p| {
                    let n_sd = p.n_sd();
                    let mut rng = UniformSource::new(7);
                    let mut u01 = vec![0.0; n_sd];
                    let mut pairs = vec![false; n_sd];
                    let mut gamma = vec![0.0; n_sd];
                    let outcome =
                        collision_step(&mut p, &mut rng, &mut u01, &mut pairs, &mut gamma)
                            .unwrap();
                    black_box(outcome);
                },
                BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

fn bench_moments(c: &mut Criterion) {
    let mut p = reference_profile(42, default_backend());
    let request = MomentRequest::new()
        .ranks("volume", &[0, 1, 2, 3])
        .rank("temperature", 1);
    let mut out = Moments::for_request(&request, p.n_cells());
    c.bench_function("moments_reference", |b| {
        b.iter(|| {
            p.moments(&mut out, &request, "volume", (0.0, f64::INFINITY))
                .unwrap();
            black_box(out.moment_0()[0]);
        });
    });
}

criterion_group!(benches, bench_collision_step, bench_moments);
criterion_main!(benches);
