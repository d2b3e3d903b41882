use covary::CrossBlockMode;
use covary::bootstrap::{BootstrapOptions, bootstrap_test};
use covary::decompose::decompose;
use covary::permutation::{PermutationOptions, permutation_test};
use covary::{CancellationToken, NoopProgress};
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use ndarray::Array2;
use rand::distributions::Standard;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const DRAWS: usize = 200;

fn random_block(rows: usize, cols: usize, seed: u64) -> Array2<f64> {
    let mut rng = StdRng::seed_from_u64(0x5EED_F64 + seed);
    Array2::from_shape_fn((rows, cols), |_| rng.sample(Standard))
}

fn benchmark_resampling(c: &mut Criterion) {
    let shapes = [(50_usize, 10_usize, 5_usize), (200, 40, 10)];
    let mut group = c.benchmark_group("resampling");
    group.sample_size(10);
    group.throughput(Throughput::Elements(DRAWS as u64));

    for &(n, p, q) in &shapes {
        let x = random_block(n, p, 1);
        let y = random_block(n, q, 2);
        let Ok((observed, _)) = decompose(x.view(), y.view(), CrossBlockMode::Correlation) else {
            continue;
        };
        let label = format!("{n}x{p}x{q}");

        let permutation = PermutationOptions {
            n_perm: DRAWS,
            seed: 7,
            mode: CrossBlockMode::Correlation,
            rotate: false,
            n_split: 0,
            ci: 95.0,
            max_failure_fraction: 0.05,
        };
        group.bench_with_input(
            BenchmarkId::new("permutation", &label),
            &permutation,
            |b, options| {
                b.iter(|| {
                    let result = permutation_test(
                        black_box(x.view()),
                        black_box(y.view()),
                        &observed,
                        options,
                        &CancellationToken::new(),
                        &NoopProgress,
                    );
                    black_box(result.is_ok());
                });
            },
        );

        let bootstrap = BootstrapOptions {
            n_boot: DRAWS,
            seed: 7,
            mode: CrossBlockMode::Correlation,
            ci: 95.0,
            max_failure_fraction: 0.05,
        };
        group.bench_with_input(BenchmarkId::new("bootstrap", &label), &bootstrap, |b, options| {
            b.iter(|| {
                let result = bootstrap_test(
                    black_box(x.view()),
                    black_box(y.view()),
                    &observed,
                    options,
                    &CancellationToken::new(),
                    &NoopProgress,
                );
                black_box(result.is_ok());
            });
        });
    }
    group.finish();
}

criterion_group!(benches, benchmark_resampling);
criterion_main!(benches);
