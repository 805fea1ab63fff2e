use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rsdm::cv::crossvalidate_divs;
use rsdm::{
    get_divs, Bag, CvParams, DivFunc, FlannOptions, Matrix, Options, SvmParams, Task,
};

/// `n_bags` bags of `points` uniform points in `dim` dimensions, alternating
/// between two offsets
fn random_bags(n_bags: usize, points: usize, dim: usize) -> Vec<Bag<f64>> {
    let mut rng = StdRng::seed_from_u64(42);
    (0..n_bags)
        .map(|b| {
            let offset = (b % 2) as f64;
            let data = (0..points * dim)
                .map(|_| offset + rng.gen::<f64>())
                .collect();
            Bag::new(data, dim).unwrap()
        })
        .collect()
}

fn bench_divergences(c: &mut Criterion) {
    let mut group = c.benchmark_group("divergences");
    group.sample_size(10);

    let bags = random_bags(20, 100, 3);
    let funcs = [DivFunc::Renyi { alpha: 0.9 }, DivFunc::Hellinger, DivFunc::L2];

    for algorithm in ["linear", "kdtree"] {
        let options = Options::default().with_flann(FlannOptions {
            algorithm: Some(algorithm.to_string()),
            ..Default::default()
        });
        group.bench_with_input(
            BenchmarkId::new("20_bags_100_points", algorithm),
            &options,
            |b, options| b.iter(|| get_divs(black_box(&bags), None, &funcs, options).unwrap()),
        );
    }

    for threads in [1, 4] {
        let options = Options::default().with_num_threads(threads);
        group.bench_with_input(
            BenchmarkId::new("threads", threads),
            &options,
            |b, options| {
                b.iter(|| get_divs(black_box(&bags), None, &funcs[..1], options).unwrap())
            },
        );
    }

    group.finish();
}

fn bench_crossvalidation(c: &mut Criterion) {
    let mut group = c.benchmark_group("crossvalidation");
    group.sample_size(10);

    let bags = random_bags(40, 50, 2);
    let divs: Matrix = get_divs(&bags, None, &[DivFunc::Hellinger], &Options::default())
        .unwrap()
        .functional(0);
    let labels: Vec<f64> = (0..40).map(|i| (i % 2) as f64).collect();
    let params = SvmParams::default();

    for project_all in [false, true] {
        let cv = CvParams::default()
            .with_folds(5)
            .with_seed(0)
            .with_project_all(project_all);
        group.bench_with_input(
            BenchmarkId::new("40_bags", if project_all { "project_all" } else { "per_fold" }),
            &cv,
            |b, cv| {
                b.iter(|| {
                    crossvalidate_divs(black_box(&divs), &labels, Task::Classification, cv, &params)
                        .unwrap()
                })
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_divergences, bench_crossvalidation);
criterion_main!(benches);
