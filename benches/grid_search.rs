use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use envelope_tuner::optimizer::{GridSearch, GridSearchConfig, HyperparameterGrid};
use envelope_tuner::training::{BackendSession, KFold, RandomForest, RandomForestBackend};
use ndarray::{Array1, Array2};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

fn create_regression_data(n_rows: usize, n_features: usize) -> (Array2<f64>, Array1<f64>) {
    let mut rng = ChaCha8Rng::seed_from_u64(7);

    let x = Array2::from_shape_fn((n_rows, n_features), |_| rng.gen::<f64>() * 10.0);
    // Target is the row sum plus noise
    let y = Array1::from_shape_fn(n_rows, |i| x.row(i).sum() + rng.gen::<f64>() * 0.1);

    (x, y)
}

fn bench_forest_fit(c: &mut Criterion) {
    let mut group = c.benchmark_group("forest");
    group.sample_size(10);

    for n_rows in [200, 768, 2000].iter() {
        let (x, y) = create_regression_data(*n_rows, 8);

        group.bench_with_input(BenchmarkId::new("fit", n_rows), &(x, y), |b, (x, y)| {
            b.iter(|| {
                let mut forest = RandomForest::new(20).with_max_depth(12).with_random_state(42);
                forest.fit(black_box(x), black_box(y)).unwrap();
                forest.n_trees()
            })
        });
    }

    group.finish();
}

fn bench_grid_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("grid_search");
    group.sample_size(10);

    let (x, y) = create_regression_data(768, 8);
    let grid = HyperparameterGrid::new()
        .add("ntrees", [10, 20])
        .add("max_depth", [8, 0])
        .add("min_rows", [1, 2]);

    let mut backend = RandomForestBackend::new();
    let session = BackendSession::acquire(&mut backend).unwrap();

    for folds in [3, 5, 10].iter() {
        let config = GridSearchConfig::new().with_cv_folds(*folds);

        group.bench_with_input(BenchmarkId::new("folds", folds), &config, |b, config| {
            b.iter(|| {
                GridSearch::new(&*session, grid.clone(), config.clone())
                    .run(black_box(&x), black_box(&y))
                    .unwrap()
            })
        });
    }

    group.finish();
}

fn bench_fold_assignment(c: &mut Criterion) {
    let mut group = c.benchmark_group("kfold");

    for n_rows in [768, 10000, 100000].iter() {
        group.bench_with_input(BenchmarkId::new("split", n_rows), n_rows, |b, &n| {
            b.iter(|| KFold::new(10).with_random_state(42).split(black_box(n)).unwrap())
        });
    }

    group.finish();
}

criterion_group!(benches, bench_forest_fit, bench_grid_search, bench_fold_assignment);
criterion_main!(benches);
