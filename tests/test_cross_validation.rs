//! Integration test: fold generation and train/test splitting

use envelope_tuner::data::{train_test_split, ColumnSpec, Dataset, Schema};
use envelope_tuner::training::KFold;
use envelope_tuner::TunerError;
use polars::prelude::*;

fn indexed_dataset(n: usize) -> Dataset {
    let ids: Vec<f64> = (0..n).map(|i| i as f64).collect();
    let loads: Vec<f64> = (0..n).map(|i| (i * 3) as f64).collect();
    let df = df!("id" => ids, "load" => loads).unwrap();
    let schema = Schema::new(vec![ColumnSpec::numeric("id"), ColumnSpec::numeric("load")]);
    Dataset::from_dataframe(&df, &schema).unwrap()
}

#[test]
fn test_folds_partition_every_row_once() {
    for n in [2usize, 3, 7, 10, 33, 100, 768] {
        for k in [2usize, 3, 5, 10] {
            if k > n {
                continue;
            }
            for shuffle in [false, true] {
                let assignment = KFold::new(k)
                    .with_shuffle(shuffle)
                    .with_random_state(11)
                    .assign(n)
                    .unwrap();

                let sizes = assignment.fold_sizes();
                assert_eq!(sizes.len(), k);
                assert!(sizes.iter().all(|&s| s == n / k || s == n.div_ceil(k)), "n={} k={} {:?}", n, k, sizes);

                let splits = KFold::new(k).with_shuffle(shuffle).with_random_state(11).split(n).unwrap();
                let mut held_out: Vec<usize> = splits.iter().flat_map(|s| s.test_indices.iter().copied()).collect();
                held_out.sort_unstable();
                assert_eq!(held_out, (0..n).collect::<Vec<_>>());

                for split in &splits {
                    assert_eq!(split.train_indices.len() + split.test_indices.len(), n);
                    assert!(split.test_indices.iter().all(|i| !split.train_indices.contains(i)));
                }
            }
        }
    }
}

#[test]
fn test_unshuffled_folds_are_contiguous() {
    let assignment = KFold::new(2).assign(8).unwrap();
    assert_eq!(assignment.test_indices(0), vec![0, 1, 2, 3]);
    assert_eq!(assignment.test_indices(1), vec![4, 5, 6, 7]);
}

#[test]
fn test_fold_count_bounds() {
    assert!(matches!(
        KFold::new(10).assign(5),
        Err(TunerError::InvalidFoldCount { k: 10, n_samples: 5 })
    ));
    assert!(matches!(KFold::new(0).assign(5), Err(TunerError::InvalidFoldCount { .. })));
    assert!(KFold::new(5).assign(5).is_ok());
}

#[test]
fn test_split_keeps_rows_and_source() {
    let dataset = indexed_dataset(50);
    let before = dataset.clone();

    let (train, test) = train_test_split(&dataset, 0.8, Some(42)).unwrap();
    assert_eq!(train.n_rows(), 40);
    assert_eq!(test.n_rows(), 10);
    assert_eq!(dataset, before);

    // Rows travel whole: load is always 3 * id
    for part in [&train, &test] {
        let ids = part.numeric("id").unwrap();
        let loads = part.numeric("load").unwrap();
        for (id, load) in ids.iter().zip(loads) {
            assert_eq!(*load, id * 3.0);
        }
    }
}

#[test]
fn test_split_is_reproducible_with_seed() {
    let dataset = indexed_dataset(30);
    let a = train_test_split(&dataset, 0.5, Some(9)).unwrap();
    let b = train_test_split(&dataset, 0.5, Some(9)).unwrap();
    assert_eq!(a, b);
}
