//! K-fold cross-validation

use crate::error::{Result, TunerError};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// A single train/test split
#[derive(Debug, Clone, PartialEq)]
pub struct CVSplit {
    pub train_indices: Vec<usize>,
    pub test_indices: Vec<usize>,
    pub fold_idx: usize,
}

/// Mapping from row index to fold id in `[0, k)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoldAssignment {
    folds: Vec<usize>,
    n_folds: usize,
}

impl FoldAssignment {
    /// Fold id of `row`
    pub fn fold_of(&self, row: usize) -> Option<usize> {
        self.folds.get(row).copied()
    }

    pub fn n_folds(&self) -> usize {
        self.n_folds
    }

    pub fn n_samples(&self) -> usize {
        self.folds.len()
    }

    /// Row indices held out in `fold`, ascending
    pub fn test_indices(&self, fold: usize) -> Vec<usize> {
        self.folds
            .iter()
            .enumerate()
            .filter(|(_, &f)| f == fold)
            .map(|(i, _)| i)
            .collect()
    }

    /// Number of rows in each fold
    pub fn fold_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.n_folds];
        for &f in &self.folds {
            sizes[f] += 1;
        }
        sizes
    }

    /// One split per fold: that fold held out, the other k-1 for training
    pub fn splits(&self) -> Vec<CVSplit> {
        (0..self.n_folds)
            .map(|fold_idx| {
                let (test_indices, train_indices): (Vec<usize>, Vec<usize>) =
                    (0..self.folds.len()).partition(|&i| self.folds[i] == fold_idx);
                CVSplit {
                    train_indices,
                    test_indices,
                    fold_idx,
                }
            })
            .collect()
    }
}

/// K-fold splitter.
///
/// Rows are dealt into `n_splits` contiguous blocks (after an optional seeded
/// shuffle); the first `n % k` folds get one extra row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KFold {
    n_splits: usize,
    shuffle: bool,
    random_state: Option<u64>,
}

impl KFold {
    /// Create an unshuffled k-fold splitter
    pub fn new(n_splits: usize) -> Self {
        Self {
            n_splits,
            shuffle: false,
            random_state: None,
        }
    }

    /// Shuffle rows before dealing them into folds
    pub fn with_shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    /// Set random state for reproducibility
    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    pub fn n_splits(&self) -> usize {
        self.n_splits
    }

    /// Check `2 <= k <= n_samples`
    pub fn validate(&self, n_samples: usize) -> Result<()> {
        if self.n_splits < 2 || self.n_splits > n_samples {
            return Err(TunerError::InvalidFoldCount {
                k: self.n_splits,
                n_samples,
            });
        }
        Ok(())
    }

    /// Assign each of `n_samples` rows to a fold
    pub fn assign(&self, n_samples: usize) -> Result<FoldAssignment> {
        self.validate(n_samples)?;

        let mut indices: Vec<usize> = (0..n_samples).collect();

        if self.shuffle {
            let mut rng = match self.random_state {
                Some(seed) => ChaCha8Rng::seed_from_u64(seed),
                None => ChaCha8Rng::from_entropy(),
            };
            indices.shuffle(&mut rng);
        }

        let base = n_samples / self.n_splits;
        let remainder = n_samples % self.n_splits;

        let mut folds = vec![0; n_samples];
        let mut current = 0;
        for fold_idx in 0..self.n_splits {
            let fold_size = if fold_idx < remainder { base + 1 } else { base };
            for &row in &indices[current..current + fold_size] {
                folds[row] = fold_idx;
            }
            current += fold_size;
        }

        Ok(FoldAssignment {
            folds,
            n_folds: self.n_splits,
        })
    }

    /// Generate train/test splits
    pub fn split(&self, n_samples: usize) -> Result<Vec<CVSplit>> {
        Ok(self.assign(n_samples)?.splits())
    }
}

/// Cross-validation results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CVResults {
    /// Scores for each fold
    pub scores: Vec<f64>,
    /// Mean score across folds
    pub mean_score: f64,
    /// Population standard deviation of scores
    pub std_score: f64,
    /// Number of folds
    pub n_folds: usize,
}

impl CVResults {
    /// Create CV results from fold scores
    pub fn from_scores(scores: Vec<f64>) -> Self {
        let n_folds = scores.len();
        let mean_score = scores.iter().sum::<f64>() / n_folds as f64;
        let variance = scores.iter().map(|s| (s - mean_score).powi(2)).sum::<f64>() / n_folds as f64;
        let std_score = variance.sqrt();

        Self {
            scores,
            mean_score,
            std_score,
            n_folds,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_k_fold() {
        let splits = KFold::new(5).split(100).unwrap();

        assert_eq!(splits.len(), 5);

        for split in &splits {
            assert_eq!(split.test_indices.len(), 20);
            assert_eq!(split.train_indices.len(), 80);
        }

        // All indices should be covered exactly once in test sets
        let mut all_test: Vec<usize> = splits.iter().flat_map(|s| s.test_indices.clone()).collect();
        all_test.sort();
        assert_eq!(all_test, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn test_uneven_fold_sizes() {
        let assignment = KFold::new(3).assign(10).unwrap();
        assert_eq!(assignment.fold_sizes(), vec![4, 3, 3]);
        assert_eq!(assignment.test_indices(0), vec![0, 1, 2, 3]);
        assert_eq!(assignment.fold_of(9), Some(2));
    }

    #[test]
    fn test_shuffled_partition_is_exact() {
        for n in 2..40 {
            for k in 2..=n.min(12) {
                let assignment = KFold::new(k)
                    .with_shuffle(true)
                    .with_random_state(n as u64 * 31 + k as u64)
                    .assign(n)
                    .unwrap();

                let sizes = assignment.fold_sizes();
                let max = *sizes.iter().max().unwrap();
                let min = *sizes.iter().min().unwrap();
                assert!(max - min <= 1, "n={} k={} sizes={:?}", n, k, sizes);
                assert_eq!(sizes.iter().sum::<usize>(), n);

                let mut seen: Vec<usize> = (0..k).flat_map(|f| assignment.test_indices(f)).collect();
                seen.sort();
                assert_eq!(seen, (0..n).collect::<Vec<_>>());
            }
        }
    }

    #[test]
    fn test_seeded_shuffle_is_deterministic() {
        let cv = KFold::new(4).with_shuffle(true).with_random_state(42);
        assert_eq!(cv.assign(30).unwrap(), cv.assign(30).unwrap());
    }

    #[test]
    fn test_invalid_fold_count() {
        assert!(matches!(
            KFold::new(1).assign(10),
            Err(TunerError::InvalidFoldCount { k: 1, n_samples: 10 })
        ));
        assert!(matches!(
            KFold::new(10).assign(5),
            Err(TunerError::InvalidFoldCount { k: 10, n_samples: 5 })
        ));
    }

    #[test]
    fn test_cv_results() {
        let results = CVResults::from_scores(vec![1.0, 3.0]);
        assert_eq!(results.mean_score, 2.0);
        assert_eq!(results.std_score, 1.0);
        assert_eq!(results.n_folds, 2);
    }
}
