//! Train/test splitting

use super::Dataset;
use crate::error::{Result, TunerError};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Shuffle row indices and split `dataset` into (train, test).
///
/// `train_ratio` must lie in (0, 1]; the train size is
/// `round(n * train_ratio)`. A seed makes the split reproducible.
/// The source dataset is left untouched.
pub fn train_test_split(
    dataset: &Dataset,
    train_ratio: f64,
    random_state: Option<u64>,
) -> Result<(Dataset, Dataset)> {
    if !(train_ratio > 0.0 && train_ratio <= 1.0) {
        return Err(TunerError::InvalidParameter {
            name: "train_ratio".to_string(),
            value: train_ratio.to_string(),
            reason: "must be in (0, 1]".to_string(),
        });
    }

    let total = dataset.n_rows();
    if total == 0 {
        return Err(TunerError::EmptyDataset);
    }

    let mut indices: Vec<usize> = (0..total).collect();
    let mut rng = match random_state {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_entropy(),
    };
    indices.shuffle(&mut rng);

    let split_at = ((total as f64) * train_ratio).round() as usize;
    let split_at = split_at.min(total);

    let train = dataset.select_rows(&indices[..split_at])?;
    let test = dataset.select_rows(&indices[split_at..])?;

    tracing::debug!(
        train = train.n_rows(),
        test = test.n_rows(),
        "Dataset split"
    );

    Ok((train, test))
}
