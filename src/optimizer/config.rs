//! Grid search configuration

use crate::error::{Result, TunerError};
use crate::training::KFold;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for a cross-validated grid search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridSearchConfig {
    /// Number of cross-validation folds
    pub cv_folds: usize,

    /// Shuffle rows before dealing them into folds
    pub shuffle: bool,

    /// Seed for the fold shuffle
    pub random_state: Option<u64>,

    /// `Some(1)` runs the (configuration x fold) jobs sequentially, anything else in
    /// parallel on the backend's pool. The pool size belongs to the backend
    /// (`RandomForestBackend::with_n_jobs`); `TuningPipeline` does not forward this value.
    pub n_jobs: Option<usize>,

    /// Per-fold training time limit in seconds
    pub fold_timeout_secs: Option<f64>,
}

impl Default for GridSearchConfig {
    fn default() -> Self {
        Self {
            cv_folds: 10,
            shuffle: true,
            random_state: Some(42),
            n_jobs: None,
            fold_timeout_secs: None,
        }
    }
}

impl GridSearchConfig {
    /// Create a new configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to set the fold count
    pub fn with_cv_folds(mut self, k: usize) -> Self {
        self.cv_folds = k;
        self
    }

    /// Builder method to enable or disable the fold shuffle
    pub fn with_shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    /// Builder method to set the fold seed
    pub fn with_random_state(mut self, seed: Option<u64>) -> Self {
        self.random_state = seed;
        self
    }

    /// Builder method to set the worker count
    pub fn with_n_jobs(mut self, n: Option<usize>) -> Self {
        self.n_jobs = n;
        self
    }

    /// Builder method to set the per-fold timeout
    pub fn with_fold_timeout(mut self, secs: f64) -> Self {
        self.fold_timeout_secs = Some(secs);
        self
    }

    /// Whether the (configuration x fold) jobs run on the thread pool
    pub fn is_parallel(&self) -> bool {
        self.n_jobs != Some(1)
    }

    /// Per-fold timeout as a `Duration`; `None` when unset or not representable
    pub fn fold_timeout(&self) -> Option<Duration> {
        self.fold_timeout_secs
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
    }

    /// Fold generator described by this configuration
    pub fn kfold(&self) -> KFold {
        let kfold = KFold::new(self.cv_folds).with_shuffle(self.shuffle);
        match self.random_state {
            Some(seed) => kfold.with_random_state(seed),
            None => kfold,
        }
    }

    /// Reject settings that can never work, independent of the data.
    ///
    /// The fold count is checked against the row count by [`KFold::validate`]
    /// once the data is known.
    pub fn validate(&self) -> Result<()> {
        if self.n_jobs == Some(0) {
            return Err(TunerError::ConfigError("n_jobs must be at least 1".to_string()));
        }
        if let Some(secs) = self.fold_timeout_secs {
            if !(secs.is_finite() && secs > 0.0) || Duration::try_from_secs_f64(secs).is_err() {
                return Err(TunerError::ConfigError(format!(
                    "fold timeout must be a positive number of seconds, got {}",
                    secs
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = GridSearchConfig::default();
        assert_eq!(config.cv_folds, 10);
        assert!(config.shuffle);
        assert!(config.is_parallel());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = GridSearchConfig::new()
            .with_cv_folds(3)
            .with_n_jobs(Some(1))
            .with_fold_timeout(2.5);

        assert_eq!(config.kfold().n_splits(), 3);
        assert!(!config.is_parallel());
        assert_eq!(config.fold_timeout(), Some(Duration::from_millis(2500)));
    }

    #[test]
    fn test_validate() {
        assert!(GridSearchConfig::new().with_n_jobs(Some(0)).validate().is_err());
        assert!(GridSearchConfig::new().with_fold_timeout(-1.0).validate().is_err());
    }

    #[test]
    fn test_fold_count_checked_against_rows() {
        let config = GridSearchConfig::new().with_cv_folds(1);
        assert!(config.validate().is_ok());
        assert!(matches!(
            config.kfold().validate(5),
            Err(TunerError::InvalidFoldCount { k: 1, n_samples: 5 })
        ));
    }

    #[test]
    fn test_unrepresentable_timeout_rejected() {
        let config = GridSearchConfig::new().with_cv_folds(2).with_fold_timeout(1e20);
        assert!(matches!(config.validate(), Err(TunerError::ConfigError(_))));
        assert_eq!(config.fold_timeout(), None);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: GridSearchConfig = serde_json::from_str(r#"{"cv_folds": 4}"#).unwrap();
        assert_eq!(config.cv_folds, 4);
        assert_eq!(config.random_state, Some(42));
    }
}
