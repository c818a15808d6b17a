//! End-to-end tuning pipeline
//!
//! split -> grid search per target -> retrain best on the full training split
//! -> score on the untouched test split -> append to the results table.

use crate::data::{train_test_split, Dataset, FeatureEncoder};
use crate::error::{Result, TunerError};
use crate::optimizer::{Configuration, GridSearch, GridSearchConfig, GridSearchResult, HyperparameterGrid, ScoreRecord};
use crate::report::ResultsTable;
use crate::training::backend::{BackendSession, CancellationToken, ModelBackend, Predictor};
use crate::training::metrics::{self, RegressionMetrics};
use ndarray::{Array1, Array2};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Instant;

/// A target column and the label it is reported under
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetSpec {
    pub column: String,
    pub label: String,
}

impl TargetSpec {
    pub fn new(column: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            label: label.into(),
        }
    }
}

/// Configuration for a tuning run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TuningConfig {
    /// Targets, tuned and reported in this order
    pub targets: Vec<TargetSpec>,
    /// Feature columns
    pub features: Vec<String>,
    /// Hyperparameter grid searched for every target
    pub grid: HyperparameterGrid,
    /// Cross-validation and parallelism settings
    pub search: GridSearchConfig,
    /// Fraction of rows used for training
    pub train_ratio: f64,
    /// Seed for the train/test split
    pub random_state: Option<u64>,
}

impl Default for TuningConfig {
    fn default() -> Self {
        Self::energy_efficiency()
    }
}

impl TuningConfig {
    /// Reference setup for the building energy-efficiency data
    pub fn energy_efficiency() -> Self {
        Self {
            targets: vec![
                TargetSpec::new("Y1", "Heating Load"),
                TargetSpec::new("Y2", "Cooling Load"),
            ],
            features: (1..=8).map(|i| format!("X{}", i)).collect(),
            grid: HyperparameterGrid::random_forest_default(),
            search: GridSearchConfig::default(),
            train_ratio: 0.8,
            random_state: Some(42),
        }
    }

    /// Builder method to set the targets
    pub fn with_targets(mut self, targets: Vec<TargetSpec>) -> Self {
        self.targets = targets;
        self
    }

    /// Builder method to set the feature columns
    pub fn with_features<S: Into<String>>(mut self, features: impl IntoIterator<Item = S>) -> Self {
        self.features = features.into_iter().map(Into::into).collect();
        self
    }

    /// Builder method to set the grid
    pub fn with_grid(mut self, grid: HyperparameterGrid) -> Self {
        self.grid = grid;
        self
    }

    /// Builder method to set the search configuration
    pub fn with_search(mut self, search: GridSearchConfig) -> Self {
        self.search = search;
        self
    }

    /// Builder method to set the train ratio
    pub fn with_train_ratio(mut self, ratio: f64) -> Self {
        self.train_ratio = ratio;
        self
    }

    /// Builder method to set the split seed
    pub fn with_random_state(mut self, seed: Option<u64>) -> Self {
        self.random_state = seed;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.targets.is_empty() {
            return Err(TunerError::ConfigError("no targets configured".to_string()));
        }
        if self.features.is_empty() {
            return Err(TunerError::ConfigError("no features configured".to_string()));
        }
        if let Some(t) = self.targets.iter().find(|t| self.features.contains(&t.column)) {
            return Err(TunerError::ConfigError(format!(
                "target '{}' is also listed as a feature",
                t.column
            )));
        }
        if !(self.train_ratio > 0.0 && self.train_ratio <= 1.0) {
            return Err(TunerError::InvalidParameter {
                name: "train_ratio".to_string(),
                value: self.train_ratio.to_string(),
                reason: "must be in (0, 1]".to_string(),
            });
        }
        self.grid.validate()?;
        self.search.validate()
    }

    /// Load configuration from a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Save configuration to a JSON file
    pub fn to_json_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

/// Final scores of a retrained configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FinalEvaluation {
    /// Held-out test metrics; `test.rmse` is the reported score
    pub test: RegressionMetrics,
    /// The same model scored on the data it was fitted on
    pub train_rmse: f64,
}

/// Refit `configuration` on the whole training split and score it on the test split.
///
/// Fails with `EmptyEvaluationSet` when the test split has no rows.
pub fn retrain_and_evaluate<B: ModelBackend>(
    backend: &B,
    configuration: &Configuration,
    (x_train, y_train): (&Array2<f64>, &Array1<f64>),
    (x_test, y_test): (&Array2<f64>, &Array1<f64>),
    cancel: &CancellationToken,
) -> Result<FinalEvaluation> {
    let model = backend.fit(x_train, y_train, configuration, cancel)?;
    let train_rmse = metrics::evaluate(&model, x_train, y_train)?;

    if y_test.is_empty() {
        return Err(TunerError::EmptyEvaluationSet);
    }
    let predictions = model.predict(x_test)?;
    let test = RegressionMetrics::compute(y_test, &predictions)?;

    Ok(FinalEvaluation { test, train_rmse })
}

/// Everything learned about one target
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetOutcome {
    pub target: String,
    pub label: String,
    /// Head of the ranking
    pub best: ScoreRecord,
    /// Full search, including excluded configurations
    pub search: GridSearchResult,
    /// Retrained model on the test split
    pub test_metrics: RegressionMetrics,
    /// Retrained model on its own training data, diagnostic only
    pub train_rmse: f64,
}

/// Result of a pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineOutput {
    /// One row per target, in configured order
    pub results: ResultsTable,
    pub outcomes: Vec<TargetOutcome>,
    pub n_train: usize,
    pub n_test: usize,
    pub total_duration_secs: f64,
}

/// Drives a [`ModelBackend`] through a full tuning run
pub struct TuningPipeline<B: ModelBackend> {
    backend: B,
    config: TuningConfig,
    cancel: CancellationToken,
}

impl<B: ModelBackend> TuningPipeline<B> {
    pub fn new(backend: B, config: TuningConfig) -> Self {
        Self {
            backend,
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Use `cancel` to stop the run from another thread
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &TuningConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Run the whole pipeline on `dataset`.
    ///
    /// The backend is acquired for the duration of the run and released
    /// afterwards, also when the run fails.
    pub fn run(&mut self, dataset: &Dataset) -> Result<PipelineOutput> {
        let start = Instant::now();
        let Self { backend, config, cancel } = self;
        let (config, cancel) = (&*config, &*cancel);

        config.validate()?;
        if dataset.is_empty() {
            return Err(TunerError::EmptyDataset);
        }

        let (train, test) = train_test_split(dataset, config.train_ratio, config.random_state)?;

        let encoder = FeatureEncoder::new(&train, &config.features)?;
        let x_train = encoder.encode(&train)?;
        let x_test = encoder.encode(&test)?;

        tracing::info!(
            train = train.n_rows(),
            test = test.n_rows(),
            features = encoder.n_outputs(),
            targets = config.targets.len(),
            "Tuning pipeline started"
        );

        let session = BackendSession::acquire(backend)?;
        let backend: &B = &session;

        let tune = |target: &TargetSpec| -> Result<TargetOutcome> {
            let y_train = train.target(&target.column)?;
            let y_test = test.target(&target.column)?;
            tune_target(backend, config, target, (&x_train, &y_train), (&x_test, &y_test), cancel)
        };

        // Targets are independent; results are still collected in configured order
        let outcomes: Vec<Result<TargetOutcome>> = if config.search.is_parallel() {
            backend.install(|| config.targets.par_iter().map(tune).collect())
        } else {
            config.targets.iter().map(tune).collect()
        };

        let mut results = ResultsTable::new();
        let mut kept = Vec::with_capacity(outcomes.len());
        for outcome in outcomes {
            let outcome = outcome?;
            results.push(outcome.label.clone(), outcome.test_metrics.rmse);
            kept.push(outcome);
        }

        let output = PipelineOutput {
            results,
            outcomes: kept,
            n_train: train.n_rows(),
            n_test: test.n_rows(),
            total_duration_secs: start.elapsed().as_secs_f64(),
        };

        tracing::info!(elapsed_secs = output.total_duration_secs, "Tuning pipeline finished");
        Ok(output)
    }
}

fn tune_target<B: ModelBackend>(
    backend: &B,
    config: &TuningConfig,
    target: &TargetSpec,
    train: (&Array2<f64>, &Array1<f64>),
    test: (&Array2<f64>, &Array1<f64>),
    cancel: &CancellationToken,
) -> Result<TargetOutcome> {
    tracing::info!(target = %target.column, label = %target.label, "Searching");

    let search = GridSearch::new(backend, config.grid.clone(), config.search.clone())
        .with_cancellation(cancel.clone())
        .run(train.0, train.1)?;
    let best = search.require_best()?.clone();

    let evaluation = retrain_and_evaluate(backend, &best.configuration, train, test, cancel)?;

    tracing::debug!(
        target = %target.column,
        train_rmse = evaluation.train_rmse,
        "Best configuration refitted on the full training split"
    );
    tracing::info!(
        target = %target.column,
        best = %best.configuration,
        cv_rmse = best.score().unwrap_or(f64::NAN),
        test_rmse = evaluation.test.rmse,
        "Target tuned"
    );

    Ok(TargetOutcome {
        target: target.column.clone(),
        label: target.label.clone(),
        best,
        search,
        test_metrics: evaluation.test,
        train_rmse: evaluation.train_rmse,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_energy_defaults() {
        let config = TuningConfig::energy_efficiency();
        assert_eq!(config.features.len(), 8);
        assert_eq!(config.targets[0].column, "Y1");
        assert_eq!(config.targets[1].label, "Cooling Load");
        assert_eq!(config.grid.size(), 12);
        assert_eq!(config.search.cv_folds, 10);
        assert_eq!(config.train_ratio, 0.8);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_configs() {
        let base = TuningConfig::energy_efficiency();

        assert!(base.clone().with_targets(vec![]).validate().is_err());
        assert!(base.clone().with_features(Vec::<String>::new()).validate().is_err());
        assert!(base.clone().with_features(["X1", "Y1"]).validate().is_err());
        assert!(matches!(
            base.clone().with_train_ratio(1.5).validate(),
            Err(TunerError::InvalidParameter { .. })
        ));
        assert!(matches!(
            base.with_grid(HyperparameterGrid::new()).validate(),
            Err(TunerError::EmptyGrid)
        ));
    }

    #[test]
    fn test_json_file_round_trip() {
        let path = std::env::temp_dir().join(format!("envelope-tuner-config-{}.json", std::process::id()));
        let config = TuningConfig::energy_efficiency()
            .with_train_ratio(0.75)
            .with_search(GridSearchConfig::new().with_cv_folds(5));

        config.to_json_file(&path).unwrap();
        let loaded = TuningConfig::from_json_file(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: TuningConfig = serde_json::from_str(r#"{"train_ratio": 0.5}"#).unwrap();
        assert_eq!(config.train_ratio, 0.5);
        assert_eq!(config.targets.len(), 2);
    }
}
