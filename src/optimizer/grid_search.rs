//! Exhaustive cross-validated grid search
//!
//! Every configuration of a [`HyperparameterGrid`] is trained and scored on
//! each of k folds. The (configuration x fold) jobs are independent and run in
//! parallel on the backend's compute pool. Ranking is a stable sort on the
//! mean fold RMSE over records kept in enumeration order, so the outcome does
//! not depend on which job finishes first.

use super::config::GridSearchConfig;
use super::search_space::{Configuration, HyperparameterGrid};
use crate::data::{Dataset, FeatureEncoder};
use crate::error::{Result, TunerError};
use crate::training::backend::{CancellationToken, ModelBackend};
use crate::training::cross_validation::{CVResults, CVSplit};
use crate::training::metrics;
use ndarray::{Array1, Array2, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

/// Outcome of scoring one configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ScoreStatus {
    /// Every fold trained and was scored
    Scored {
        /// Fold RMSEs with their mean and spread
        cv: CVResults,
        /// Mean wall-clock seconds spent fitting one fold
        mean_fit_secs: f64,
    },
    /// At least one fold failed; excluded from ranking
    Unscored { reason: String },
}

/// A configuration together with its cross-validated score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub configuration: Configuration,
    #[serde(flatten)]
    pub status: ScoreStatus,
}

impl ScoreRecord {
    /// Mean fold RMSE, `None` when unscored
    pub fn score(&self) -> Option<f64> {
        match &self.status {
            ScoreStatus::Scored { cv, .. } => Some(cv.mean_score),
            ScoreStatus::Unscored { .. } => None,
        }
    }

    pub fn is_scored(&self) -> bool {
        matches!(self.status, ScoreStatus::Scored { .. })
    }

    pub fn cv_results(&self) -> Option<&CVResults> {
        match &self.status {
            ScoreStatus::Scored { cv, .. } => Some(cv),
            ScoreStatus::Unscored { .. } => None,
        }
    }

    /// Why the configuration was excluded, if it was
    pub fn failure(&self) -> Option<&str> {
        match &self.status {
            ScoreStatus::Unscored { reason } => Some(reason),
            ScoreStatus::Scored { .. } => None,
        }
    }
}

/// Result of a grid search
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridSearchResult {
    /// One record per configuration, in enumeration order
    records: Vec<ScoreRecord>,
    /// Indices into `records`, best first
    ranking: Vec<usize>,
    /// Fold count used
    pub n_folds: usize,
    /// Wall-clock duration of the search
    pub total_duration_secs: f64,
}

impl GridSearchResult {
    fn new(records: Vec<ScoreRecord>, n_folds: usize, total_duration_secs: f64) -> Self {
        let mut ranking: Vec<usize> = records
            .iter()
            .enumerate()
            .filter(|(_, r)| r.is_scored())
            .map(|(i, _)| i)
            .collect();

        // sort_by is stable: equal scores keep enumeration order
        ranking.sort_by(|&a, &b| {
            let sa = records[a].score().unwrap_or(f64::INFINITY);
            let sb = records[b].score().unwrap_or(f64::INFINITY);
            sa.total_cmp(&sb)
        });

        Self {
            records,
            ranking,
            n_folds,
            total_duration_secs,
        }
    }

    /// Scored configurations by ascending mean RMSE
    pub fn ranked(&self) -> impl Iterator<Item = &ScoreRecord> + '_ {
        self.ranking.iter().map(move |&i| &self.records[i])
    }

    /// Number of scored configurations
    pub fn n_ranked(&self) -> usize {
        self.ranking.len()
    }

    /// Head of the ranking
    pub fn best(&self) -> Option<&ScoreRecord> {
        self.ranking.first().map(|&i| &self.records[i])
    }

    /// Head of the ranking, or `NoScoredConfigurations` when every configuration failed
    pub fn require_best(&self) -> Result<&ScoreRecord> {
        self.best().ok_or(TunerError::NoScoredConfigurations {
            total: self.records.len(),
        })
    }

    /// Configurations excluded from ranking, in enumeration order
    pub fn unscored(&self) -> impl Iterator<Item = &ScoreRecord> + '_ {
        self.records.iter().filter(|r| !r.is_scored())
    }

    /// Every record in enumeration order
    pub fn all(&self) -> &[ScoreRecord] {
        &self.records
    }

    /// Grid size
    pub fn total(&self) -> usize {
        self.records.len()
    }
}

/// Training and held-out matrices for one fold
struct FoldData {
    x_train: Array2<f64>,
    y_train: Array1<f64>,
    x_test: Array2<f64>,
    y_test: Array1<f64>,
}

impl FoldData {
    fn new(x: &Array2<f64>, y: &Array1<f64>, split: &CVSplit) -> Self {
        Self {
            x_train: x.select(Axis(0), &split.train_indices),
            y_train: y.select(Axis(0), &split.train_indices),
            x_test: x.select(Axis(0), &split.test_indices),
            y_test: y.select(Axis(0), &split.test_indices),
        }
    }
}

enum FoldOutcome {
    Scored { rmse: f64, fit_secs: f64 },
    Failed(TunerError),
    /// Another fold of the same configuration already failed
    Skipped,
}

/// Cross-validated grid search over a [`ModelBackend`]
pub struct GridSearch<'a, B: ModelBackend> {
    backend: &'a B,
    grid: HyperparameterGrid,
    config: GridSearchConfig,
    cancel: CancellationToken,
}

impl<'a, B: ModelBackend> GridSearch<'a, B> {
    /// Create a search; `backend` should already be acquired
    pub fn new(backend: &'a B, grid: HyperparameterGrid, config: GridSearchConfig) -> Self {
        Self {
            backend,
            grid,
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Use `cancel` to stop the search from another thread
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn grid(&self) -> &HyperparameterGrid {
        &self.grid
    }

    pub fn config(&self) -> &GridSearchConfig {
        &self.config
    }

    /// Every configuration the search would train, in enumeration order
    pub fn enumerate(&self) -> Result<Vec<Configuration>> {
        self.grid.validate()?;
        Ok(self.grid.iter().collect())
    }

    /// Search using `features` to predict `target` on `train`
    pub fn run_on_dataset(&self, train: &Dataset, features: &[String], target: &str) -> Result<GridSearchResult> {
        if train.is_empty() {
            return Err(TunerError::EmptyDataset);
        }
        let encoder = FeatureEncoder::new(train, features)?;
        let x = encoder.encode(train)?;
        let y = train.target(target)?;
        self.run(&x, &y)
    }

    /// Search on an already encoded feature matrix
    pub fn run(&self, x: &Array2<f64>, y: &Array1<f64>) -> Result<GridSearchResult> {
        let start = Instant::now();

        // Input validation happens before any training
        let configurations = self.enumerate()?;
        self.config.validate()?;

        let n_samples = x.nrows();
        if n_samples == 0 {
            return Err(TunerError::EmptyDataset);
        }
        if y.len() != n_samples {
            return Err(TunerError::ShapeError {
                expected: format!("y length = {}", n_samples),
                actual: format!("y length = {}", y.len()),
            });
        }
        for configuration in &configurations {
            self.backend.validate(configuration)?;
        }

        let splits = self.config.kfold().split(n_samples)?;
        let n_folds = splits.len();
        let folds: Vec<FoldData> = splits.iter().map(|s| FoldData::new(x, y, s)).collect();

        tracing::info!(
            backend = self.backend.name(),
            configurations = configurations.len(),
            folds = n_folds,
            rows = n_samples,
            "Starting grid search"
        );

        let failed: Vec<AtomicBool> = configurations.iter().map(|_| AtomicBool::new(false)).collect();
        let jobs: Vec<(usize, usize)> = (0..configurations.len())
            .flat_map(|c| (0..n_folds).map(move |f| (c, f)))
            .collect();

        let run_job = |&(c, f): &(usize, usize)| -> FoldOutcome {
            if failed[c].load(Ordering::Relaxed) {
                return FoldOutcome::Skipped;
            }
            let outcome = self.score_fold(&configurations[c], f, &folds[f]);
            if matches!(outcome, FoldOutcome::Failed(_)) {
                failed[c].store(true, Ordering::Relaxed);
            }
            outcome
        };

        let outcomes: Vec<FoldOutcome> = if self.config.is_parallel() {
            self.backend.install(|| jobs.par_iter().map(run_job).collect())
        } else {
            self.backend.install(|| jobs.iter().map(run_job).collect())
        };

        // Folds only see the per-fold token; a cancelled search is not a failed configuration
        if self.cancel.is_cancelled() {
            return Err(TunerError::Cancelled);
        }

        let mut outcomes = outcomes.into_iter();
        let mut records = Vec::with_capacity(configurations.len());
        for configuration in configurations {
            let fold_outcomes: Vec<FoldOutcome> = outcomes.by_ref().take(n_folds).collect();
            records.push(self.aggregate(configuration, fold_outcomes)?);
        }

        let result = GridSearchResult::new(records, n_folds, start.elapsed().as_secs_f64());

        match result.best() {
            Some(best) => tracing::info!(
                scored = result.n_ranked(),
                total = result.total(),
                best = %best.configuration,
                cv_rmse = best.score().unwrap_or(f64::NAN),
                elapsed_secs = result.total_duration_secs,
                "Grid search complete"
            ),
            None => tracing::warn!(total = result.total(), "Grid search finished with no scored configuration"),
        }

        Ok(result)
    }

    fn score_fold(&self, configuration: &Configuration, fold_idx: usize, fold: &FoldData) -> FoldOutcome {
        let token = self.cancel.child_with_timeout(self.config.fold_timeout());
        let fit_start = Instant::now();

        let scored = self
            .backend
            .fit(&fold.x_train, &fold.y_train, configuration, &token)
            .and_then(|model| {
                token.check()?;
                let fit_secs = fit_start.elapsed().as_secs_f64();
                let rmse = metrics::evaluate(&model, &fold.x_test, &fold.y_test)?;
                Ok((rmse, fit_secs))
            });

        match scored {
            Ok((rmse, fit_secs)) => {
                tracing::debug!(
                    configuration = %configuration,
                    fold = fold_idx,
                    rmse,
                    fit_secs,
                    "Fold scored"
                );
                FoldOutcome::Scored { rmse, fit_secs }
            }
            Err(e) => FoldOutcome::Failed(e),
        }
    }

    fn aggregate(&self, configuration: Configuration, outcomes: Vec<FoldOutcome>) -> Result<ScoreRecord> {
        let mut scores = Vec::with_capacity(outcomes.len());
        let mut fit_secs = 0.0;
        let mut failure: Option<TunerError> = None;

        for outcome in outcomes {
            match outcome {
                FoldOutcome::Scored { rmse, fit_secs: secs } => {
                    scores.push(rmse);
                    fit_secs += secs;
                }
                FoldOutcome::Failed(e) if failure.is_none() => failure = Some(e),
                FoldOutcome::Failed(_) | FoldOutcome::Skipped => {}
            }
        }

        let status = match failure {
            // A broken backend or environment is not the configuration's fault
            Some(e) if !e.is_configuration_local() => return Err(e),
            Some(e) => ScoreStatus::Unscored { reason: e.to_string() },
            None => {
                let cv = CVResults::from_scores(scores);
                if cv.mean_score.is_finite() {
                    let mean_fit_secs = fit_secs / cv.n_folds as f64;
                    ScoreStatus::Scored { cv, mean_fit_secs }
                } else {
                    ScoreStatus::Unscored {
                        reason: "non-finite cross-validated score".to_string(),
                    }
                }
            }
        };

        match &status {
            ScoreStatus::Unscored { reason } => {
                tracing::warn!(configuration = %configuration, %reason, "Configuration excluded from ranking")
            }
            ScoreStatus::Scored { cv, .. } => tracing::debug!(
                configuration = %configuration,
                cv_rmse = cv.mean_score,
                cv_std = cv.std_score,
                "Configuration scored"
            ),
        }

        Ok(ScoreRecord { configuration, status })
    }
}
