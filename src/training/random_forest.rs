//! Random forest regression and its grid-search backend

use super::backend::{CancellationToken, ModelBackend, Predictor};
use super::decision_tree::DecisionTree;
use crate::error::{Result, TunerError};
use crate::optimizer::{Configuration, ParameterValue};
use ndarray::{Array1, Array2, Axis};
use rand::seq::SliceRandom;
use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Random forest regressor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    /// Individual trees
    trees: Vec<DecisionTree>,
    /// Number of trees
    pub n_estimators: usize,
    /// Maximum depth per tree
    pub max_depth: Option<usize>,
    /// Minimum samples to split
    pub min_samples_split: usize,
    /// Minimum samples in leaf
    pub min_samples_leaf: usize,
    /// Candidate features per split
    pub max_features: MaxFeatures,
    /// Sample rows with replacement
    pub bootstrap: bool,
    /// Fraction of rows drawn for each tree
    pub sample_rate: f64,
    /// Random state
    pub random_state: Option<u64>,
    /// Feature importances
    feature_importances: Option<Array1<f64>>,
    /// Number of features
    n_features: usize,
}

/// Strategy for max features
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum MaxFeatures {
    /// Square root of n_features
    Sqrt,
    /// Log2 of n_features
    Log2,
    /// A third of n_features, the usual regression default
    Third,
    /// Fraction of n_features
    Fraction(f64),
    /// Fixed number
    Fixed(usize),
    /// All features
    All,
}

impl Default for RandomForest {
    fn default() -> Self {
        Self::new(50)
    }
}

impl RandomForest {
    /// Create a forest of `n_estimators` regression trees
    pub fn new(n_estimators: usize) -> Self {
        Self {
            trees: Vec::new(),
            n_estimators,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: MaxFeatures::Third,
            bootstrap: true,
            sample_rate: 1.0,
            random_state: None,
            feature_importances: None,
            n_features: 0,
        }
    }

    /// Set maximum depth
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    /// Set minimum samples to split
    pub fn with_min_samples_split(mut self, min_samples: usize) -> Self {
        self.min_samples_split = min_samples;
        self
    }

    /// Set minimum samples in leaf
    pub fn with_min_samples_leaf(mut self, min_samples: usize) -> Self {
        self.min_samples_leaf = min_samples;
        self
    }

    /// Set max features strategy
    pub fn with_max_features(mut self, max_features: MaxFeatures) -> Self {
        self.max_features = max_features;
        self
    }

    /// Enable or disable bootstrap sampling
    pub fn with_bootstrap(mut self, bootstrap: bool) -> Self {
        self.bootstrap = bootstrap;
        self
    }

    /// Set the per-tree row sampling rate
    pub fn with_sample_rate(mut self, rate: f64) -> Self {
        self.sample_rate = rate;
        self
    }

    /// Set random state
    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    fn compute_max_features(&self, n_features: usize) -> usize {
        match self.max_features {
            MaxFeatures::Sqrt => (n_features as f64).sqrt().ceil() as usize,
            MaxFeatures::Log2 => (n_features as f64).log2().ceil() as usize,
            MaxFeatures::Third => n_features / 3,
            MaxFeatures::Fraction(f) => (n_features as f64 * f).ceil() as usize,
            MaxFeatures::Fixed(n) => n.min(n_features),
            MaxFeatures::All => n_features,
        }
        .max(1)
    }

    /// Fit the forest to training data
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        self.fit_with_cancel(x, y, &CancellationToken::new())
    }

    /// Fit, stopping with an error as soon as `cancel` fires
    pub fn fit_with_cancel(
        &mut self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        cancel: &CancellationToken,
    ) -> Result<&mut Self> {
        let n_samples = x.nrows();
        let n_features = x.ncols();

        if n_samples != y.len() {
            return Err(TunerError::ShapeError {
                expected: format!("y length = {}", n_samples),
                actual: format!("y length = {}", y.len()),
            });
        }
        if n_samples == 0 {
            return Err(TunerError::TrainingFailure(
                "cannot fit a forest on zero rows".to_string(),
            ));
        }
        if self.n_estimators == 0 {
            return Err(TunerError::TrainingFailure(
                "forest needs at least one tree".to_string(),
            ));
        }

        self.n_features = n_features;
        let max_features = self.compute_max_features(n_features);
        let n_drawn = ((n_samples as f64 * self.sample_rate).round() as usize).clamp(1, n_samples);

        // Tree i is seeded with base_seed + i
        let base_seed = self.random_state.unwrap_or_else(rand::random);

        let trees: Vec<DecisionTree> = (0..self.n_estimators)
            .into_par_iter()
            .map(|tree_idx| -> Result<DecisionTree> {
                cancel.check()?;

                let seed = base_seed.wrapping_add(tree_idx as u64);
                let mut rng = ChaCha8Rng::seed_from_u64(seed);

                let sample_indices: Vec<usize> = if self.bootstrap {
                    (0..n_drawn).map(|_| rng.gen_range(0..n_samples)).collect()
                } else if n_drawn < n_samples {
                    let mut all: Vec<usize> = (0..n_samples).collect();
                    all.shuffle(&mut rng);
                    all.truncate(n_drawn);
                    all.sort_unstable();
                    all
                } else {
                    (0..n_samples).collect()
                };

                let x_boot = x.select(Axis(0), &sample_indices);
                let y_boot = y.select(Axis(0), &sample_indices);

                let mut tree = DecisionTree::new()
                    .with_min_samples_split(self.min_samples_split)
                    .with_min_samples_leaf(self.min_samples_leaf)
                    .with_max_features(max_features)
                    .with_random_state(rng.next_u64());

                if let Some(d) = self.max_depth {
                    tree = tree.with_max_depth(d);
                }

                tree.fit_with_cancel(&x_boot, &y_boot, cancel)?;
                Ok(tree)
            })
            .collect::<Result<Vec<_>>>()?;

        self.trees = trees;
        self.compute_feature_importances();

        Ok(self)
    }

    fn compute_feature_importances(&mut self) {
        if self.trees.is_empty() {
            return;
        }

        let mut total_importances = vec![0.0; self.n_features];

        for tree in &self.trees {
            if let Some(imp) = tree.feature_importances() {
                for (i, &val) in imp.iter().enumerate() {
                    if i < self.n_features {
                        total_importances[i] += val;
                    }
                }
            }
        }

        let n_trees = self.trees.len() as f64;
        for imp in &mut total_importances {
            *imp /= n_trees;
        }

        // Normalize
        let total: f64 = total_importances.iter().sum();
        if total > 0.0 {
            for imp in &mut total_importances {
                *imp /= total;
            }
        }

        self.feature_importances = Some(Array1::from_vec(total_importances));
    }

    /// Mean prediction over all trees
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.trees.is_empty() {
            return Err(TunerError::ModelNotFitted);
        }

        let all_predictions: Vec<Array1<f64>> = self
            .trees
            .par_iter()
            .map(|tree| tree.predict(x))
            .collect::<Result<Vec<_>>>()?;

        let mut sum: Array1<f64> = Array1::zeros(x.nrows());
        for preds in &all_predictions {
            sum += preds;
        }

        Ok(sum / all_predictions.len() as f64)
    }

    /// Get feature importances
    pub fn feature_importances(&self) -> Option<&Array1<f64>> {
        self.feature_importances.as_ref()
    }

    /// Get number of trees
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

impl Predictor for RandomForest {
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        RandomForest::predict(self, x)
    }
}

/// Forest hyperparameters read from a [`Configuration`].
///
/// | name          | meaning                                   | range      |
/// |---------------|-------------------------------------------|------------|
/// | `ntrees`      | number of trees                           | >= 1       |
/// | `max_depth`   | depth limit, 0 for unlimited              | >= 0       |
/// | `min_rows`    | minimum rows per leaf                     | >= 1       |
/// | `mtries`      | features per split, -1 for a third        | -1 or >= 1 |
/// | `sample_rate` | fraction of rows drawn per tree           | (0, 1]     |
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForestParams {
    pub ntrees: usize,
    pub max_depth: Option<usize>,
    pub min_rows: usize,
    pub max_features: MaxFeatures,
    pub sample_rate: f64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            ntrees: 50,
            max_depth: None,
            min_rows: 1,
            max_features: MaxFeatures::Third,
            sample_rate: 1.0,
        }
    }
}

const FOREST_PARAMS: [&str; 5] = ["ntrees", "max_depth", "min_rows", "mtries", "sample_rate"];

impl ForestParams {
    /// Parse and range-check every parameter of `config`
    pub fn from_config(config: &Configuration) -> Result<Self> {
        if let Some(unknown) = config.names().find(|n| !FOREST_PARAMS.contains(n)) {
            return Err(TunerError::InvalidParameter {
                name: unknown.to_string(),
                value: config.get(unknown).map(ParameterValue::to_string).unwrap_or_default(),
                reason: "not a random forest parameter".to_string(),
            });
        }

        let mut params = Self::default();

        if let Some(ntrees) = config.int("ntrees")? {
            params.ntrees = at_least("ntrees", ntrees, 1)?;
        }
        if let Some(depth) = config.int("max_depth")? {
            params.max_depth = match at_least("max_depth", depth, 0)? {
                0 => None,
                d => Some(d),
            };
        }
        if let Some(min_rows) = config.int("min_rows")? {
            params.min_rows = at_least("min_rows", min_rows, 1)?;
        }
        if let Some(mtries) = config.int("mtries")? {
            params.max_features = match mtries {
                -1 => MaxFeatures::Third,
                m => MaxFeatures::Fixed(at_least("mtries", m, 1)?),
            };
        }
        if let Some(rate) = config.float("sample_rate")? {
            if !(rate > 0.0 && rate <= 1.0) {
                return Err(TunerError::InvalidParameter {
                    name: "sample_rate".to_string(),
                    value: rate.to_string(),
                    reason: "must be in (0, 1]".to_string(),
                });
            }
            params.sample_rate = rate;
        }

        Ok(params)
    }
}

fn at_least(name: &str, value: i64, min: i64) -> Result<usize> {
    if value < min {
        return Err(TunerError::InvalidParameter {
            name: name.to_string(),
            value: value.to_string(),
            reason: format!("must be >= {}", min),
        });
    }
    Ok(value as usize)
}

/// Grid-search backend training [`RandomForest`] models.
///
/// Acquiring the backend builds a dedicated rayon pool of `n_jobs` threads
/// (all cores when unset); the search and every forest fit run on it.
#[derive(Debug)]
pub struct RandomForestBackend {
    n_jobs: Option<usize>,
    bootstrap: bool,
    seed: Option<u64>,
    pool: Option<rayon::ThreadPool>,
}

impl Default for RandomForestBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl RandomForestBackend {
    pub fn new() -> Self {
        Self {
            n_jobs: None,
            bootstrap: true,
            seed: Some(42),
            pool: None,
        }
    }

    /// Number of worker threads; `None` uses every core
    pub fn with_n_jobs(mut self, n_jobs: Option<usize>) -> Self {
        self.n_jobs = n_jobs;
        self
    }

    pub fn with_bootstrap(mut self, bootstrap: bool) -> Self {
        self.bootstrap = bootstrap;
        self
    }

    /// Base seed for tree sampling; `None` draws from entropy
    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    pub fn is_acquired(&self) -> bool {
        self.pool.is_some()
    }

    /// Forest for `config` with this backend's sampling settings, unfitted
    pub fn build(&self, config: &Configuration) -> Result<RandomForest> {
        let params = ForestParams::from_config(config)?;

        let mut forest = RandomForest::new(params.ntrees)
            .with_min_samples_leaf(params.min_rows)
            .with_max_features(params.max_features)
            .with_sample_rate(params.sample_rate)
            .with_bootstrap(self.bootstrap);

        if let Some(depth) = params.max_depth {
            forest = forest.with_max_depth(depth);
        }
        if let Some(seed) = self.seed {
            forest = forest.with_random_state(seed);
        }

        Ok(forest)
    }
}

impl ModelBackend for RandomForestBackend {
    type Model = RandomForest;

    fn name(&self) -> &str {
        "random_forest"
    }

    fn validate(&self, config: &Configuration) -> Result<()> {
        ForestParams::from_config(config).map(|_| ())
    }

    fn acquire(&mut self) -> Result<()> {
        if self.pool.is_some() {
            return Ok(());
        }

        let mut builder = rayon::ThreadPoolBuilder::new().thread_name(|i| format!("forest-{}", i));
        if let Some(n) = self.n_jobs {
            builder = builder.num_threads(n);
        }
        let pool = builder
            .build()
            .map_err(|e| TunerError::ThreadPoolError(e.to_string()))?;

        tracing::info!(threads = pool.current_num_threads(), "Random forest backend ready");
        self.pool = Some(pool);
        Ok(())
    }

    fn release(&mut self) {
        self.pool = None;
    }

    fn install<R, OP>(&self, op: OP) -> R
    where
        OP: FnOnce() -> R + Send,
        R: Send,
    {
        match &self.pool {
            Some(pool) => pool.install(op),
            None => op(),
        }
    }

    fn fit(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        config: &Configuration,
        cancel: &CancellationToken,
    ) -> Result<RandomForest> {
        if self.pool.is_none() {
            return Err(TunerError::ConfigError(
                "random forest backend used before acquire".to_string(),
            ));
        }

        let mut forest = self.build(config)?;
        forest.fit_with_cancel(x, y, cancel)?;
        Ok(forest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::backend::BackendSession;
    use ndarray::array;

    #[test]
    fn test_regressor() {
        let x = array![[1.0], [2.0], [3.0], [4.0], [5.0]];
        let y = array![1.0, 2.0, 3.0, 4.0, 5.0];

        let mut rf = RandomForest::new(10).with_random_state(42);
        rf.fit(&x, &y).unwrap();

        let predictions = rf.predict(&x).unwrap();

        let mse: f64 = predictions
            .iter()
            .zip(y.iter())
            .map(|(p, a)| (p - a).powi(2))
            .sum::<f64>()
            / y.len() as f64;

        assert!(mse < 2.0, "MSE too high: {}", mse);
    }

    #[test]
    fn test_seeded_forest_is_deterministic() {
        let x = array![[1.0, 5.0], [2.0, 3.0], [3.0, 8.0], [4.0, 1.0], [5.0, 2.0], [6.0, 7.0]];
        let y = array![2.0, 1.0, 4.0, 3.0, 6.0, 5.0];

        let mut a = RandomForest::new(8).with_random_state(7);
        let mut b = RandomForest::new(8).with_random_state(7);
        a.fit(&x, &y).unwrap();
        b.fit(&x, &y).unwrap();

        assert_eq!(a.predict(&x).unwrap(), b.predict(&x).unwrap());
    }

    #[test]
    fn test_feature_importances() {
        let x = array![[1.0, 0.0], [2.0, 0.0], [3.0, 0.0], [4.0, 0.0]];
        let y = array![1.0, 2.0, 3.0, 4.0];

        let mut rf = RandomForest::new(10)
            .with_max_features(MaxFeatures::All)
            .with_random_state(42);
        rf.fit(&x, &y).unwrap();

        let importances = rf.feature_importances().unwrap();
        assert_eq!(importances.len(), 2);
        assert!(importances[0] >= importances[1]);
    }

    #[test]
    fn test_cancelled_fit_fails() {
        let x = array![[1.0], [2.0], [3.0]];
        let y = array![1.0, 2.0, 3.0];
        let cancel = CancellationToken::new();
        cancel.cancel();

        let mut rf = RandomForest::new(4);
        assert!(matches!(
            rf.fit_with_cancel(&x, &y, &cancel),
            Err(TunerError::Cancelled)
        ));
        assert!(matches!(rf.predict(&x), Err(TunerError::ModelNotFitted)));
    }

    #[test]
    fn test_params_from_config() {
        let config = Configuration::new([("ntrees", 100), ("max_depth", 0), ("min_rows", 2), ("mtries", 3)]);
        let params = ForestParams::from_config(&config).unwrap();
        assert_eq!(params.ntrees, 100);
        assert_eq!(params.max_depth, None);
        assert_eq!(params.min_rows, 2);
        assert_eq!(params.max_features, MaxFeatures::Fixed(3));
    }

    #[test]
    fn test_params_rejected() {
        for (name, value) in [("ntrees", 0), ("max_depth", -1), ("min_rows", 0), ("mtries", 0), ("learn_rate", 1)] {
            let config = Configuration::new([(name, value)]);
            assert!(
                matches!(
                    ForestParams::from_config(&config),
                    Err(TunerError::InvalidParameter { .. })
                ),
                "{} = {} should be rejected",
                name,
                value
            );
        }

        let rate = Configuration::new([("sample_rate", 1.5)]);
        assert!(ForestParams::from_config(&rate).is_err());
    }

    #[test]
    fn test_backend_lifecycle() {
        let x = array![[1.0], [2.0], [3.0], [4.0]];
        let y = array![1.0, 2.0, 3.0, 4.0];
        let config = Configuration::new([("ntrees", 5)]);

        let mut backend = RandomForestBackend::new().with_n_jobs(Some(2));
        assert!(matches!(
            backend.fit(&x, &y, &config, &CancellationToken::new()),
            Err(TunerError::ConfigError(_))
        ));

        {
            let session = BackendSession::acquire(&mut backend).unwrap();
            assert!(session.is_acquired());
            assert_eq!(session.install(rayon::current_num_threads), 2);

            let model = session.fit(&x, &y, &config, &CancellationToken::new()).unwrap();
            assert_eq!(model.n_trees(), 5);
        }

        assert!(!backend.is_acquired());
    }
}
