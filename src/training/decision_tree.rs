//! Regression tree (CART, squared-error criterion)

use super::backend::CancellationToken;
use crate::error::{Result, TunerError};
use ndarray::{Array1, Array2, ArrayView1};
use rand::seq::index::sample;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Decision tree node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TreeNode {
    /// Leaf node with prediction value
    Leaf {
        value: f64,
        n_samples: usize,
    },
    /// Internal node with split
    Split {
        feature_idx: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
        n_samples: usize,
        gain: f64,
    },
}

/// Regression tree model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    /// Tree root
    root: Option<TreeNode>,
    /// Maximum depth
    pub max_depth: Option<usize>,
    /// Minimum samples to split
    pub min_samples_split: usize,
    /// Minimum samples in leaf
    pub min_samples_leaf: usize,
    /// Features sampled as split candidates at each node (None = all)
    pub max_features: Option<usize>,
    /// Seed for per-node feature sampling
    pub random_state: Option<u64>,
    /// Number of features
    n_features: usize,
    /// Feature importances
    feature_importances: Option<Array1<f64>>,
}

impl Default for DecisionTree {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-fit mutable state threaded through the recursion
struct BuildContext<'a> {
    rng: ChaCha8Rng,
    importances: Vec<f64>,
    cancel: &'a CancellationToken,
}

impl DecisionTree {
    /// Create a new regressor tree
    pub fn new() -> Self {
        Self {
            root: None,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            random_state: None,
            n_features: 0,
            feature_importances: None,
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

    /// Set the number of candidate features per split
    pub fn with_max_features(mut self, max_features: usize) -> Self {
        self.max_features = Some(max_features);
        self
    }

    /// Set random state
    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    /// Fit the tree to training data
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        self.fit_with_cancel(x, y, &CancellationToken::new())
    }

    /// Fit, polling `cancel` before every node expansion
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

        if n_samples == 0 || n_features == 0 {
            return Err(TunerError::TrainingFailure(format!(
                "cannot fit a tree on a {}x{} matrix",
                n_samples, n_features
            )));
        }

        if y.iter().any(|v| !v.is_finite()) {
            return Err(TunerError::TrainingFailure(
                "target contains non-finite values".to_string(),
            ));
        }

        self.n_features = n_features;

        let mut ctx = BuildContext {
            rng: ChaCha8Rng::seed_from_u64(self.random_state.unwrap_or(0)),
            importances: vec![0.0; n_features],
            cancel,
        };

        let indices: Vec<usize> = (0..n_samples).collect();
        let root = self.build_tree(x, y, &indices, 0, &mut ctx)?;
        self.root = Some(root);

        // Normalize feature importances
        let mut importances = ctx.importances;
        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            for imp in &mut importances {
                *imp /= total;
            }
        }
        self.feature_importances = Some(Array1::from_vec(importances));

        Ok(self)
    }

    fn build_tree(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        indices: &[usize],
        depth: usize,
        ctx: &mut BuildContext<'_>,
    ) -> Result<TreeNode> {
        ctx.cancel.check()?;

        let n_samples = indices.len();
        let y_subset: Vec<f64> = indices.iter().map(|&i| y[i]).collect();
        let leaf_value = mean(&y_subset);

        // Check stopping conditions
        let should_stop = n_samples < self.min_samples_split
            || n_samples < 2 * self.min_samples_leaf
            || self.max_depth.map_or(false, |d| depth >= d)
            || is_constant(&y_subset);

        if should_stop {
            return Ok(TreeNode::Leaf {
                value: leaf_value,
                n_samples,
            });
        }

        let candidates = self.candidate_features(x.ncols(), &mut ctx.rng);

        let Some((feature_idx, threshold, gain)) = self.find_best_split(x, y, indices, &candidates) else {
            return Ok(TreeNode::Leaf {
                value: leaf_value,
                n_samples,
            });
        };

        let (left_indices, right_indices): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .partition(|&&i| x[[i, feature_idx]] <= threshold);

        ctx.importances[feature_idx] += n_samples as f64 * gain;

        let left = Box::new(self.build_tree(x, y, &left_indices, depth + 1, ctx)?);
        let right = Box::new(self.build_tree(x, y, &right_indices, depth + 1, ctx)?);

        Ok(TreeNode::Split {
            feature_idx,
            threshold,
            left,
            right,
            n_samples,
            gain,
        })
    }

    fn candidate_features(&self, n_features: usize, rng: &mut ChaCha8Rng) -> Vec<usize> {
        match self.max_features {
            Some(m) if m < n_features => {
                let mut picked = sample(rng, n_features, m.max(1)).into_vec();
                picked.sort_unstable();
                picked
            }
            _ => (0..n_features).collect(),
        }
    }

    /// Best (feature, threshold, variance reduction) over `features`.
    ///
    /// Each feature is scanned once in sorted order with running sums, so a
    /// node costs O(f * n log n).
    fn find_best_split(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        indices: &[usize],
        features: &[usize],
    ) -> Option<(usize, f64, f64)> {
        let n = indices.len();
        if n < 2 {
            return None;
        }
        let total_sum: f64 = indices.iter().map(|&i| y[i]).sum();
        let total_sq: f64 = indices.iter().map(|&i| y[i] * y[i]).sum();
        let parent_impurity = variance(n, total_sum, total_sq);

        let mut best: Option<(usize, f64, f64)> = None;

        for &feature_idx in features {
            let mut order: Vec<(f64, f64)> = indices.iter().map(|&i| (x[[i, feature_idx]], y[i])).collect();
            order.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

            let mut left_sum = 0.0;
            let mut left_sq = 0.0;

            for pos in 0..n - 1 {
                let (xv, yv) = order[pos];
                left_sum += yv;
                left_sq += yv * yv;

                let left_count = pos + 1;
                let right_count = n - left_count;

                // Only split between distinct values
                if order[pos + 1].0 <= xv {
                    continue;
                }
                if left_count < self.min_samples_leaf || right_count < self.min_samples_leaf {
                    continue;
                }

                let left_impurity = variance(left_count, left_sum, left_sq);
                let right_impurity = variance(right_count, total_sum - left_sum, total_sq - left_sq);
                let weighted =
                    (left_count as f64 * left_impurity + right_count as f64 * right_impurity) / n as f64;
                let gain = parent_impurity - weighted;

                if gain > 1e-12 && best.map_or(true, |(_, _, g)| gain > g) {
                    best = Some((feature_idx, (xv + order[pos + 1].0) / 2.0, gain));
                }
            }
        }

        best
    }

    /// Make predictions
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let root = self.root.as_ref().ok_or(TunerError::ModelNotFitted)?;

        if x.ncols() != self.n_features {
            return Err(TunerError::ShapeError {
                expected: format!("{} features", self.n_features),
                actual: format!("{} features", x.ncols()),
            });
        }

        Ok(x.rows().into_iter().map(|row| predict_sample(root, &row)).collect())
    }

    /// Get feature importances
    pub fn feature_importances(&self) -> Option<&Array1<f64>> {
        self.feature_importances.as_ref()
    }

    /// Get tree depth
    pub fn get_depth(&self) -> usize {
        self.root.as_ref().map_or(0, node_depth)
    }

    /// Get number of leaves
    pub fn get_n_leaves(&self) -> usize {
        self.root.as_ref().map_or(0, count_leaves)
    }
}

fn predict_sample(node: &TreeNode, sample: &ArrayView1<f64>) -> f64 {
    let mut node = node;
    loop {
        match node {
            TreeNode::Leaf { value, .. } => return *value,
            TreeNode::Split { feature_idx, threshold, left, right, .. } => {
                node = if sample[*feature_idx] <= *threshold { left } else { right };
            }
        }
    }
}

fn node_depth(node: &TreeNode) -> usize {
    match node {
        TreeNode::Leaf { .. } => 1,
        TreeNode::Split { left, right, .. } => 1 + node_depth(left).max(node_depth(right)),
    }
}

fn count_leaves(node: &TreeNode) -> usize {
    match node {
        TreeNode::Leaf { .. } => 1,
        TreeNode::Split { left, right, .. } => count_leaves(left) + count_leaves(right),
    }
}

fn mean(y: &[f64]) -> f64 {
    if y.is_empty() {
        return 0.0;
    }
    y.iter().sum::<f64>() / y.len() as f64
}

// Var = E[X²] - E[X]²
fn variance(count: usize, sum: f64, sq_sum: f64) -> f64 {
    if count == 0 {
        return 0.0;
    }
    let n = count as f64;
    (sq_sum / n - (sum / n).powi(2)).max(0.0)
}

fn is_constant(y: &[f64]) -> bool {
    match y.first() {
        None => true,
        Some(&first) => y.iter().all(|&v| (v - first).abs() < 1e-10),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_regressor_simple() {
        let x = array![[1.0], [2.0], [3.0], [4.0], [5.0]];
        let y = array![1.0, 2.0, 3.0, 4.0, 5.0];

        let mut tree = DecisionTree::new();
        tree.fit(&x, &y).unwrap();

        let predictions = tree.predict(&x).unwrap();
        assert_eq!(predictions, y);
    }

    #[test]
    fn test_max_depth() {
        let x = array![[1.0, 1.0], [2.0, 2.0], [3.0, 3.0], [4.0, 4.0]];
        let y = array![0.0, 1.0, 2.0, 3.0];

        let mut tree = DecisionTree::new().with_max_depth(1);
        tree.fit(&x, &y).unwrap();

        // One split: root plus a level of leaves
        assert!(tree.get_depth() <= 2);
        assert_eq!(tree.get_n_leaves(), 2);
    }

    #[test]
    fn test_min_samples_leaf() {
        let x = array![[1.0], [2.0], [3.0], [4.0]];
        let y = array![0.0, 1.0, 2.0, 3.0];

        let mut tree = DecisionTree::new().with_min_samples_leaf(2);
        tree.fit(&x, &y).unwrap();

        let predictions = tree.predict(&x).unwrap();
        assert_eq!(predictions, array![0.5, 0.5, 2.5, 2.5]);
    }

    #[test]
    fn test_feature_importances() {
        let x = array![[1.0, 0.0], [2.0, 0.0], [3.0, 0.0], [4.0, 0.0]];
        let y = array![0.0, 0.0, 1.0, 1.0];

        let mut tree = DecisionTree::new();
        tree.fit(&x, &y).unwrap();

        let importances = tree.feature_importances().unwrap();
        assert_eq!(importances[0], 1.0);
        assert_eq!(importances[1], 0.0);
    }

    #[test]
    fn test_predict_before_fit() {
        let tree = DecisionTree::new();
        assert!(matches!(
            tree.predict(&array![[1.0]]),
            Err(TunerError::ModelNotFitted)
        ));
    }

    #[test]
    fn test_cancelled_fit() {
        let token = CancellationToken::new();
        token.cancel();

        let mut tree = DecisionTree::new();
        let result = tree.fit_with_cancel(&array![[1.0], [2.0]], &array![1.0, 2.0], &token);
        assert!(matches!(result, Err(TunerError::Cancelled)));
    }

    #[test]
    fn test_non_finite_target_rejected() {
        let mut tree = DecisionTree::new();
        let result = tree.fit(&array![[1.0], [2.0]], &array![1.0, f64::NAN]);
        assert!(matches!(result, Err(TunerError::TrainingFailure(_))));
    }
}
