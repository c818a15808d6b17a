//! Model training module
//!
//! Everything the grid search needs to fit and score a model:
//! - K-fold assignment for cross-validation
//! - The `ModelBackend` seam, cancellation and backend lifecycle
//! - Regression trees and random forests (reference backend)
//! - Ridge / ordinary least squares (second backend)
//! - RMSE and related regression metrics

pub mod backend;
pub mod cross_validation;
pub mod decision_tree;
pub mod linear_models;
pub mod metrics;
pub mod random_forest;

pub use backend::{BackendSession, CancellationToken, ModelBackend, Predictor};
pub use cross_validation::{CVResults, CVSplit, FoldAssignment, KFold};
pub use decision_tree::{DecisionTree, TreeNode};
pub use linear_models::{RidgeBackend, RidgeRegression};
pub use metrics::{evaluate, rmse, RegressionMetrics};
pub use random_forest::{ForestParams, MaxFeatures, RandomForest, RandomForestBackend};
