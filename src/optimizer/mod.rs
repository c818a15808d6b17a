//! Hyperparameter search
//!
//! - Ordered hyperparameter grids and Cartesian enumeration
//! - Cross-validated, parallel grid search with deterministic ranking

mod config;
mod search_space;
pub mod grid_search;

pub use config::GridSearchConfig;
pub use grid_search::{GridSearch, GridSearchResult, ScoreRecord, ScoreStatus};
pub use search_space::{Configuration, GridIter, GridParameter, HyperparameterGrid, ParameterValue};
