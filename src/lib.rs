//! Envelope tuner - cross-validated hyperparameter search for building
//! energy-load regression
//!
//! Given a tabular dataset of building envelope parameters, the crate splits
//! it into train and test sets, grid-searches a model backend's
//! hyperparameters with k-fold cross-validation for every target load,
//! retrains the best configuration on the full training split and reports
//! its RMSE on the held-out test split.
//!
//! # Modules
//!
//! - [`data`] - Typed datasets, schemas, feature encoding, train/test split
//! - [`training`] - Fold generation, model backends, trees, forests, ridge, metrics
//! - [`optimizer`] - Hyperparameter grids and the grid search engine
//! - [`pipeline`] - End-to-end tuning across targets
//! - [`report`] - Results table and run reports
//! - [`cli`] - Command-line interface

// Core error handling
pub mod error;

// Core modules
pub mod data;
pub mod training;
pub mod optimizer;
pub mod pipeline;
pub mod report;

// Services
pub mod cli;

pub use error::{Result, TunerError};

/// Re-export commonly used types
pub mod prelude {
    // Error handling
    pub use crate::error::{Result, TunerError};

    // Data
    pub use crate::data::{energy_efficiency_schema, train_test_split, Column, Dataset, FeatureEncoder, Schema};

    // Training
    pub use crate::training::{
        BackendSession, CancellationToken, KFold, ModelBackend, Predictor, RandomForestBackend, RidgeBackend,
    };

    // Optimization
    pub use crate::optimizer::{
        Configuration, GridSearch, GridSearchConfig, GridSearchResult, HyperparameterGrid, ParameterValue, ScoreRecord,
    };

    // Pipeline and reporting
    pub use crate::pipeline::{TargetSpec, TuningConfig, TuningPipeline};
    pub use crate::report::{ResultsTable, RunReport};
}
