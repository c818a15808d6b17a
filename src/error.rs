//! Error types for the envelope tuner

use thiserror::Error;

/// Result type alias for tuner operations
pub type Result<T> = std::result::Result<T, TunerError>;

/// Main error type for the tuner
#[derive(Error, Debug)]
pub enum TunerError {
    #[error("Invalid fold count: k = {k} with {n_samples} samples (need 2 <= k <= n)")]
    InvalidFoldCount { k: usize, n_samples: usize },

    #[error("Training failure: {0}")]
    TrainingFailure(String),

    #[error("Evaluation set is empty, RMSE is undefined")]
    EmptyEvaluationSet,

    #[error("Hyperparameter grid is empty")]
    EmptyGrid,

    #[error("Parameter '{0}' has no candidate values")]
    EmptyParameter(String),

    #[error("Dataset has no rows")]
    EmptyDataset,

    #[error("All {total} configurations failed, no best configuration can be selected")]
    NoScoredConfigurations { total: usize },

    #[error("Training was cancelled")]
    Cancelled,

    #[error("Training timed out after {elapsed_ms} ms")]
    TimedOut { elapsed_ms: u128 },

    #[error("Invalid parameter: {name} = {value}, {reason}")]
    InvalidParameter {
        name: String,
        value: String,
        reason: String,
    },

    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    #[error("Column '{column}' is not {expected}")]
    ColumnTypeMismatch { column: String, expected: String },

    #[error("Unknown category '{value}' in column '{column}'")]
    UnknownCategory { column: String, value: String },

    #[error("Invalid shape: expected {expected}, got {actual}")]
    ShapeError { expected: String, actual: String },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Data error: {0}")]
    DataError(String),

    #[error("Model not fitted")]
    ModelNotFitted,

    #[error("Thread pool error: {0}")]
    ThreadPoolError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl TunerError {
    /// Whether the error is confined to scoring a single configuration.
    ///
    /// The grid search records such configurations as unscored and moves on;
    /// anything else aborts the search.
    pub fn is_configuration_local(&self) -> bool {
        matches!(
            self,
            TunerError::TrainingFailure(_)
                | TunerError::Cancelled
                | TunerError::TimedOut { .. }
                | TunerError::ModelNotFitted
                | TunerError::ShapeError { .. }
        )
    }
}

impl From<polars::error::PolarsError> for TunerError {
    fn from(err: polars::error::PolarsError) -> Self {
        TunerError::DataError(err.to_string())
    }
}

impl From<serde_json::Error> for TunerError {
    fn from(err: serde_json::Error) -> Self {
        TunerError::SerializationError(err.to_string())
    }
}

impl From<ndarray::ShapeError> for TunerError {
    fn from(err: ndarray::ShapeError) -> Self {
        TunerError::ShapeError {
            expected: "valid shape".to_string(),
            actual: err.to_string(),
        }
    }
}
