//! Regression scoring

use super::backend::Predictor;
use crate::error::{Result, TunerError};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// Root-mean-squared error, `sqrt(mean((pred - actual)^2))`.
///
/// Fails with `EmptyEvaluationSet` on zero rows and `ShapeError` when the
/// lengths disagree.
pub fn rmse(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Result<f64> {
    Ok(mse(y_true, y_pred)?.sqrt())
}

/// Mean squared error
pub fn mse(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Result<f64> {
    check_lengths(y_true, y_pred)?;
    let n = y_true.len() as f64;
    Ok(y_true
        .iter()
        .zip(y_pred.iter())
        .map(|(t, p)| (p - t) * (p - t))
        .sum::<f64>()
        / n)
}

/// Predict `x` with `model` and score against `y`
pub fn evaluate<P: Predictor + ?Sized>(model: &P, x: &Array2<f64>, y: &Array1<f64>) -> Result<f64> {
    if x.nrows() == 0 || y.is_empty() {
        return Err(TunerError::EmptyEvaluationSet);
    }
    let predictions = model.predict(x)?;
    rmse(y, &predictions)
}

fn check_lengths(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Result<()> {
    if y_true.is_empty() {
        return Err(TunerError::EmptyEvaluationSet);
    }
    if y_true.len() != y_pred.len() {
        return Err(TunerError::ShapeError {
            expected: format!("{} predictions", y_true.len()),
            actual: format!("{} predictions", y_pred.len()),
        });
    }
    Ok(())
}

/// Regression metrics for a final evaluation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegressionMetrics {
    /// Root Mean Squared Error
    pub rmse: f64,
    /// Mean Squared Error
    pub mse: f64,
    /// Mean Absolute Error
    pub mae: f64,
    /// R-squared; 0 when the target is constant
    pub r2: f64,
    /// Number of evaluated rows
    pub n_samples: usize,
}

impl RegressionMetrics {
    /// Compute regression metrics
    pub fn compute(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Result<Self> {
        check_lengths(y_true, y_pred)?;

        let n = y_true.len() as f64;
        let errors: Vec<f64> = y_true
            .iter()
            .zip(y_pred.iter())
            .map(|(t, p)| t - p)
            .collect();

        let mse: f64 = errors.iter().map(|e| e * e).sum::<f64>() / n;
        let mae: f64 = errors.iter().map(|e| e.abs()).sum::<f64>() / n;

        let y_mean: f64 = y_true.iter().sum::<f64>() / n;
        let ss_tot: f64 = y_true.iter().map(|y| (y - y_mean).powi(2)).sum();
        let ss_res: f64 = errors.iter().map(|e| e.powi(2)).sum();
        let r2 = if ss_tot > 0.0 { 1.0 - ss_res / ss_tot } else { 0.0 };

        Ok(Self {
            rmse: mse.sqrt(),
            mse,
            mae,
            r2,
            n_samples: y_true.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_identical_predictions_score_zero() {
        let y = array![3.5, -1.0, 22.25, 0.0];
        assert_eq!(rmse(&y, &y.clone()).unwrap(), 0.0);
    }

    #[test]
    fn test_rmse_value() {
        let y_true = array![1.0, 2.0, 3.0, 4.0];
        let y_pred = array![2.0, 2.0, 3.0, 2.0];
        // errors 1, 0, 0, 2 -> mse 5/4
        assert!((rmse(&y_true, &y_pred).unwrap() - 1.25f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_empty_and_mismatched() {
        let empty = Array1::<f64>::zeros(0);
        assert!(matches!(rmse(&empty, &empty), Err(TunerError::EmptyEvaluationSet)));
        assert!(matches!(
            rmse(&array![1.0, 2.0], &array![1.0]),
            Err(TunerError::ShapeError { .. })
        ));
    }

    #[test]
    fn test_evaluate_rejects_empty_set() {
        struct Zero;
        impl Predictor for Zero {
            fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
                Ok(Array1::zeros(x.nrows()))
            }
        }

        let x = Array2::<f64>::zeros((0, 3));
        let y = Array1::<f64>::zeros(0);
        assert!(matches!(evaluate(&Zero, &x, &y), Err(TunerError::EmptyEvaluationSet)));

        let x = array![[1.0], [2.0]];
        let y = array![3.0, 4.0];
        assert!((evaluate(&Zero, &x, &y).unwrap() - 12.5f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_regression_metrics() {
        let y_true = array![1.0, 2.0, 3.0, 4.0, 5.0];
        let y_pred = array![1.1, 2.0, 2.9, 4.1, 5.0];

        let metrics = RegressionMetrics::compute(&y_true, &y_pred).unwrap();

        assert!((metrics.rmse - metrics.mse.sqrt()).abs() < 1e-12);
        assert!(metrics.mae > 0.0);
        assert!(metrics.r2 > 0.9);
        assert_eq!(metrics.n_samples, 5);
    }
}
