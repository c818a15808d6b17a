//! Ridge regression and its grid-search backend

use super::backend::{CancellationToken, ModelBackend, Predictor};
use crate::error::{Result, TunerError};
use crate::optimizer::{Configuration, ParameterValue};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

/// Solve symmetric positive-definite system Ax = b using Cholesky decomposition.
/// Retries once with a small diagonal ridge if the matrix is near-singular.
fn cholesky_solve(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    let n = a.nrows();
    if n != a.ncols() || n != b.len() {
        return None;
    }

    cholesky_factor(a)
        .or_else(|| {
            let mut a_reg = a.clone();
            let ridge = 1e-8 * a.diag().iter().map(|v| v.abs()).sum::<f64>() / n.max(1) as f64;
            for k in 0..n {
                a_reg[[k, k]] += ridge.max(f64::EPSILON);
            }
            cholesky_factor(&a_reg)
        })
        .map(|l| substitute(&l, b))
}

/// Lower-triangular L with A = L * L^T, or `None` when A is not positive definite
fn cholesky_factor(a: &Array2<f64>) -> Option<Array2<f64>> {
    let n = a.nrows();
    let mut l = Array2::zeros((n, n));

    for i in 0..n {
        for j in 0..=i {
            let mut sum = 0.0;
            for k in 0..j {
                sum += l[[i, k]] * l[[j, k]];
            }

            if i == j {
                let diag = a[[i, i]] - sum;
                if diag <= 0.0 {
                    return None;
                }
                l[[i, j]] = diag.sqrt();
            } else {
                l[[i, j]] = (a[[i, j]] - sum) / l[[j, j]];
            }
        }
    }

    Some(l)
}

fn substitute(l: &Array2<f64>, b: &Array1<f64>) -> Array1<f64> {
    let n = l.nrows();

    // Forward substitution: L * y = b
    let mut y = Array1::zeros(n);
    for i in 0..n {
        let mut sum = 0.0;
        for j in 0..i {
            sum += l[[i, j]] * y[j];
        }
        y[i] = (b[i] - sum) / l[[i, i]];
    }

    // Backward substitution: L^T * x = y
    let mut x = Array1::zeros(n);
    for i in (0..n).rev() {
        let mut sum = 0.0;
        for j in (i + 1)..n {
            sum += l[[j, i]] * x[j];
        }
        x[i] = (y[i] - sum) / l[[i, i]];
    }

    x
}

/// Ridge Regression (L2-regularized linear regression)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RidgeRegression {
    pub coefficients: Option<Array1<f64>>,
    pub intercept: Option<f64>,
    pub fit_intercept: bool,
    /// L2 regularization strength; 0 is ordinary least squares
    pub alpha: f64,
    pub is_fitted: bool,
}

impl Default for RidgeRegression {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl RidgeRegression {
    pub fn new(alpha: f64) -> Self {
        Self {
            coefficients: None,
            intercept: None,
            fit_intercept: true,
            alpha,
            is_fitted: false,
        }
    }

    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn with_fit_intercept(mut self, fit_intercept: bool) -> Self {
        self.fit_intercept = fit_intercept;
        self
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
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
                "cannot fit ridge regression on zero rows".to_string(),
            ));
        }

        let (x_c, y_c, means) = match (x.mean_axis(Axis(0)), y.mean()) {
            (Some(xm), Some(ym)) if self.fit_intercept => {
                (x - &xm.view().insert_axis(Axis(0)), y - ym, Some((xm, ym)))
            }
            _ => (x.clone(), y.clone(), None),
        };

        let mut xtx = x_c.t().dot(&x_c);
        for i in 0..n_features {
            xtx[[i, i]] += self.alpha;
        }
        let xty = x_c.t().dot(&y_c);

        let coefficients = cholesky_solve(&xtx, &xty)
            .filter(|c| c.iter().all(|v| v.is_finite()))
            .ok_or_else(|| TunerError::TrainingFailure("singular normal equations".to_string()))?;

        self.intercept = Some(match means {
            Some((xm, ym)) => ym - coefficients.dot(&xm),
            None => 0.0,
        });
        self.coefficients = Some(coefficients);
        self.is_fitted = true;
        Ok(self)
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let coefficients = match (&self.coefficients, self.is_fitted) {
            (Some(c), true) => c,
            _ => return Err(TunerError::ModelNotFitted),
        };
        if x.ncols() != coefficients.len() {
            return Err(TunerError::ShapeError {
                expected: format!("{} features", coefficients.len()),
                actual: format!("{} features", x.ncols()),
            });
        }
        Ok(x.dot(coefficients) + self.intercept.unwrap_or(0.0))
    }

    /// Coefficient of determination on `(x, y)`
    pub fn score(&self, x: &Array2<f64>, y: &Array1<f64>) -> Result<f64> {
        let p = self.predict(x)?;
        let ym = y.mean().unwrap_or(0.0);
        let ss_res = (&p - y).mapv(|v| v * v).sum();
        let ss_tot = y.mapv(|v| (v - ym).powi(2)).sum();
        Ok(if ss_tot == 0.0 { 1.0 } else { 1.0 - ss_res / ss_tot })
    }
}

impl Predictor for RidgeRegression {
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        RidgeRegression::predict(self, x)
    }
}

/// Grid-search backend training [`RidgeRegression`] models.
///
/// Reads one parameter, `lambda` (>= 0, default 0).
#[derive(Debug, Clone, Default)]
pub struct RidgeBackend {
    fit_intercept: bool,
}

impl RidgeBackend {
    pub fn new() -> Self {
        Self { fit_intercept: true }
    }

    pub fn with_fit_intercept(mut self, fit_intercept: bool) -> Self {
        self.fit_intercept = fit_intercept;
        self
    }

    fn lambda(config: &Configuration) -> Result<f64> {
        if let Some(unknown) = config.names().find(|&n| n != "lambda") {
            return Err(TunerError::InvalidParameter {
                name: unknown.to_string(),
                value: config.get(unknown).map(ParameterValue::to_string).unwrap_or_default(),
                reason: "not a ridge parameter".to_string(),
            });
        }

        let lambda = config.float("lambda")?.unwrap_or(0.0);
        if !(lambda >= 0.0 && lambda.is_finite()) {
            return Err(TunerError::InvalidParameter {
                name: "lambda".to_string(),
                value: lambda.to_string(),
                reason: "must be a finite value >= 0".to_string(),
            });
        }
        Ok(lambda)
    }
}

impl ModelBackend for RidgeBackend {
    type Model = RidgeRegression;

    fn name(&self) -> &str {
        "ridge"
    }

    fn validate(&self, config: &Configuration) -> Result<()> {
        Self::lambda(config).map(|_| ())
    }

    fn fit(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        config: &Configuration,
        cancel: &CancellationToken,
    ) -> Result<RidgeRegression> {
        cancel.check()?;
        let mut model = RidgeRegression::new(Self::lambda(config)?).with_fit_intercept(self.fit_intercept);
        model.fit(x, y)?;
        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_least_squares_recovers_plane() {
        // y = 2*x1 + 3*x2 + 1
        let x = array![[1.0, 1.0], [2.0, 1.0], [1.0, 2.0], [2.0, 2.0], [3.0, 1.0]];
        let y = array![6.0, 8.0, 9.0, 11.0, 10.0];

        let mut model = RidgeRegression::new(0.0);
        model.fit(&x, &y).unwrap();

        let coefficients = model.coefficients.as_ref().unwrap();
        assert!((coefficients[0] - 2.0).abs() < 1e-8);
        assert!((coefficients[1] - 3.0).abs() < 1e-8);
        assert!((model.intercept.unwrap() - 1.0).abs() < 1e-8);

        let r2 = model.score(&x, &y).unwrap();
        assert!(r2 > 0.99, "R² should be close to 1, got {}", r2);
    }

    #[test]
    fn test_ridge_shrinks_coefficients() {
        let x = array![[1.0], [2.0], [3.0], [4.0]];
        let y = array![2.0, 4.0, 6.0, 8.0];

        let mut ols = RidgeRegression::new(0.0);
        let mut ridge = RidgeRegression::new(10.0);
        ols.fit(&x, &y).unwrap();
        ridge.fit(&x, &y).unwrap();

        let a = ols.coefficients.as_ref().unwrap()[0];
        let b = ridge.coefficients.as_ref().unwrap()[0];
        assert!(b.abs() < a.abs());
    }

    #[test]
    fn test_collinear_features_still_solve() {
        let x = array![[1.0, 1.0], [2.0, 2.0], [3.0, 3.0]];
        let y = array![2.0, 4.0, 6.0];

        let mut model = RidgeRegression::new(0.1);
        model.fit(&x, &y).unwrap();
        assert_eq!(model.predict(&x).unwrap().len(), 3);
    }

    #[test]
    fn test_predict_before_fit() {
        let model = RidgeRegression::default();
        assert!(matches!(
            model.predict(&array![[1.0]]),
            Err(TunerError::ModelNotFitted)
        ));
    }

    #[test]
    fn test_backend_parameters() {
        let backend = RidgeBackend::new();
        assert!(backend.validate(&Configuration::new([("lambda", 0.5)])).is_ok());
        assert!(matches!(
            backend.validate(&Configuration::new([("lambda", -1.0)])),
            Err(TunerError::InvalidParameter { .. })
        ));
        assert!(matches!(
            backend.validate(&Configuration::new([("ntrees", 5)])),
            Err(TunerError::InvalidParameter { .. })
        ));
    }
}
