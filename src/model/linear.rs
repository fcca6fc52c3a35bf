//! L2-regularised linear regression solved with `linfa-linear`.
//!
//! The penalty is folded into an ordinary least-squares problem: the centred
//! design matrix is stacked on `sqrt(alpha) * I` with zero targets, so the
//! unpenalised solver returns the ridge coefficients. The intercept is
//! recovered from the column means and is not penalised.

use crate::error::{DelayError, Result};
use linfa::prelude::*;
use linfa_linear::LinearRegression;
use ndarray::{concatenate, Array1, Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RidgeRegression {
    alpha: f64,
    coefficients: Array1<f64>,
    intercept: f64,
}

impl RidgeRegression {
    pub fn fit(x: ArrayView2<f64>, y: ArrayView1<f64>, alpha: f64) -> Result<Self> {
        let (n, p) = x.dim();
        if n != y.len() {
            return Err(DelayError::model("number of rows in x and y must match"));
        }
        if n == 0 {
            return Err(DelayError::model("cannot fit ridge regression with zero rows"));
        }
        if alpha <= 0.0 {
            return Err(DelayError::model(format!("ridge alpha must be positive, got {alpha}")));
        }

        let x_mean = x.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(p));
        let y_mean = y.mean().unwrap_or(0.0);
        let x_centered = &x - &x_mean;
        let y_centered = &y - y_mean;

        let penalty = Array2::<f64>::eye(p) * alpha.sqrt();
        let x_aug = concatenate(Axis(0), &[x_centered.view(), penalty.view()])
            .map_err(|e| DelayError::model(e.to_string()))?;
        let y_aug = concatenate(Axis(0), &[y_centered.view(), Array1::<f64>::zeros(p).view()])
            .map_err(|e| DelayError::model(e.to_string()))?;

        let ds = Dataset::new(x_aug, y_aug);
        let fitted = LinearRegression::new()
            .with_intercept(false)
            .fit(&ds)
            .map_err(|e| DelayError::model(format!("least-squares solve failed: {e}")))?;
        let coefficients = fitted.params().to_owned();
        let intercept = y_mean - x_mean.dot(&coefficients);

        Ok(Self { alpha, coefficients, intercept })
    }

    pub fn coefficients(&self) -> &Array1<f64> {
        &self.coefficients
    }

    pub fn intercept(&self) -> f64 {
        self.intercept
    }

    pub fn n_features(&self) -> usize {
        self.coefficients.len()
    }

    pub fn predict_row(&self, row: ArrayView1<f64>) -> f64 {
        row.dot(&self.coefficients) + self.intercept
    }

    pub fn predict(&self, x: ArrayView2<f64>) -> Array1<f64> {
        x.dot(&self.coefficients) + self.intercept
    }

    /// Absolute coefficients normalised to sum to 1.
    pub fn feature_importances(&self) -> Vec<f64> {
        let abs: Vec<f64> = self.coefficients.iter().map(|c| c.abs()).collect();
        let total: f64 = abs.iter().sum();
        if total > 0.0 {
            abs.iter().map(|v| v / total).collect()
        } else {
            abs
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_small_alpha_recovers_linear_relation() {
        let x = Array2::from_shape_fn((50, 2), |(i, j)| if j == 0 { i as f64 } else { (i % 5) as f64 });
        let y = x.column(0).mapv(|v| 0.1 + 0.01 * v) + x.column(1).mapv(|v| 0.02 * v);
        let model = RidgeRegression::fit(x.view(), y.view(), 1e-6).unwrap();
        assert!((model.coefficients()[0] - 0.01).abs() < 1e-4);
        assert!((model.coefficients()[1] - 0.02).abs() < 1e-4);
        assert!((model.intercept() - 0.1).abs() < 1e-3);
        assert!((model.predict_row(array![10.0, 2.0].view()) - 0.24).abs() < 1e-3);
    }

    #[test]
    fn test_penalty_shrinks_coefficients() {
        let x = array![[0.0], [1.0], [2.0], [3.0]];
        let y = array![0.0, 1.0, 2.0, 3.0];
        let weak = RidgeRegression::fit(x.view(), y.view(), 1e-6).unwrap();
        let strong = RidgeRegression::fit(x.view(), y.view(), 5.0).unwrap();
        // centred sum of squares is 5, so the ridge slope is 5 / (5 + alpha)
        assert!((strong.coefficients()[0] - 0.5).abs() < 1e-6);
        assert!(strong.coefficients()[0].abs() < weak.coefficients()[0].abs());
        // intercept is not penalised: the fit passes through the means
        assert!((strong.predict_row(array![1.5].view()) - 1.5).abs() < 1e-6);
    }

    #[test]
    fn test_importances_are_normalised_magnitudes() {
        let x = Array2::from_shape_fn((30, 2), |(i, j)| if j == 0 { i as f64 } else { ((i * 7) % 11) as f64 });
        let y = x.column(0).mapv(|v| -2.0 * v);
        let model = RidgeRegression::fit(x.view(), y.view(), 1.0).unwrap();
        let imp = model.feature_importances();
        assert!((imp.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert!(imp[0] > imp[1]);
        assert_eq!(model.predict(x.view()).len(), 30);
    }

    #[test]
    fn test_rejects_non_positive_alpha() {
        let x = array![[1.0], [2.0]];
        let y = array![1.0, 2.0];
        assert!(RidgeRegression::fit(x.view(), y.view(), 0.0).is_err());
    }
}
