//! Least-squares gradient boosting with row subsampling.
//!
//! 1. Start from the mean target.
//! 2. Each stage fits a shallow tree to the current residuals on a random
//!    `subsample` share of rows (drawn without replacement).
//! 3. Predictions move by `learning_rate` times the tree output.

use super::tree::{RegressionTree, TreeParams};
use crate::error::{DelayError, Result};
use ndarray::{Array1, ArrayView1, ArrayView2};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoostingParams {
    pub n_stages: usize,
    pub learning_rate: f64,
    pub subsample: f64,
    pub tree: TreeParams,
    pub seed: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoosting {
    params: BoostingParams,
    init: f64,
    stages: Vec<RegressionTree>,
    n_features: usize,
}

impl GradientBoosting {
    pub fn fit(x: ArrayView2<f64>, y: ArrayView1<f64>, params: BoostingParams) -> Result<Self> {
        let n = x.nrows();
        if n != y.len() {
            return Err(DelayError::model("number of rows in x and y must match"));
        }
        if n == 0 {
            return Err(DelayError::model("cannot boost with zero rows"));
        }
        if !(params.subsample > 0.0 && params.subsample <= 1.0) {
            return Err(DelayError::model(format!("subsample must be in (0, 1], got {}", params.subsample)));
        }

        let init = y.mean().unwrap_or(0.0);
        let mut pred = Array1::from_elem(n, init);
        let mut rng = StdRng::seed_from_u64(params.seed);
        let n_sub = ((params.subsample * n as f64) as usize).max(1);
        let mut order: Vec<usize> = (0..n).collect();
        let mut stages = Vec::with_capacity(params.n_stages);

        for stage in 0..params.n_stages {
            let residual = &y - &pred;
            order.shuffle(&mut rng);
            let sample = order[..n_sub].to_vec();
            let tree = RegressionTree::fit_sample(x, residual.view(), sample, params.tree, &mut rng);
            for (i, p) in pred.iter_mut().enumerate() {
                *p += params.learning_rate * tree.predict_row(x.row(i));
            }
            stages.push(tree);
            if stage % 25 == 0 {
                debug!(stage, "Boosting stage fitted");
            }
        }

        Ok(Self { params, init, stages, n_features: x.ncols() })
    }

    pub fn n_stages(&self) -> usize {
        self.stages.len()
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn predict_row(&self, row: ArrayView1<f64>) -> f64 {
        self.init
            + self.params.learning_rate * self.stages.iter().map(|t| t.predict_row(row)).sum::<f64>()
    }

    pub fn predict(&self, x: ArrayView2<f64>) -> Array1<f64> {
        x.rows().into_iter().map(|row| self.predict_row(row)).collect()
    }

    pub fn feature_importances(&self) -> Vec<f64> {
        let mut total = vec![0.0; self.n_features];
        for tree in &self.stages {
            for (acc, v) in total.iter_mut().zip(tree.feature_importances()) {
                *acc += v;
            }
        }
        let sum: f64 = total.iter().sum();
        if sum > 0.0 {
            total.iter().map(|v| v / sum).collect()
        } else {
            total
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tree::SplitStrategy;
    use ndarray::Array2;

    fn params(n_stages: usize) -> BoostingParams {
        BoostingParams {
            n_stages,
            learning_rate: 0.1,
            subsample: 0.8,
            tree: TreeParams { max_depth: 3, min_samples_split: 4, min_samples_leaf: 2, strategy: SplitStrategy::Best },
            seed: 42,
        }
    }

    fn data() -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((100, 2), |(i, j)| if j == 0 { i as f64 / 100.0 } else { (i % 3) as f64 });
        let y = x.column(0).mapv(|v| 0.1 + 0.5 * v);
        (x, y)
    }

    #[test]
    fn test_more_stages_reduce_training_error() {
        let (x, y) = data();
        let mae = |m: &GradientBoosting| (&m.predict(x.view()) - &y).mapv(f64::abs).mean().unwrap();
        let few = GradientBoosting::fit(x.view(), y.view(), params(5)).unwrap();
        let many = GradientBoosting::fit(x.view(), y.view(), params(80)).unwrap();
        assert_eq!(many.n_stages(), 80);
        assert!(mae(&many) < mae(&few));
        assert!(mae(&many) < 0.02);
    }

    #[test]
    fn test_zero_stages_predicts_mean() {
        let (x, y) = data();
        let gb = GradientBoosting::fit(x.view(), y.view(), params(0)).unwrap();
        let mean = y.mean().unwrap();
        assert!((gb.predict_row(x.row(3)) - mean).abs() < 1e-12);
    }

    #[test]
    fn test_rejects_bad_subsample() {
        let (x, y) = data();
        let mut p = params(3);
        p.subsample = 0.0;
        assert!(GradientBoosting::fit(x.view(), y.view(), p).is_err());
    }
}
