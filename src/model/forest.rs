//! Averaged tree ensembles: random forest (bootstrap, best splits) and
//! extra trees (whole sample, random splits). Trees are fitted in parallel,
//! each from its own seed, so results do not depend on thread scheduling.

use super::tree::{RegressionTree, TreeParams};
use crate::error::{DelayError, Result};
use ndarray::{Array1, ArrayView1, ArrayView2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForestParams {
    pub n_trees: usize,
    pub tree: TreeParams,
    /// Draw each tree's rows with replacement.
    pub bootstrap: bool,
    pub seed: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeEnsemble {
    params: ForestParams,
    trees: Vec<RegressionTree>,
}

impl TreeEnsemble {
    pub fn fit(x: ArrayView2<f64>, y: ArrayView1<f64>, params: ForestParams) -> Result<Self> {
        let n = x.nrows();
        if n != y.len() {
            return Err(DelayError::model("number of rows in x and y must match"));
        }
        if n == 0 || params.n_trees == 0 {
            return Err(DelayError::model("ensemble needs rows and at least one tree"));
        }

        let trees: Vec<RegressionTree> = (0..params.n_trees)
            .into_par_iter()
            .map(|t| {
                let mut rng = StdRng::seed_from_u64(params.seed.wrapping_add(t as u64));
                let sample: Vec<usize> = if params.bootstrap {
                    (0..n).map(|_| rng.random_range(0..n)).collect()
                } else {
                    (0..n).collect()
                };
                RegressionTree::fit_sample(x, y, sample, params.tree, &mut rng)
            })
            .collect();
        debug!(trees = trees.len(), bootstrap = params.bootstrap, "Fitted tree ensemble");

        Ok(Self { params, trees })
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn n_features(&self) -> usize {
        self.trees.first().map_or(0, RegressionTree::n_features)
    }

    pub fn predict_row(&self, row: ArrayView1<f64>) -> f64 {
        self.trees.iter().map(|t| t.predict_row(row)).sum::<f64>() / self.trees.len() as f64
    }

    pub fn predict(&self, x: ArrayView2<f64>) -> Array1<f64> {
        let preds: Vec<f64> = (0..x.nrows()).into_par_iter().map(|i| self.predict_row(x.row(i))).collect();
        Array1::from(preds)
    }

    /// Mean of the per-tree normalised importances.
    pub fn feature_importances(&self) -> Vec<f64> {
        let mut total = vec![0.0; self.n_features()];
        for tree in &self.trees {
            for (acc, v) in total.iter_mut().zip(tree.feature_importances()) {
                *acc += v;
            }
        }
        let n = self.trees.len() as f64;
        total.iter().map(|v| v / n).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tree::SplitStrategy;
    use ndarray::Array2;

    fn data() -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((120, 3), |(i, j)| match j {
            0 => (i % 12) as f64,
            1 => ((i * 7) % 13) as f64,
            _ => (i / 12) as f64,
        });
        let y = x.column(0).mapv(|m| if (5.0..=7.0).contains(&m) { 0.35 } else { 0.15 });
        (x, y)
    }

    fn params(bootstrap: bool, strategy: SplitStrategy) -> ForestParams {
        ForestParams {
            n_trees: 20,
            tree: TreeParams { max_depth: 6, min_samples_split: 4, min_samples_leaf: 2, strategy },
            bootstrap,
            seed: 42,
        }
    }

    #[test]
    fn test_forest_fits_seasonal_signal() {
        let (x, y) = data();
        let rf = TreeEnsemble::fit(x.view(), y.view(), params(true, SplitStrategy::Best)).unwrap();
        assert_eq!(rf.n_trees(), 20);
        let pred = rf.predict(x.view());
        let mae = (&pred - &y).mapv(f64::abs).mean().unwrap();
        assert!(mae < 0.02, "mae {mae}");
        let imp = rf.feature_importances();
        assert!(imp[0] > imp[1] && imp[0] > imp[2]);
        assert!((imp.iter().sum::<f64>() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_extra_trees_are_reproducible() {
        let (x, y) = data();
        let a = TreeEnsemble::fit(x.view(), y.view(), params(false, SplitStrategy::Random)).unwrap();
        let b = TreeEnsemble::fit(x.view(), y.view(), params(false, SplitStrategy::Random)).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.predict(x.view()), b.predict(x.view()));
    }
}
