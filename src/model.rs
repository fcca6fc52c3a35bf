//! The six candidate regressors, trained on the same encoded matrix.
use crate::error::Result;
use ndarray::{Array1, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;
use tracing::info;

pub mod boosting;
pub mod forest;
pub mod knn;
pub mod linear;
pub mod tree;

use boosting::{BoostingParams, GradientBoosting};
use forest::{ForestParams, TreeEnsemble};
use knn::KNearestNeighbors;
use linear::RidgeRegression;
use tree::{RegressionTree, SplitStrategy, TreeParams};

pub const RIDGE_ALPHA: f64 = 1.0;
pub const KNN_NEIGHBOURS: usize = 25;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    Ridge,
    DecisionTree,
    RandomForest,
    KNearestNeighbors,
    ExtraTrees,
    GradientBoosting,
}

impl ModelKind {
    /// Training and tie-break order.
    pub const ALL: [ModelKind; 6] = [
        ModelKind::Ridge,
        ModelKind::DecisionTree,
        ModelKind::RandomForest,
        ModelKind::KNearestNeighbors,
        ModelKind::ExtraTrees,
        ModelKind::GradientBoosting,
    ];

    pub fn display_name(self) -> &'static str {
        match self {
            ModelKind::Ridge => "Ridge Regression",
            ModelKind::DecisionTree => "Decision Tree",
            ModelKind::RandomForest => "Random Forest",
            ModelKind::KNearestNeighbors => "K-Nearest Neighbors",
            ModelKind::ExtraTrees => "Extra Trees",
            ModelKind::GradientBoosting => "Gradient Boosting",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// A fitted model of any kind; serialised with a `kind` tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "model", rename_all = "snake_case")]
pub enum TrainedModel {
    Ridge(RidgeRegression),
    DecisionTree(RegressionTree),
    RandomForest(TreeEnsemble),
    KNearestNeighbors(KNearestNeighbors),
    ExtraTrees(TreeEnsemble),
    GradientBoosting(GradientBoosting),
}

impl TrainedModel {
    pub fn fit(kind: ModelKind, x: ArrayView2<f64>, y: ArrayView1<f64>, seed: u64) -> Result<Self> {
        Ok(match kind {
            ModelKind::Ridge => TrainedModel::Ridge(RidgeRegression::fit(x, y, RIDGE_ALPHA)?),
            ModelKind::DecisionTree => TrainedModel::DecisionTree(RegressionTree::fit(
                x,
                y,
                TreeParams { max_depth: 10, min_samples_split: 15, min_samples_leaf: 8, strategy: SplitStrategy::Best },
                seed,
            )?),
            ModelKind::RandomForest => TrainedModel::RandomForest(TreeEnsemble::fit(
                x,
                y,
                ForestParams {
                    n_trees: 150,
                    tree: TreeParams { max_depth: 12, min_samples_split: 8, min_samples_leaf: 4, strategy: SplitStrategy::Best },
                    bootstrap: true,
                    seed,
                },
            )?),
            ModelKind::KNearestNeighbors => {
                TrainedModel::KNearestNeighbors(KNearestNeighbors::fit(x, y, KNN_NEIGHBOURS)?)
            }
            ModelKind::ExtraTrees => TrainedModel::ExtraTrees(TreeEnsemble::fit(
                x,
                y,
                ForestParams {
                    n_trees: 120,
                    tree: TreeParams { max_depth: 10, min_samples_split: 12, min_samples_leaf: 6, strategy: SplitStrategy::Random },
                    bootstrap: false,
                    seed,
                },
            )?),
            ModelKind::GradientBoosting => TrainedModel::GradientBoosting(GradientBoosting::fit(
                x,
                y,
                BoostingParams {
                    n_stages: 100,
                    learning_rate: 0.05,
                    subsample: 0.8,
                    tree: TreeParams { max_depth: 5, min_samples_split: 20, min_samples_leaf: 10, strategy: SplitStrategy::Best },
                    seed,
                },
            )?),
        })
    }

    pub fn kind(&self) -> ModelKind {
        match self {
            TrainedModel::Ridge(_) => ModelKind::Ridge,
            TrainedModel::DecisionTree(_) => ModelKind::DecisionTree,
            TrainedModel::RandomForest(_) => ModelKind::RandomForest,
            TrainedModel::KNearestNeighbors(_) => ModelKind::KNearestNeighbors,
            TrainedModel::ExtraTrees(_) => ModelKind::ExtraTrees,
            TrainedModel::GradientBoosting(_) => ModelKind::GradientBoosting,
        }
    }

    pub fn n_features(&self) -> usize {
        match self {
            TrainedModel::Ridge(m) => m.n_features(),
            TrainedModel::DecisionTree(m) => m.n_features(),
            TrainedModel::RandomForest(m) | TrainedModel::ExtraTrees(m) => m.n_features(),
            TrainedModel::KNearestNeighbors(m) => m.n_features(),
            TrainedModel::GradientBoosting(m) => m.n_features(),
        }
    }

    /// Delay probability for one encoded row, clipped to `[0, 1]`.
    pub fn predict_row(&self, row: ArrayView1<f64>) -> f64 {
        let raw = match self {
            TrainedModel::Ridge(m) => m.predict_row(row),
            TrainedModel::DecisionTree(m) => m.predict_row(row),
            TrainedModel::RandomForest(m) | TrainedModel::ExtraTrees(m) => m.predict_row(row),
            TrainedModel::KNearestNeighbors(m) => m.predict_row(row),
            TrainedModel::GradientBoosting(m) => m.predict_row(row),
        };
        clip_rate(raw)
    }

    pub fn predict(&self, x: ArrayView2<f64>) -> Array1<f64> {
        let raw = match self {
            TrainedModel::Ridge(m) => m.predict(x),
            TrainedModel::DecisionTree(m) => x.rows().into_iter().map(|r| m.predict_row(r)).collect(),
            TrainedModel::RandomForest(m) | TrainedModel::ExtraTrees(m) => m.predict(x),
            TrainedModel::KNearestNeighbors(m) => m.predict(x),
            TrainedModel::GradientBoosting(m) => m.predict(x),
        };
        raw.mapv(clip_rate)
    }

    /// Per-feature importances summing to 1. KNN has none.
    pub fn feature_importances(&self) -> Option<Vec<f64>> {
        match self {
            TrainedModel::Ridge(m) => Some(m.feature_importances()),
            TrainedModel::DecisionTree(m) => Some(m.feature_importances()),
            TrainedModel::RandomForest(m) | TrainedModel::ExtraTrees(m) => Some(m.feature_importances()),
            TrainedModel::KNearestNeighbors(_) => None,
            TrainedModel::GradientBoosting(m) => Some(m.feature_importances()),
        }
    }
}

/// Clamps to `[0, 1]`; NaN becomes 0.
pub fn clip_rate(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Fits every kind in [`ModelKind::ALL`] order.
pub fn train_all(x: ArrayView2<f64>, y: ArrayView1<f64>, seed: u64) -> Result<Vec<TrainedModel>> {
    ModelKind::ALL
        .into_iter()
        .map(|kind| {
            let started = Instant::now();
            info!(model = %kind, rows = x.nrows(), features = x.ncols(), "Training model");
            let model = TrainedModel::fit(kind, x, y, seed)?;
            info!(model = %kind, elapsed_ms = started.elapsed().as_millis() as u64, "Model trained");
            Ok(model)
        })
        .collect()
}

/// Pairs feature names with importances, largest first.
pub fn ranked_importances(names: &[&str], importances: &[f64]) -> Vec<(String, f64)> {
    let mut ranked: Vec<(String, f64)> =
        names.iter().zip(importances).map(|(&n, &v)| (n.to_string(), v)).collect();
    ranked.sort_by(|a, b| b.1.abs().total_cmp(&a.1.abs()));
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn data() -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((60, 3), |(i, j)| match j {
            0 => (i % 12 + 1) as f64,
            1 => ((i * 5) % 7) as f64,
            _ => (i / 12) as f64,
        });
        let y = x.column(0).mapv(|m| 0.1 + 0.02 * m);
        (x, y)
    }

    #[test]
    fn test_clip_rate() {
        assert_eq!(clip_rate(-0.2), 0.0);
        assert_eq!(clip_rate(1.7), 1.0);
        assert_eq!(clip_rate(f64::NAN), 0.0);
        assert_eq!(clip_rate(0.42), 0.42);
    }

    #[test]
    fn test_every_kind_trains_and_predicts_in_range() {
        let (x, y) = data();
        let models = train_all(x.view(), y.view(), 42).unwrap();
        let kinds: Vec<ModelKind> = models.iter().map(TrainedModel::kind).collect();
        assert_eq!(kinds, ModelKind::ALL.to_vec());
        for model in &models {
            assert_eq!(model.n_features(), 3);
            let pred = model.predict(x.view());
            assert!(pred.iter().all(|p| (0.0..=1.0).contains(p)));
            assert_eq!(pred[7], model.predict_row(x.row(7)));
        }
    }

    #[test]
    fn test_model_json_round_trip_keeps_predictions() {
        let (x, y) = data();
        let model = TrainedModel::fit(ModelKind::GradientBoosting, x.view(), y.view(), 42).unwrap();
        let json = serde_json::to_string(&model).unwrap();
        assert!(json.contains("\"kind\":\"gradient_boosting\""));
        let back: TrainedModel = serde_json::from_str(&json).unwrap();
        assert_eq!(back.predict(x.view()), model.predict(x.view()));
    }

    #[test]
    fn test_ranked_importances_sorted_descending() {
        let ranked = ranked_importances(&["a", "b", "c"], &[0.2, 0.5, 0.3]);
        let names: Vec<&str> = ranked.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, ["b", "c", "a"]);
    }

    #[test]
    fn test_knn_has_no_importances() {
        let (x, y) = data();
        let knn = TrainedModel::fit(ModelKind::KNearestNeighbors, x.view(), y.view(), 42).unwrap();
        assert!(knn.feature_importances().is_none());
        let tree = TrainedModel::fit(ModelKind::DecisionTree, x.view(), y.view(), 42).unwrap();
        assert_eq!(tree.feature_importances().unwrap().len(), 3);
    }
}
