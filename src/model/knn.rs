//! Brute-force k-nearest-neighbour regression with inverse-distance weights.

use crate::error::{DelayError, Result};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KNearestNeighbors {
    k: usize,
    train_x: Array2<f64>,
    train_y: Array1<f64>,
}

impl KNearestNeighbors {
    /// Stores the training rows; `k` is capped at the number of rows.
    pub fn fit(x: ArrayView2<f64>, y: ArrayView1<f64>, k: usize) -> Result<Self> {
        if x.nrows() != y.len() {
            return Err(DelayError::model("number of rows in x and y must match"));
        }
        if x.nrows() == 0 || k == 0 {
            return Err(DelayError::model("k-nearest-neighbours needs rows and k >= 1"));
        }
        Ok(Self {
            k: k.min(x.nrows()),
            train_x: x.to_owned(),
            train_y: y.to_owned(),
        })
    }

    pub fn n_features(&self) -> usize {
        self.train_x.ncols()
    }

    /// Weighted by 1/distance. Exact matches, when present, take all the
    /// weight and are averaged equally.
    pub fn predict_row(&self, row: ArrayView1<f64>) -> f64 {
        let mut neighbours: Vec<(f64, f64)> = self
            .train_x
            .rows()
            .into_iter()
            .zip(self.train_y.iter())
            .map(|(train_row, &t)| {
                let d2: f64 = train_row.iter().zip(row.iter()).map(|(a, b)| (a - b) * (a - b)).sum();
                (d2.sqrt(), t)
            })
            .collect();
        let k = self.k;
        if k < neighbours.len() {
            neighbours.select_nth_unstable_by(k - 1, |a, b| a.0.total_cmp(&b.0));
            neighbours.truncate(k);
        }

        let exact: Vec<f64> = neighbours.iter().filter(|(d, _)| *d == 0.0).map(|(_, t)| *t).collect();
        if !exact.is_empty() {
            return exact.iter().sum::<f64>() / exact.len() as f64;
        }
        let (weighted, weights) = neighbours
            .iter()
            .fold((0.0, 0.0), |(s, w), (d, t)| (s + t / d, w + 1.0 / d));
        weighted / weights
    }

    pub fn predict(&self, x: ArrayView2<f64>) -> Array1<f64> {
        let preds: Vec<f64> = (0..x.nrows()).into_par_iter().map(|i| self.predict_row(x.row(i))).collect();
        Array1::from(preds)
    }
}
