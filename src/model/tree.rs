//! CART regression tree with squared-error splits.
//!
//! Nodes live in a flat arena so fitted trees serialize without recursion.
//! `Best` scans every threshold of every feature; `Random` draws one uniform
//! threshold per feature between the node's min and max (extremely randomized trees).

use crate::error::{DelayError, Result};
use ndarray::{ArrayView1, ArrayView2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

const MIN_IMPURITY: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SplitStrategy {
    Best,
    Random,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TreeParams {
    /// Root is depth 0; nodes at `max_depth` are always leaves.
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub strategy: SplitStrategy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum Node {
    Leaf { value: f64 },
    Split { feature: usize, threshold: f64, left: usize, right: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    nodes: Vec<Node>,
    /// Total squared-error reduction per feature.
    impurity_decrease: Vec<f64>,
}

struct Split {
    feature: usize,
    threshold: f64,
    gain: f64,
}

struct Builder<'x, 'y, 'r> {
    x: ArrayView2<'x, f64>,
    y: ArrayView1<'y, f64>,
    params: TreeParams,
    rng: &'r mut StdRng,
    nodes: Vec<Node>,
    impurity_decrease: Vec<f64>,
}

impl RegressionTree {
    /// Fits on every row.
    pub fn fit(x: ArrayView2<f64>, y: ArrayView1<f64>, params: TreeParams, seed: u64) -> Result<Self> {
        if x.nrows() != y.len() {
            return Err(DelayError::model("number of rows in x and y must match"));
        }
        if x.nrows() == 0 {
            return Err(DelayError::model("cannot fit a tree with zero rows"));
        }
        let mut rng = StdRng::seed_from_u64(seed);
        Ok(Self::fit_sample(x, y, (0..x.nrows()).collect(), params, &mut rng))
    }

    /// Fits on the given row indices (duplicates allowed, as in a bootstrap draw).
    pub(crate) fn fit_sample(
        x: ArrayView2<f64>,
        y: ArrayView1<f64>,
        mut sample: Vec<usize>,
        params: TreeParams,
        rng: &mut StdRng,
    ) -> Self {
        let mut builder = Builder {
            x,
            y,
            params,
            rng,
            nodes: Vec::new(),
            impurity_decrease: vec![0.0; x.ncols()],
        };
        if sample.is_empty() {
            builder.nodes.push(Node::Leaf { value: 0.0 });
        } else {
            builder.build(&mut sample, 0);
        }
        Self {
            nodes: builder.nodes,
            impurity_decrease: builder.impurity_decrease,
        }
    }

    pub fn predict_row(&self, row: ArrayView1<f64>) -> f64 {
        let mut id = 0;
        loop {
            match &self.nodes[id] {
                Node::Leaf { value } => return *value,
                Node::Split { feature, threshold, left, right } => {
                    id = if row[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
    }

    pub fn n_features(&self) -> usize {
        self.impurity_decrease.len()
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], id: usize) -> usize {
            match &nodes[id] {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => 1 + walk(nodes, *left).max(walk(nodes, *right)),
            }
        }
        walk(&self.nodes, 0)
    }

    /// Impurity-based importances normalised to sum to 1 (all zeros for a stump).
    pub fn feature_importances(&self) -> Vec<f64> {
        let total: f64 = self.impurity_decrease.iter().sum();
        if total > 0.0 {
            self.impurity_decrease.iter().map(|v| v / total).collect()
        } else {
            vec![0.0; self.impurity_decrease.len()]
        }
    }
}

impl Builder<'_, '_, '_> {
    fn build(&mut self, idx: &mut [usize], depth: usize) -> usize {
        let n = idx.len();
        let (sum, sum_sq) = idx.iter().fold((0.0, 0.0), |(s, sq), &i| {
            let v = self.y[i];
            (s + v, sq + v * v)
        });
        let sse = sum_sq - sum * sum / n as f64;

        let node_id = self.nodes.len();
        self.nodes.push(Node::Leaf { value: sum / n as f64 });

        let p = self.params;
        if depth >= p.max_depth
            || n < p.min_samples_split
            || n < 2 * p.min_samples_leaf
            || sse <= MIN_IMPURITY
        {
            return node_id;
        }

        let split = match p.strategy {
            SplitStrategy::Best => self.best_split(idx, sum, sum_sq, sse),
            SplitStrategy::Random => self.random_split(idx, sum, sum_sq, sse),
        };
        let Some(split) = split else {
            return node_id;
        };

        let mid = partition(idx, |i| self.x[[i, split.feature]] <= split.threshold);
        if mid < p.min_samples_leaf || n - mid < p.min_samples_leaf {
            return node_id;
        }
        self.impurity_decrease[split.feature] += split.gain;

        let (left_idx, right_idx) = idx.split_at_mut(mid);
        let left = self.build(left_idx, depth + 1);
        let right = self.build(right_idx, depth + 1);
        self.nodes[node_id] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
        };
        node_id
    }

    fn children_sse(&self, left: (f64, f64, usize), sum: f64, sum_sq: f64, n: usize) -> f64 {
        let (l_sum, l_sq, nl) = left;
        let nr = n - nl;
        let r_sum = sum - l_sum;
        let r_sq = sum_sq - l_sq;
        (l_sq - l_sum * l_sum / nl as f64) + (r_sq - r_sum * r_sum / nr as f64)
    }

    fn best_split(&self, idx: &[usize], sum: f64, sum_sq: f64, sse: f64) -> Option<Split> {
        let n = idx.len();
        let min_leaf = self.params.min_samples_leaf.max(1);
        let mut best: Option<Split> = None;
        let mut pairs: Vec<(f64, f64)> = Vec::with_capacity(n);

        for feature in 0..self.x.ncols() {
            pairs.clear();
            pairs.extend(idx.iter().map(|&i| (self.x[[i, feature]], self.y[i])));
            pairs.sort_unstable_by(|a, b| a.0.total_cmp(&b.0));
            if pairs[0].0 == pairs[n - 1].0 {
                continue;
            }

            let (mut l_sum, mut l_sq) = (0.0, 0.0);
            for k in 0..n - 1 {
                let (v, t) = pairs[k];
                l_sum += t;
                l_sq += t * t;
                let nl = k + 1;
                if nl < min_leaf {
                    continue;
                }
                if n - nl < min_leaf {
                    break;
                }
                let next = pairs[k + 1].0;
                if v == next {
                    continue;
                }
                let gain = sse - self.children_sse((l_sum, l_sq, nl), sum, sum_sq, n);
                if best.as_ref().map_or(gain > MIN_IMPURITY, |b| gain > b.gain) {
                    let mut threshold = v + (next - v) / 2.0;
                    if threshold >= next {
                        threshold = v;
                    }
                    best = Some(Split { feature, threshold, gain });
                }
            }
        }
        best
    }

    fn random_split(&mut self, idx: &[usize], sum: f64, sum_sq: f64, sse: f64) -> Option<Split> {
        let n = idx.len();
        let min_leaf = self.params.min_samples_leaf.max(1);
        let mut best: Option<Split> = None;

        for feature in 0..self.x.ncols() {
            let (lo, hi) = idx.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &i| {
                let v = self.x[[i, feature]];
                (lo.min(v), hi.max(v))
            });
            if hi <= lo {
                continue;
            }
            let threshold = self.rng.random_range(lo..hi);

            let (mut l_sum, mut l_sq, mut nl) = (0.0, 0.0, 0usize);
            for &i in idx {
                if self.x[[i, feature]] <= threshold {
                    let t = self.y[i];
                    l_sum += t;
                    l_sq += t * t;
                    nl += 1;
                }
            }
            if nl < min_leaf || n - nl < min_leaf {
                continue;
            }
            let gain = sse - self.children_sse((l_sum, l_sq, nl), sum, sum_sq, n);
            if best.as_ref().map_or(gain > MIN_IMPURITY, |b| gain > b.gain) {
                best = Some(Split { feature, threshold, gain });
            }
        }
        best
    }
}

/// Moves indices satisfying `goes_left` to the front; returns how many did.
fn partition(idx: &mut [usize], goes_left: impl Fn(usize) -> bool) -> usize {
    let mut mid = 0;
    for j in 0..idx.len() {
        if goes_left(idx[j]) {
            idx.swap(mid, j);
            mid += 1;
        }
    }
    mid
}
