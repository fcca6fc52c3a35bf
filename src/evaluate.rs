//! Scoring, model selection and segment-level error analysis.

use crate::error::{DelayError, Result};
use crate::features::EngineeredRecord;
use crate::model::{ModelKind, TrainedModel};
use crate::stats::{mean, median, std_dev};
use ndarray::{ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use tracing::info;

/// MAE, RMSE and R² of one prediction vector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegressionMetrics {
    pub mae: f64,
    pub rmse: f64,
    pub r2: f64,
}

impl RegressionMetrics {
    /// Empty input scores as all zeros.
    pub fn compute(y_true: ArrayView1<f64>, y_pred: ArrayView1<f64>) -> Self {
        let n = y_true.len();
        if n == 0 {
            return Self { mae: 0.0, rmse: 0.0, r2: 0.0 };
        }
        let y_mean = y_true.sum() / n as f64;
        let (abs, ss_res, ss_tot) = y_true.iter().zip(y_pred.iter()).fold(
            (0.0, 0.0, 0.0),
            |(abs, res, tot), (t, p)| (abs + (t - p).abs(), res + (t - p).powi(2), tot + (t - y_mean).powi(2)),
        );
        let r2 = if ss_tot > 0.0 {
            1.0 - ss_res / ss_tot
        } else if ss_res == 0.0 {
            1.0
        } else {
            0.0
        };
        Self { mae: abs / n as f64, rmse: (ss_res / n as f64).sqrt(), r2 }
    }
}

/// One row of the model comparison table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelScore {
    pub model: String,
    #[serde(skip)]
    pub kind: ModelKind,
    pub train_mae: f64,
    pub val_mae: f64,
    pub val_r2: f64,
    pub val_rmse: f64,
}

/// Evenly spaced row indices, at most `cap` of them. `None` keeps every row.
pub fn stride_sample(n: usize, cap: Option<usize>) -> Vec<usize> {
    match cap {
        Some(cap) if cap > 0 && n > cap => (0..cap).map(|i| i * n / cap).collect(),
        _ => (0..n).collect(),
    }
}

/// Scores every model on validation, plus train MAE on a stride sample of training rows.
pub fn score_models(
    models: &[TrainedModel],
    train: (ArrayView2<f64>, ArrayView1<f64>),
    validation: (ArrayView2<f64>, ArrayView1<f64>),
    train_sample: Option<usize>,
) -> Vec<ModelScore> {
    let idx = stride_sample(train.0.nrows(), train_sample);
    let train_x = train.0.select(Axis(0), &idx);
    let train_y = train.1.select(Axis(0), &idx);

    models
        .iter()
        .map(|model| {
            let train_mae = RegressionMetrics::compute(train_y.view(), model.predict(train_x.view()).view()).mae;
            let val = RegressionMetrics::compute(validation.1, model.predict(validation.0).view());
            info!(
                model = %model.kind(),
                train_mae,
                val_mae = val.mae,
                val_r2 = val.r2,
                val_rmse = val.rmse,
                "Validation scores"
            );
            ModelScore {
                model: model.kind().display_name().to_string(),
                kind: model.kind(),
                train_mae,
                val_mae: val.mae,
                val_r2: val.r2,
                val_rmse: val.rmse,
            }
        })
        .collect()
}

/// Index of the lowest validation MAE; the earliest model wins a tie.
pub fn select_best(scores: &[ModelScore]) -> Result<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, s) in scores.iter().enumerate() {
        if best.map_or(true, |(_, mae)| s.val_mae < mae) {
            best = Some((i, s.val_mae));
        }
    }
    best.map(|(i, _)| i).ok_or_else(|| DelayError::model("no models were scored"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeSegment {
    Low,
    Medium,
    High,
    Major,
}

impl VolumeSegment {
    pub const ALL: [VolumeSegment; 4] = [Self::Low, Self::Medium, Self::High, Self::Major];

    /// Right-closed bins at 50 / 200 / 500; zero-volume rows count as Low.
    pub fn from_flights(arr_flights: f64) -> Self {
        if arr_flights <= 50.0 {
            Self::Low
        } else if arr_flights <= 200.0 {
            Self::Medium
        } else if arr_flights <= 500.0 {
            Self::High
        } else {
            Self::Major
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Low => "Low (<50)",
            Self::Medium => "Medium (50-200)",
            Self::High => "High (200-500)",
            Self::Major => "Major (>500)",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelayRateSegment {
    VeryLow,
    Moderate,
    High,
    VeryHigh,
}

impl DelayRateSegment {
    pub const ALL: [DelayRateSegment; 4] = [Self::VeryLow, Self::Moderate, Self::High, Self::VeryHigh];

    /// Right-closed bins at 0.15 / 0.25 / 0.35; a zero rate counts as Very Low.
    pub fn from_rate(rate: f64) -> Self {
        if rate <= 0.15 {
            Self::VeryLow
        } else if rate <= 0.25 {
            Self::Moderate
        } else if rate <= 0.35 {
            Self::High
        } else {
            Self::VeryHigh
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::VeryLow => "Very Low (<15%)",
            Self::Moderate => "Moderate (15-25%)",
            Self::High => "High (25-35%)",
            Self::VeryHigh => "Very High (>35%)",
        }
    }
}

/// Absolute-error summary for one segment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentError {
    pub segment: String,
    pub mean_abs_error: f64,
    pub median_abs_error: f64,
    pub std_abs_error: Option<f64>,
    pub count: usize,
    pub mean_true: f64,
    pub mean_pred: f64,
}

/// Per-row test prediction with its absolute error.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestPrediction {
    pub carrier: String,
    pub airport: String,
    pub month: u32,
    pub y_true: f64,
    pub y_pred: f64,
    pub abs_error: f64,
}

/// Winner's scores on the test partition.
#[derive(Debug, Clone, PartialEq)]
pub struct TestEvaluation {
    pub metrics: RegressionMetrics,
    pub predictions: Vec<TestPrediction>,
    pub by_volume: Vec<SegmentError>,
    pub by_delay_rate: Vec<SegmentError>,
}

/// Scores `model` on already-transformed test rows.
pub fn evaluate_test(model: &TrainedModel, rows: &[EngineeredRecord], x: ArrayView2<f64>, y: ArrayView1<f64>) -> TestEvaluation {
    let pred = model.predict(x);
    let metrics = RegressionMetrics::compute(y, pred.view());
    info!(
        model = %model.kind(),
        rows = rows.len(),
        test_mae = metrics.mae,
        test_r2 = metrics.r2,
        test_rmse = metrics.rmse,
        "Test scores"
    );

    let predictions: Vec<TestPrediction> = rows
        .iter()
        .zip(y.iter().zip(pred.iter()))
        .map(|(r, (&t, &p))| TestPrediction {
            carrier: r.carrier.clone(),
            airport: r.airport.clone(),
            month: r.month.get(),
            y_true: t,
            y_pred: p,
            abs_error: (t - p).abs(),
        })
        .collect();

    let by_volume = segment_errors(VolumeSegment::ALL.map(VolumeSegment::label), &predictions, |i| {
        VolumeSegment::from_flights(rows[i].arr_flights).label()
    });
    let by_delay_rate = segment_errors(DelayRateSegment::ALL.map(DelayRateSegment::label), &predictions, |i| {
        DelayRateSegment::from_rate(predictions[i].y_true).label()
    });

    TestEvaluation { metrics, predictions, by_volume, by_delay_rate }
}

/// Groups predictions by `segment_of(row index)`; empty segments are omitted.
fn segment_errors<const N: usize>(
    labels: [&'static str; N],
    predictions: &[TestPrediction],
    segment_of: impl Fn(usize) -> &'static str,
) -> Vec<SegmentError> {
    labels
        .into_iter()
        .filter_map(|label| {
            let members: Vec<&TestPrediction> =
                (0..predictions.len()).filter(|&i| segment_of(i) == label).map(|i| &predictions[i]).collect();
            if members.is_empty() {
                return None;
            }
            let errors: Vec<f64> = members.iter().map(|p| p.abs_error).collect();
            let truth: Vec<f64> = members.iter().map(|p| p.y_true).collect();
            let preds: Vec<f64> = members.iter().map(|p| p.y_pred).collect();
            Some(SegmentError {
                segment: label.to_string(),
                mean_abs_error: mean(&errors).unwrap_or(0.0),
                median_abs_error: median(&errors).unwrap_or(0.0),
                std_abs_error: std_dev(&errors),
                count: members.len(),
                mean_true: mean(&truth).unwrap_or(0.0),
                mean_pred: mean(&preds).unwrap_or(0.0),
            })
        })
        .collect()
}
