//! Categorical encoding and robust scaling, fitted once on the training set.
//!
//! Nothing here exposes a public fit on an arbitrary table: [`Preprocessor::fit`]
//! takes a [`TrainingSet`], and the fitted pieces have no mutating methods.

use crate::error::{DelayError, Result};
use crate::features::{CategoricalColumn, EngineeredRecord, FeatureColumn};
use crate::split::TrainingSet;
use crate::stats::quantile_sorted;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::info;

/// Integer code for a category, or the unknown sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Code {
    Known(usize),
    Unknown,
}

impl Code {
    pub const UNKNOWN_VALUE: f64 = -1.0;

    /// Model-facing value: the index, or -1 for unseen categories.
    pub fn value(self) -> f64 {
        match self {
            Code::Known(i) => i as f64,
            Code::Unknown => Self::UNKNOWN_VALUE,
        }
    }
}

/// Sorted vocabulary; a value's code is its position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelEncoder {
    classes: Vec<String>,
}

impl LabelEncoder {
    fn fit<'a>(values: impl IntoIterator<Item = &'a str>) -> Self {
        let classes: BTreeSet<&str> = values.into_iter().collect();
        Self {
            classes: classes.into_iter().map(str::to_string).collect(),
        }
    }

    pub fn encode(&self, value: &str) -> Code {
        match self.classes.binary_search_by(|c| c.as_str().cmp(value)) {
            Ok(i) => Code::Known(i),
            Err(_) => Code::Unknown,
        }
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoricalEncoders(BTreeMap<CategoricalColumn, LabelEncoder>);

impl CategoricalEncoders {
    fn fit(rows: &[EngineeredRecord]) -> Self {
        Self(
            CategoricalColumn::ALL
                .into_iter()
                .map(|col| (col, LabelEncoder::fit(rows.iter().map(|r| col.label(r)))))
                .collect(),
        )
    }

    /// Unknown when the column has no encoder or the value was never seen.
    pub fn encode(&self, column: CategoricalColumn, value: &str) -> Code {
        self.0.get(&column).map_or(Code::Unknown, |e| e.encode(value))
    }

    pub fn get(&self, column: CategoricalColumn) -> Option<&LabelEncoder> {
        self.0.get(&column)
    }
}

/// `(x - median) / IQR` per column; a zero IQR scales by 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobustScaler {
    columns: Vec<FeatureColumn>,
    centers: Vec<f64>,
    scales: Vec<f64>,
}

impl RobustScaler {
    fn fit(columns: Vec<FeatureColumn>, rows: &[EngineeredRecord]) -> Self {
        let mut centers = Vec::with_capacity(columns.len());
        let mut scales = Vec::with_capacity(columns.len());
        for col in &columns {
            let mut values: Vec<f64> = rows.iter().map(|r| col.numeric_value(r).unwrap_or(0.0)).collect();
            if values.is_empty() {
                centers.push(0.0);
                scales.push(1.0);
                continue;
            }
            values.sort_by(f64::total_cmp);
            let iqr = quantile_sorted(&values, 0.75) - quantile_sorted(&values, 0.25);
            centers.push(quantile_sorted(&values, 0.5));
            scales.push(if iqr > 0.0 { iqr } else { 1.0 });
        }
        Self { columns, centers, scales }
    }

    pub fn columns(&self) -> &[FeatureColumn] {
        &self.columns
    }

    pub fn scale_value(&self, index: usize, value: f64) -> f64 {
        (value - self.centers[index]) / self.scales[index]
    }
}

/// Frozen encoders + scaler + ordered model columns.
#[derive(Debug, Clone, PartialEq)]
pub struct Preprocessor {
    encoders: CategoricalEncoders,
    scaler: RobustScaler,
    feature_columns: Vec<FeatureColumn>,
    // (position in feature_columns, position in scaler)
    scaled_positions: Vec<(usize, usize)>,
}

impl Preprocessor {
    pub fn fit(train: &TrainingSet) -> Result<Self> {
        let rows = train.rows();
        let feature_columns = FeatureColumn::available(rows);
        let to_scale: Vec<FeatureColumn> = feature_columns.iter().copied().filter(|c| c.is_scaled()).collect();
        let encoders = CategoricalEncoders::fit(rows);
        let scaler = RobustScaler::fit(to_scale, rows);
        info!(
            features = feature_columns.len(),
            scaled = scaler.columns.len(),
            carriers = encoders.get(CategoricalColumn::Carrier).map_or(0, |e| e.classes.len()),
            airports = encoders.get(CategoricalColumn::Airport).map_or(0, |e| e.classes.len()),
            "Fitted encoders and scaler on training rows"
        );
        Self::from_parts(encoders, scaler, feature_columns)
    }

    /// Reassembles persisted parts; checks that every scaled column is a model column.
    pub fn from_parts(
        encoders: CategoricalEncoders,
        scaler: RobustScaler,
        feature_columns: Vec<FeatureColumn>,
    ) -> Result<Self> {
        if scaler.centers.len() != scaler.columns.len() || scaler.scales.len() != scaler.columns.len() {
            return Err(DelayError::artifact("scaler parameters do not match its column list"));
        }
        let scaled_positions = scaler
            .columns
            .iter()
            .enumerate()
            .map(|(si, col)| {
                feature_columns
                    .iter()
                    .position(|c| c == col)
                    .map(|fi| (fi, si))
                    .ok_or_else(|| DelayError::artifact(format!("scaled column '{}' is not a model column", col.name())))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { encoders, scaler, feature_columns, scaled_positions })
    }

    pub fn encoders(&self) -> &CategoricalEncoders {
        &self.encoders
    }

    pub fn scaler(&self) -> &RobustScaler {
        &self.scaler
    }

    pub fn feature_columns(&self) -> &[FeatureColumn] {
        &self.feature_columns
    }

    pub fn features_to_scale(&self) -> &[FeatureColumn] {
        &self.scaler.columns
    }

    pub fn transform_row(&self, row: &EngineeredRecord) -> Array1<f64> {
        let mut out: Array1<f64> = self
            .feature_columns
            .iter()
            .map(|col| match col.categorical() {
                Some(cat) => self.encoders.encode(cat, cat.label(row)).value(),
                None => col.numeric_value(row).unwrap_or(0.0),
            })
            .collect();
        for &(fi, si) in &self.scaled_positions {
            out[fi] = self.scaler.scale_value(si, out[fi]);
        }
        out
    }

    pub fn transform(&self, rows: &[EngineeredRecord]) -> Array2<f64> {
        let mut x = Array2::<f64>::zeros((rows.len(), self.feature_columns.len()));
        for (i, row) in rows.iter().enumerate() {
            x.row_mut(i).assign(&self.transform_row(row));
        }
        x
    }
}

/// Target vector of a partition.
pub fn targets(rows: &[EngineeredRecord]) -> Array1<f64> {
    rows.iter().map(|r| r.delay_rate).collect()
}
