//! Pipeline configuration: defaults, optional TOML file, CLI overrides.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Which rows the carrier/airport/seasonal delay-rate aggregates are computed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryScope {
    /// Every cleaned row, before the chronological split.
    #[default]
    FullDataset,
    /// Training-year rows only, joined onto validation/test by key.
    TrainingOnly,
}

/// Chronological partition of the cleaned data by year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitConfig {
    pub train_years: Vec<i32>,
    pub validation_years: Vec<i32>,
    pub test_years: Vec<i32>,
    /// Anomalous years dropped during cleaning.
    pub excluded_years: Vec<i32>,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            train_years: (2013..=2018).collect(),
            validation_years: vec![2019],
            test_years: vec![2022, 2023],
            excluded_years: vec![2020, 2021],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub data_path: PathBuf,
    pub artifacts_dir: PathBuf,
    pub reports_dir: PathBuf,
    pub split: SplitConfig,
    pub history_scope: HistoryScope,
    pub seed: u64,
    /// Cap on rows scored for the informational train-MAE column.
    pub train_metrics_sample: Option<usize>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from("data/Airline_Delay_Cause.csv"),
            artifacts_dir: PathBuf::from("models"),
            reports_dir: PathBuf::from("reports"),
            split: SplitConfig::default(),
            history_scope: HistoryScope::FullDataset,
            seed: 42,
            train_metrics_sample: Some(20_000),
        }
    }
}

impl PipelineConfig {
    /// Reads a TOML file; keys that are absent keep their defaults.
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }
}
