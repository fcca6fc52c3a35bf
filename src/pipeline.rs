//! Training run: load → clean → engineer → split → fit preprocessing →
//! train six models → select → test → persist artifacts and reports.

use crate::artifacts::{display_names, ArtifactBundle, DatasetStats, LookupTable, Manifest};
use crate::config::{HistoryScope, PipelineConfig};
use crate::encoding::{targets, Preprocessor};
use crate::error::{DelayError, Result};
use crate::evaluate::{evaluate_test, score_models, select_best, ModelScore, RegressionMetrics};
use crate::features::{engineer, HistoricalAggregates};
use crate::io::load_csv;
use crate::model::{ranked_importances, train_all, ModelKind};
use crate::preprocess::{clean, FlightRecord};
use crate::report;
use crate::split::split_by_year;
use chrono::Utc;
use std::fmt;
use std::path::PathBuf;
use tracing::info;

/// What a run produced, printed by the CLI.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub cleaned_rows: usize,
    pub train_rows: usize,
    pub validation_rows: usize,
    pub test_rows: usize,
    pub feature_count: usize,
    pub scores: Vec<ModelScore>,
    pub best_model: ModelKind,
    pub test: Option<RegressionMetrics>,
    pub top_features: Vec<(String, f64)>,
    pub lookup_entries: usize,
    pub artifacts_dir: PathBuf,
    pub reports_dir: PathBuf,
}

/// Runs the whole training pipeline described by `config`.
pub fn run(config: &PipelineConfig) -> Result<RunSummary> {
    let source = load_csv(&config.data_path)?;
    let records = clean(&source, &config.split.excluded_years);
    let (Some(baseline_year), Some(reference_year)) =
        (records.iter().map(|r| r.year).min(), records.iter().map(|r| r.year).max())
    else {
        return Err(DelayError::data("no usable rows after cleaning"));
    };

    let history = build_history(&records, config);
    let engineered = engineer(&records, &history);
    let all_rows = engineered.clone();
    let split = split_by_year(engineered, &config.split)?;

    let preprocessor = Preprocessor::fit(&split.train)?;
    let x_train = preprocessor.transform(split.train.rows());
    let y_train = targets(split.train.rows());
    let x_val = preprocessor.transform(split.validation.rows());
    let y_val = targets(split.validation.rows());

    let models = train_all(x_train.view(), y_train.view(), config.seed)?;
    let scores = score_models(
        &models,
        (x_train.view(), y_train.view()),
        (x_val.view(), y_val.view()),
        config.train_metrics_sample,
    );
    let best_idx = select_best(&scores)?;
    let best_score = scores[best_idx].clone();
    let Some(model) = models.into_iter().nth(best_idx) else {
        return Err(DelayError::model("selected model index out of range"));
    };
    info!(model = %model.kind(), val_mae = best_score.val_mae, "Selected best model");

    let test = if split.test.is_empty() {
        None
    } else {
        let x_test = preprocessor.transform(split.test.rows());
        let y_test = targets(split.test.rows());
        Some(evaluate_test(&model, split.test.rows(), x_test.view(), y_test.view()))
    };

    let names: Vec<&str> = preprocessor.feature_columns().iter().map(|c| c.name()).collect();
    let ranked = model
        .feature_importances()
        .map(|imp| ranked_importances(&names, &imp))
        .unwrap_or_default();

    let lookup = LookupTable::from_training(split.train.rows());
    let stats = DatasetStats::from_training(&split.train, &lookup, baseline_year, reference_year);
    let feature_count = preprocessor.feature_columns().len();
    let bundle = ArtifactBundle {
        carrier_names: display_names(split.train.rows(), |r| (r.carrier.as_str(), r.carrier_name.as_deref())),
        airport_names: display_names(split.train.rows(), |r| (r.airport.as_str(), r.airport_name.as_deref())),
        manifest: Manifest {
            created_at: Utc::now(),
            best_model: model.kind(),
            feature_count,
            history_scope: config.history_scope,
            validation: RegressionMetrics {
                mae: best_score.val_mae,
                rmse: best_score.val_rmse,
                r2: best_score.val_r2,
            },
            test: test.as_ref().map(|t| t.metrics),
        },
        model,
        preprocessor,
        lookup,
        stats,
    };
    bundle.save(&config.artifacts_dir)?;
    report::write_all(&config.reports_dir, &all_rows, &scores, &ranked, test.as_ref())?;

    Ok(RunSummary {
        cleaned_rows: records.len(),
        train_rows: split.train.rows().len(),
        validation_rows: split.validation.rows().len(),
        test_rows: split.test.rows().len(),
        feature_count,
        best_model: bundle.manifest.best_model,
        scores,
        test: bundle.manifest.test,
        top_features: ranked.into_iter().take(10).collect(),
        lookup_entries: bundle.lookup.len(),
        artifacts_dir: config.artifacts_dir.clone(),
        reports_dir: config.reports_dir.clone(),
    })
}

fn build_history(records: &[FlightRecord], config: &PipelineConfig) -> HistoricalAggregates {
    match config.history_scope {
        HistoryScope::FullDataset => HistoricalAggregates::from_records(records),
        HistoryScope::TrainingOnly => {
            info!("Historical rates restricted to training years");
            HistoricalAggregates::from_records(
                records.iter().filter(|r| config.split.train_years.contains(&r.year)),
            )
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Flight delay training summary")?;
        writeln!(f, "  cleaned rows      {}", self.cleaned_rows)?;
        writeln!(
            f,
            "  train / val / test {} / {} / {}",
            self.train_rows, self.validation_rows, self.test_rows
        )?;
        writeln!(f, "  model features    {}", self.feature_count)?;
        writeln!(f)?;
        writeln!(f, "{:<22} {:>10} {:>10} {:>10} {:>10}", "model", "train_mae", "val_mae", "val_r2", "val_rmse")?;
        for s in &self.scores {
            writeln!(
                f,
                "{:<22} {:>10.6} {:>10.6} {:>10.4} {:>10.6}",
                s.model, s.train_mae, s.val_mae, s.val_r2, s.val_rmse
            )?;
        }
        writeln!(f)?;
        writeln!(f, "Best model: {}", self.best_model)?;
        match &self.test {
            Some(t) => writeln!(f, "Test MAE {:.6}  R2 {:.4}  RMSE {:.6}", t.mae, t.r2, t.rmse)?,
            None => writeln!(f, "Test partition empty; no test scores")?,
        }
        if !self.top_features.is_empty() {
            writeln!(f, "\nTop features:")?;
            for (name, importance) in &self.top_features {
                writeln!(f, "  {name:<32} {importance:>8.4}")?;
            }
        }
        writeln!(f, "\nLookup entries: {}", self.lookup_entries)?;
        writeln!(f, "Artifacts: {}", self.artifacts_dir.display())?;
        write!(f, "Reports:   {}", self.reports_dir.display())
    }
}
