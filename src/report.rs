//! CSV diagnostics and the feature-importance chart written after training.
use crate::error::{DelayError, Result};
use crate::evaluate::{ModelScore, TestEvaluation};
use crate::features::EngineeredRecord;
use crate::io::write_csv;
use crate::stats::{mean, std_dev};
use plotters::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Display;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

pub const MODEL_COMPARISON_FILE: &str = "model_comparison.csv";
pub const FEATURE_IMPORTANCE_FILE: &str = "feature_importance.csv";
pub const FEATURE_IMPORTANCE_PLOT: &str = "feature_importances.png";
pub const PLOT_TOP_N: usize = 20;

/// Delay statistics for one group of rows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupStats {
    pub group: String,
    pub delay_rate_mean: f64,
    pub delay_rate_std: Option<f64>,
    pub count: usize,
    pub arr_del15_sum: f64,
    pub arr_flights_sum: f64,
    pub avg_delay_minutes_mean: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
struct ImportanceRow<'a> {
    feature: &'a str,
    importance: f64,
}

/// Groups `rows` by `key`, in key order.
pub fn group_stats<K, F>(rows: &[EngineeredRecord], key: F) -> Vec<GroupStats>
where
    K: Ord + Display,
    F: Fn(&EngineeredRecord) -> K,
{
    let mut groups: BTreeMap<K, Vec<&EngineeredRecord>> = BTreeMap::new();
    for r in rows {
        groups.entry(key(r)).or_default().push(r);
    }
    groups
        .into_iter()
        .map(|(k, members)| {
            let rates: Vec<f64> = members.iter().map(|r| r.delay_rate).collect();
            let minutes: Vec<f64> = members.iter().map(|r| r.avg_delay_minutes).collect();
            GroupStats {
                group: k.to_string(),
                delay_rate_mean: mean(&rates).unwrap_or(0.0),
                delay_rate_std: std_dev(&rates),
                count: members.len(),
                arr_del15_sum: members.iter().map(|r| r.arr_del15).sum(),
                arr_flights_sum: members.iter().map(|r| r.arr_flights).sum(),
                avg_delay_minutes_mean: mean(&minutes).unwrap_or(0.0),
            }
        })
        .collect()
}

fn sorted_by_delay_rate(mut stats: Vec<GroupStats>) -> Vec<GroupStats> {
    stats.sort_by(|a, b| a.delay_rate_mean.total_cmp(&b.delay_rate_mean));
    stats
}

/// Monthly, carrier, airport, yearly and stress-level tables over every engineered row.
pub fn write_group_reports(dir: &Path, rows: &[EngineeredRecord]) -> Result<()> {
    write_csv(&dir.join("monthly_patterns.csv"), &group_stats(rows, |r| r.month))?;
    write_csv(
        &dir.join("carrier_performance.csv"),
        &sorted_by_delay_rate(group_stats(rows, |r| r.carrier.clone())),
    )?;
    write_csv(
        &dir.join("airport_performance.csv"),
        &sorted_by_delay_rate(group_stats(rows, |r| r.airport.clone())),
    )?;
    write_csv(&dir.join("yearly_trends.csv"), &group_stats(rows, |r| r.year))?;
    write_csv(
        &dir.join("stress_level_analysis.csv"),
        &group_stats(rows, |r| r.operational_stress_level.label()),
    )?;
    Ok(())
}

pub fn write_model_comparison(dir: &Path, scores: &[ModelScore]) -> Result<()> {
    write_csv(&dir.join(MODEL_COMPARISON_FILE), scores)
}

pub fn write_feature_importances(dir: &Path, ranked: &[(String, f64)]) -> Result<()> {
    let rows: Vec<ImportanceRow> = ranked
        .iter()
        .map(|(feature, importance)| ImportanceRow { feature, importance: *importance })
        .collect();
    write_csv(&dir.join(FEATURE_IMPORTANCE_FILE), &rows)
}

pub fn write_test_reports(dir: &Path, test: &TestEvaluation) -> Result<()> {
    write_csv(&dir.join("test_predictions.csv"), &test.predictions)?;
    write_csv(&dir.join("volume_errors.csv"), &test.by_volume)?;
    write_csv(&dir.join("delay_rate_errors.csv"), &test.by_delay_rate)
}

/// Every report for one run. The chart is best-effort: a rendering failure
/// is logged and the CSVs are still kept.
pub fn write_all(
    dir: &Path,
    rows: &[EngineeredRecord],
    scores: &[ModelScore],
    ranked: &[(String, f64)],
    test: Option<&TestEvaluation>,
) -> Result<()> {
    fs::create_dir_all(dir)?;
    write_model_comparison(dir, scores)?;
    write_group_reports(dir, rows)?;
    if let Some(test) = test {
        write_test_reports(dir, test)?;
    }
    if !ranked.is_empty() {
        write_feature_importances(dir, ranked)?;
        let top = &ranked[..ranked.len().min(PLOT_TOP_N)];
        if let Err(e) = plot_importances(&dir.join(FEATURE_IMPORTANCE_PLOT), top) {
            warn!(error = %e, "Skipping feature importance chart");
        }
    }
    info!(path = %dir.display(), "Wrote reports");
    Ok(())
}

fn plot_error(e: impl Display) -> DelayError {
    DelayError::Plot(e.to_string())
}

/// Horizontal bar chart of `(feature, importance)`, first entry on top.
pub fn plot_importances(path: &Path, ranked: &[(String, f64)]) -> Result<()> {
    let names: Vec<&str> = ranked.iter().map(|(n, _)| n.as_str()).collect();
    let values: Vec<f64> = ranked.iter().map(|(_, v)| *v).collect();
    let count = ranked.len();
    if count == 0 {
        return Err(DelayError::Plot("no importances to plot".to_string()));
    }

    let max_x = values.iter().copied().fold(0.0_f64, f64::max);
    let x_range = 0.0..(if max_x > 0.0 { max_x * 1.1 } else { 1.0 });

    let root = BitMapBackend::new(path, (1000, 600)).into_drawing_area();
    root.fill(&WHITE).map_err(plot_error)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Feature Importances", ("sans-serif", 24))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(220)
        .build_cartesian_2d(x_range, 0..count)
        .map_err(plot_error)?;

    // bar i is drawn at row count-1-i so the largest importance sits on top
    chart
        .configure_mesh()
        .disable_mesh()
        .y_labels(count)
        .y_label_formatter(&|idx| {
            let i = *idx;
            if i < count {
                names[count - 1 - i].to_string()
            } else {
                String::new()
            }
        })
        .x_desc("Importance")
        .y_desc("Feature")
        .draw()
        .map_err(plot_error)?;

    chart
        .draw_series(values.iter().enumerate().map(|(i, &v)| {
            let row = count - 1 - i;
            Rectangle::new([(0.0, row), (v.max(0.0), row + 1)], BLUE.mix(0.5).filled())
        }))
        .map_err(plot_error)?;

    root.present().map_err(plot_error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::tests::record;
    use crate::features::{engineer, HistoricalAggregates};

    fn rows() -> Vec<EngineeredRecord> {
        let records = vec![
            record("AA", "ORD", 2015, 1, 100.0, 10.0),
            record("AA", "ORD", 2016, 1, 100.0, 30.0),
            record("UA", "SFO", 2016, 10, 200.0, 20.0),
            record("UA", "ORD", 2016, 2, 0.0, 0.0),
        ];
        engineer(&records, &HistoricalAggregates::from_records(&records))
    }

    #[test]
    fn test_group_stats_by_month_in_numeric_order() {
        let stats = group_stats(&rows(), |r| r.month);
        let groups: Vec<&str> = stats.iter().map(|s| s.group.as_str()).collect();
        assert_eq!(groups, ["1", "2", "10"]);
        let jan = &stats[0];
        assert_eq!(jan.count, 2);
        assert!((jan.delay_rate_mean - 0.2).abs() < 1e-12);
        assert_eq!(jan.arr_del15_sum, 40.0);
        assert_eq!(jan.arr_flights_sum, 200.0);
        assert!(jan.delay_rate_std.is_some());
        assert_eq!(stats[1].delay_rate_std, None);
    }

    #[test]
    fn test_carrier_report_sorted_by_delay_rate() {
        let stats = sorted_by_delay_rate(group_stats(&rows(), |r| r.carrier.clone()));
        assert_eq!(stats[0].group, "UA");
        assert_eq!(stats[1].group, "AA");
    }

    #[test]
    fn test_write_all_creates_csvs() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("reports");
        let ranked = vec![("seasonal_delay_rate".to_string(), 0.7), ("month_sin".to_string(), 0.3)];
        write_all(&out, &rows(), &[], &ranked, None).unwrap();
        for file in [
            "monthly_patterns.csv",
            "carrier_performance.csv",
            "airport_performance.csv",
            "yearly_trends.csv",
            "stress_level_analysis.csv",
            FEATURE_IMPORTANCE_FILE,
        ] {
            assert!(out.join(file).exists(), "{file} missing");
        }
        let importances = fs::read_to_string(out.join(FEATURE_IMPORTANCE_FILE)).unwrap();
        assert!(importances.starts_with("feature,importance\nseasonal_delay_rate,0.7"));
        assert!(!out.join("test_predictions.csv").exists());
    }
}
