//! Frozen training outputs: the model, the fitted preprocessing, display
//! names, the ground-truth lookup table and dataset statistics.
//!
//! Each piece is a separate JSON blob in one directory. Saving writes a
//! sibling staging directory first and swaps it in only once every blob is
//! on disk, so a failed save never leaves a half-written store behind.

use crate::config::HistoryScope;
use crate::encoding::{CategoricalEncoders, Preprocessor, RobustScaler};
use crate::error::{DelayError, Result};
use crate::evaluate::RegressionMetrics;
use crate::features::{EngineeredRecord, FeatureColumn};
use crate::model::{ModelKind, TrainedModel};
use crate::month::Month;
use crate::preprocess::CauseValues;
use crate::split::TrainingSet;
use crate::stats::{median, quantile, safe_ratio};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const MODEL_FILE: &str = "model.json";
pub const SCALER_FILE: &str = "scaler.json";
pub const ENCODERS_FILE: &str = "encoders.json";
pub const FEATURE_COLUMNS_FILE: &str = "feature_columns.json";
pub const FEATURES_TO_SCALE_FILE: &str = "features_to_scale.json";
pub const CARRIER_NAMES_FILE: &str = "carrier_names.json";
pub const AIRPORT_NAMES_FILE: &str = "airport_names.json";
pub const LOOKUP_FILE: &str = "lookup_table.json";
pub const STATS_FILE: &str = "dataset_stats.json";
pub const MANIFEST_FILE: &str = "manifest.json";

/// Average delay used when the source carried no delay minutes.
pub const DEFAULT_AVG_DELAY_MINUTES: f64 = 11.5;
const MAX_FLIGHTS_QUANTILE: f64 = 0.995;

/// Historical outcome of one (carrier, airport, month).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LookupRow {
    pub carrier: String,
    pub airport: String,
    pub month: Month,
    pub delay_probability: f64,
    pub avg_delay_minutes: f64,
}

#[derive(Debug, Clone, Copy, Default)]
struct MeanAcc {
    sum: f64,
    count: usize,
}

impl MeanAcc {
    fn add(&mut self, v: f64) {
        self.sum += v;
        self.count += 1;
    }

    fn mean(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }
}

/// Lookup rows indexed by (carrier, airport, month), with per-carrier and
/// per-airport means of `delay_probability` over their rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "Vec<LookupRow>", into = "Vec<LookupRow>")]
pub struct LookupTable {
    rows: Vec<LookupRow>,
    index: HashMap<(String, String, Month), usize>,
    carrier_means: HashMap<String, f64>,
    airport_means: HashMap<String, f64>,
}

impl From<Vec<LookupRow>> for LookupTable {
    fn from(rows: Vec<LookupRow>) -> Self {
        let mut index = HashMap::with_capacity(rows.len());
        let mut carriers: HashMap<String, MeanAcc> = HashMap::new();
        let mut airports: HashMap<String, MeanAcc> = HashMap::new();
        for (i, r) in rows.iter().enumerate() {
            index.insert((r.carrier.clone(), r.airport.clone(), r.month), i);
            carriers.entry(r.carrier.clone()).or_default().add(r.delay_probability);
            airports.entry(r.airport.clone()).or_default().add(r.delay_probability);
        }
        let means = |m: HashMap<String, MeanAcc>| -> HashMap<String, f64> {
            m.into_iter().filter_map(|(k, acc)| acc.mean().map(|v| (k, v))).collect()
        };
        Self {
            rows,
            index,
            carrier_means: means(carriers),
            airport_means: means(airports),
        }
    }
}

impl From<LookupTable> for Vec<LookupRow> {
    fn from(table: LookupTable) -> Self {
        table.rows
    }
}

impl PartialEq for LookupTable {
    fn eq(&self, other: &Self) -> bool {
        self.rows == other.rows
    }
}

#[derive(Default)]
struct LookupAcc {
    delayed: f64,
    flights: f64,
    delay_minutes: Option<f64>,
}

impl LookupTable {
    /// Aggregates raw training counts: `sum(arr_del15) / sum(arr_flights)`
    /// and `sum(arr_delay) / sum(arr_flights)` per triple.
    pub fn from_training(rows: &[EngineeredRecord]) -> Self {
        let mut groups: BTreeMap<(String, String, Month), LookupAcc> = BTreeMap::new();
        for r in rows {
            let acc = groups.entry((r.carrier.clone(), r.airport.clone(), r.month)).or_default();
            acc.delayed += r.arr_del15;
            acc.flights += r.arr_flights;
            if let Some(d) = r.arr_delay {
                *acc.delay_minutes.get_or_insert(0.0) += d;
            }
        }
        let rows: Vec<LookupRow> = groups
            .into_iter()
            .map(|((carrier, airport, month), acc)| LookupRow {
                carrier,
                airport,
                month,
                delay_probability: safe_ratio(acc.delayed, acc.flights),
                avg_delay_minutes: match acc.delay_minutes {
                    Some(minutes) if acc.flights > 0.0 => minutes / acc.flights,
                    _ => DEFAULT_AVG_DELAY_MINUTES,
                },
            })
            .collect();
        info!(entries = rows.len(), "Built lookup table");
        Self::from(rows)
    }

    pub fn get(&self, carrier: &str, airport: &str, month: Month) -> Option<&LookupRow> {
        self.index
            .get(&(carrier.to_string(), airport.to_string(), month))
            .map(|&i| &self.rows[i])
    }

    pub fn carrier_mean(&self, carrier: &str) -> Option<f64> {
        self.carrier_means.get(carrier).copied()
    }

    pub fn airport_mean(&self, airport: &str) -> Option<f64> {
        self.airport_means.get(airport).copied()
    }

    pub fn rows(&self) -> &[LookupRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Training-set summary used for serving fallbacks and dashboard ranges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetStats {
    pub overall_delay_rate: f64,
    pub avg_delay_minutes: f64,
    pub carriers: Vec<String>,
    pub airports: Vec<String>,
    pub months: Vec<u32>,
    pub min_flights: u64,
    /// 99.5th percentile, so one outlier does not stretch input ranges.
    pub max_flights: u64,
    pub median_flights: u64,
    /// Year that `years_since_baseline` counts from.
    pub baseline_year: i32,
    /// Latest year in the data; serving rows are dated to it.
    pub reference_year: i32,
    /// Mean per-cause share of delay minutes, when the source had causes.
    pub cause_shares: Option<CauseValues>,
}

impl DatasetStats {
    pub fn from_training(train: &TrainingSet, lookup: &LookupTable, baseline_year: i32, reference_year: i32) -> Self {
        let rows = train.rows();
        let delayed: f64 = rows.iter().map(|r| r.arr_del15).sum();
        let flights: Vec<f64> = rows.iter().map(|r| r.arr_flights).collect();

        let avg_delay_minutes = if lookup.is_empty() {
            DEFAULT_AVG_DELAY_MINUTES
        } else {
            lookup.rows().iter().map(|r| r.avg_delay_minutes).sum::<f64>() / lookup.len() as f64
        };

        let mut share_sum = [0.0; 5];
        let mut share_rows = 0usize;
        for pct in rows.iter().filter_map(|r| r.avg_cause_pct.as_ref()) {
            for (acc, v) in share_sum.iter_mut().zip(pct.as_array()) {
                *acc += v;
            }
            share_rows += 1;
        }
        let cause_shares = (share_rows > 0).then(|| {
            let [carrier, weather, nas, security, late_aircraft] = share_sum.map(|s| s / share_rows as f64);
            CauseValues { carrier, weather, nas, security, late_aircraft }
        });

        Self {
            overall_delay_rate: safe_ratio(delayed, flights.iter().sum()),
            avg_delay_minutes,
            carriers: sorted_unique(rows.iter().map(|r| r.carrier.clone())),
            airports: sorted_unique(rows.iter().map(|r| r.airport.clone())),
            months: sorted_unique(rows.iter().map(|r| r.month.get())),
            min_flights: flights.iter().copied().reduce(f64::min).unwrap_or(0.0) as u64,
            max_flights: quantile(&flights, MAX_FLIGHTS_QUANTILE).unwrap_or(0.0) as u64,
            median_flights: median(&flights).unwrap_or(0.0) as u64,
            baseline_year,
            reference_year,
            cause_shares,
        }
    }
}

fn sorted_unique<T: Ord>(values: impl Iterator<Item = T>) -> Vec<T> {
    values.collect::<BTreeSet<T>>().into_iter().collect()
}

/// Code to display name for carriers and airports seen in training. A code
/// never given a name maps to itself; otherwise the last name seen wins.
pub fn display_names<F>(rows: &[EngineeredRecord], pick: F) -> BTreeMap<String, String>
where
    F: for<'a> Fn(&'a EngineeredRecord) -> (&'a str, Option<&'a str>),
{
    let mut names: BTreeMap<String, String> = BTreeMap::new();
    for r in rows {
        match pick(r) {
            (code, Some(name)) => {
                names.insert(code.to_string(), name.to_string());
            }
            (code, None) => {
                names.entry(code.to_string()).or_insert_with(|| code.to_string());
            }
        }
    }
    names
}

/// Provenance of a bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub created_at: DateTime<Utc>,
    pub best_model: ModelKind,
    pub feature_count: usize,
    pub history_scope: HistoryScope,
    pub validation: RegressionMetrics,
    pub test: Option<RegressionMetrics>,
}

/// Everything the inference service needs, loaded or saved as a unit.
#[derive(Debug, Clone)]
pub struct ArtifactBundle {
    pub model: TrainedModel,
    pub preprocessor: Preprocessor,
    pub carrier_names: BTreeMap<String, String>,
    pub airport_names: BTreeMap<String, String>,
    pub lookup: LookupTable,
    pub stats: DatasetStats,
    pub manifest: Manifest,
}

impl ArtifactBundle {
    /// Writes every blob into `dest`, replacing any previous store there.
    pub fn save(&self, dest: &Path) -> Result<()> {
        let staging = staging_dir(dest)?;
        if staging.exists() {
            fs::remove_dir_all(&staging)?;
        }
        fs::create_dir_all(&staging).map_err(|e| {
            DelayError::artifact(format!("cannot create artifact directory {}: {e}", staging.display()))
        })?;

        if let Err(e) = self.write_blobs(&staging) {
            if let Err(cleanup) = fs::remove_dir_all(&staging) {
                warn!(path = %staging.display(), error = %cleanup, "Failed to remove staging directory");
            }
            return Err(e);
        }

        if dest.exists() {
            fs::remove_dir_all(dest)?;
        }
        fs::rename(&staging, dest)?;
        info!(path = %dest.display(), model = %self.manifest.best_model, "Saved artifacts");
        Ok(())
    }

    fn write_blobs(&self, dir: &Path) -> Result<()> {
        write_blob(dir, MODEL_FILE, &self.model)?;
        write_blob(dir, SCALER_FILE, self.preprocessor.scaler())?;
        write_blob(dir, ENCODERS_FILE, self.preprocessor.encoders())?;
        write_blob(dir, FEATURE_COLUMNS_FILE, self.preprocessor.feature_columns())?;
        write_blob(dir, FEATURES_TO_SCALE_FILE, self.preprocessor.features_to_scale())?;
        write_blob(dir, CARRIER_NAMES_FILE, &self.carrier_names)?;
        write_blob(dir, AIRPORT_NAMES_FILE, &self.airport_names)?;
        write_blob(dir, LOOKUP_FILE, &self.lookup)?;
        write_blob(dir, STATS_FILE, &self.stats)?;
        write_blob(dir, MANIFEST_FILE, &self.manifest)
    }

    /// Reads and cross-checks a full store. Any missing or inconsistent blob is an error.
    pub fn load(dir: &Path) -> Result<Self> {
        let model: TrainedModel = read_blob(dir, MODEL_FILE)?;
        let scaler: RobustScaler = read_blob(dir, SCALER_FILE)?;
        let encoders: CategoricalEncoders = read_blob(dir, ENCODERS_FILE)?;
        let feature_columns: Vec<FeatureColumn> = read_blob(dir, FEATURE_COLUMNS_FILE)?;
        let features_to_scale: Vec<FeatureColumn> = read_blob(dir, FEATURES_TO_SCALE_FILE)?;

        if features_to_scale.as_slice() != scaler.columns() {
            return Err(DelayError::artifact("features_to_scale does not match the scaler's columns"));
        }
        let preprocessor = Preprocessor::from_parts(encoders, scaler, feature_columns)?;
        if model.n_features() != preprocessor.feature_columns().len() {
            return Err(DelayError::artifact(format!(
                "model expects {} features but {} feature columns were saved",
                model.n_features(),
                preprocessor.feature_columns().len()
            )));
        }

        let bundle = Self {
            model,
            preprocessor,
            carrier_names: read_blob(dir, CARRIER_NAMES_FILE)?,
            airport_names: read_blob(dir, AIRPORT_NAMES_FILE)?,
            lookup: read_blob(dir, LOOKUP_FILE)?,
            stats: read_blob(dir, STATS_FILE)?,
            manifest: read_blob(dir, MANIFEST_FILE)?,
        };
        info!(
            path = %dir.display(),
            model = %bundle.model.kind(),
            lookup_entries = bundle.lookup.len(),
            "Loaded artifacts"
        );
        Ok(bundle)
    }
}

fn staging_dir(dest: &Path) -> Result<PathBuf> {
    let name = dest
        .file_name()
        .ok_or_else(|| DelayError::artifact(format!("invalid artifact directory {}", dest.display())))?;
    let mut staging_name = name.to_os_string();
    staging_name.push(format!(".tmp-{}", std::process::id()));
    let parent = match dest.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent)
        .map_err(|e| DelayError::artifact(format!("cannot create {}: {e}", parent.display())))?;
    Ok(parent.join(staging_name))
}

fn write_blob<T: Serialize + ?Sized>(dir: &Path, name: &str, value: &T) -> Result<()> {
    let mut writer = BufWriter::new(File::create(dir.join(name))?);
    serde_json::to_writer(&mut writer, value)?;
    writer.flush()?;
    Ok(())
}

fn read_blob<T: DeserializeOwned>(dir: &Path, name: &str) -> Result<T> {
    let path = dir.join(name);
    let file = File::open(&path)
        .map_err(|e| DelayError::artifact(format!("cannot open {}: {e}", path.display())))?;
    serde_json::from_reader(BufReader::new(file))
        .map_err(|e| DelayError::artifact(format!("corrupt {}: {e}", path.display())))
}
