//! Feature engineering: turns cleaned records into model-ready rows.
//!
//! Raw per-cause counts and minutes never leave this module. Counts become
//! occurrence flags, minutes become per-(carrier, airport, month) cause shares
//! through the [`HistoryProvider`], and the per-row `_delay_pct` values used to
//! build those shares are not kept on the engineered row.

pub mod columns;
pub mod derive;
pub mod history;

pub use columns::{CategoricalColumn, FeatureColumn};
pub use derive::{derive_row, RowInput};
pub use history::{HistoricalAggregates, HistoryProvider};

use crate::month::Month;
use crate::preprocess::{CauseValues, FlightRecord};
use crate::stats::{quantile, safe_ratio};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::info;

/// Combos seen fewer times than this are grouped into [`OTHER_COMBO`].
pub const RARE_COMBO_THRESHOLD: usize = 10;
pub const OTHER_COMBO: &str = "Other";
const DELAY_MINUTES_CAP_QUANTILE: f64 = 0.99;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolumeCategory {
    Small,
    Medium,
    Large,
    MajorHub,
}

impl VolumeCategory {
    /// Buckets arrivals at 50 / 200 / 500, upper edges inclusive.
    pub fn from_flights(arr_flights: f64) -> Self {
        if arr_flights <= 50.0 {
            Self::Small
        } else if arr_flights <= 200.0 {
            Self::Medium
        } else if arr_flights <= 500.0 {
            Self::Large
        } else {
            Self::MajorHub
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Small => "small",
            Self::Medium => "medium",
            Self::Large => "large",
            Self::MajorHub => "major_hub",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StressLevel {
    Low,
    Moderate,
    High,
    Severe,
}

impl StressLevel {
    /// Buckets the combined cancellation + diversion rate at 0.01 / 0.05 / 0.15.
    pub fn from_disruption_rate(rate: f64) -> Self {
        if rate <= 0.01 {
            Self::Low
        } else if rate <= 0.05 {
            Self::Moderate
        } else if rate <= 0.15 {
            Self::High
        } else {
            Self::Severe
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Moderate => "moderate",
            Self::High => "high",
            Self::Severe => "severe",
        }
    }
}

/// A cleaned record plus every derived column.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineeredRecord {
    pub carrier: String,
    pub carrier_name: Option<String>,
    pub airport: String,
    pub airport_name: Option<String>,
    pub year: i32,
    pub month: Month,
    pub arr_flights: f64,
    pub arr_del15: f64,
    pub arr_cancelled: f64,
    pub arr_diverted: f64,
    pub arr_delay: Option<f64>,

    /// Target: share of arrivals delayed 15+ minutes, in `[0, 1]`.
    pub delay_rate: f64,
    pub avg_delay_minutes: f64,

    /// weather / nas (congestion) / late aircraft (cascade) / carrier / security occurrence.
    pub cause_flags: Option<CauseValues>,
    pub avg_cause_pct: Option<CauseValues>,

    pub month_sin: f64,
    pub month_cos: f64,
    pub years_since_baseline: f64,
    pub holiday_period: f64,
    pub peak_summer: f64,
    pub winter_weather_season: f64,

    pub flight_volume_category: VolumeCategory,
    pub flight_volume_percentile: Option<f64>,
    pub capacity_utilization: Option<f64>,

    pub cancellation_rate: f64,
    pub diversion_rate: f64,
    pub diversion_occurred: f64,
    pub total_disruption_rate: f64,
    pub operational_stress_level: StressLevel,

    pub carrier_historical_delay_rate: f64,
    pub airport_historical_delay_rate: f64,
    pub seasonal_delay_rate: f64,

    pub carrier_peak_risk: f64,
    pub carrier_winter_risk: f64,
    pub airport_holiday_risk: f64,

    pub arr_flights_log: f64,
    pub arr_del15_log: f64,
    pub arr_cancelled_log: f64,
    pub arr_diverted_log: f64,

    pub carrier_airport_combo: String,
}

/// Engineers the full record set against `history`.
///
/// Pure: the same input and history always give the same output.
pub fn engineer<H>(records: &[FlightRecord], history: &H) -> Vec<EngineeredRecord>
where
    H: HistoryProvider + ?Sized,
{
    let Some(baseline_year) = records.iter().map(|r| r.year).min() else {
        return Vec::new();
    };

    let mut rows: Vec<EngineeredRecord> = records
        .iter()
        .map(|r| derive_row(&RowInput::from(r), baseline_year, history))
        .collect();

    assign_volume_percentiles(&mut rows);
    assign_capacity_utilization(&mut rows);
    cap_arr_delay(&mut rows);
    group_rare_combos(&mut rows, RARE_COMBO_THRESHOLD);

    info!(rows = rows.len(), baseline_year, "Engineered features");
    rows
}

/// Average-rank percentile of `arr_flights` within the set.
fn assign_volume_percentiles(rows: &mut [EngineeredRecord]) {
    let n = rows.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| rows[a].arr_flights.total_cmp(&rows[b].arr_flights));

    let mut start = 0;
    while start < n {
        let value = rows[order[start]].arr_flights;
        let mut end = start;
        while end + 1 < n && rows[order[end + 1]].arr_flights == value {
            end += 1;
        }
        // 1-based ranks start+1 ..= end+1 share their average
        let pct = (start + end + 2) as f64 / 2.0 / n as f64;
        for &i in &order[start..=end] {
            rows[i].flight_volume_percentile = Some(pct);
        }
        start = end + 1;
    }
}

fn assign_capacity_utilization(rows: &mut [EngineeredRecord]) {
    let mut airport_max: HashMap<String, f64> = HashMap::new();
    for r in rows.iter() {
        let max = airport_max.entry(r.airport.clone()).or_insert(0.0);
        *max = max.max(r.arr_flights);
    }
    for r in rows.iter_mut() {
        let max = airport_max.get(&r.airport).copied().unwrap_or(0.0);
        r.capacity_utilization = Some(safe_ratio(r.arr_flights, max));
    }
}

/// Caps total delay minutes at their 99th percentile. The per-cause minute
/// columns are already gone by now, so `arr_delay` is the only one left.
fn cap_arr_delay(rows: &mut [EngineeredRecord]) {
    let delays: Vec<f64> = rows.iter().filter_map(|r| r.arr_delay).collect();
    let Some(cap) = quantile(&delays, DELAY_MINUTES_CAP_QUANTILE) else {
        return;
    };
    for r in rows.iter_mut() {
        if let Some(d) = r.arr_delay.as_mut() {
            *d = d.min(cap);
        }
    }
}

fn group_rare_combos(rows: &mut [EngineeredRecord], threshold: usize) {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for r in rows.iter() {
        *counts.entry(r.carrier_airport_combo.clone()).or_default() += 1;
    }
    let rare = counts.values().filter(|&&c| c < threshold).count();
    for r in rows.iter_mut() {
        if counts.get(&r.carrier_airport_combo).is_some_and(|&c| c < threshold) {
            r.carrier_airport_combo = OTHER_COMBO.to_string();
        }
    }
    info!(rare_combos = rare, "Grouped rare carrier/airport combos");
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Minimal cleaned record with no optional blocks.
    pub(crate) fn record(carrier: &str, airport: &str, year: i32, month: u32, flights: f64, del15: f64) -> FlightRecord {
        FlightRecord {
            carrier: carrier.to_string(),
            carrier_name: None,
            airport: airport.to_string(),
            airport_name: None,
            year,
            month: Month::new(month).unwrap(),
            arr_flights: flights,
            arr_del15: del15,
            arr_cancelled: 0.0,
            arr_diverted: 0.0,
            arr_delay: None,
            cause_counts: None,
            cause_minutes: None,
        }
    }

    #[test]
    fn test_volume_and_stress_buckets() {
        assert_eq!(VolumeCategory::from_flights(0.0), VolumeCategory::Small);
        assert_eq!(VolumeCategory::from_flights(50.0), VolumeCategory::Small);
        assert_eq!(VolumeCategory::from_flights(50.5), VolumeCategory::Medium);
        assert_eq!(VolumeCategory::from_flights(500.0), VolumeCategory::Large);
        assert_eq!(VolumeCategory::from_flights(501.0), VolumeCategory::MajorHub);
        assert_eq!(StressLevel::from_disruption_rate(0.0), StressLevel::Low);
        assert_eq!(StressLevel::from_disruption_rate(0.023), StressLevel::Moderate);
        assert_eq!(StressLevel::from_disruption_rate(0.15), StressLevel::High);
        assert_eq!(StressLevel::from_disruption_rate(0.2), StressLevel::Severe);
    }

    #[test]
    fn test_engineer_dataset_level_columns() {
        let mut rows = vec![
            record("AA", "ORD", 2014, 1, 100.0, 10.0),
            record("AA", "ORD", 2015, 2, 200.0, 20.0),
            record("UA", "ORD", 2016, 3, 200.0, 40.0),
            record("UA", "SFO", 2017, 4, 400.0, 40.0),
        ];
        for (r, delay) in rows.iter_mut().zip([100.0, 200.0, 300.0, 10_000.0]) {
            r.arr_delay = Some(delay);
        }
        let agg = HistoricalAggregates::from_records(&rows);
        let out = engineer(&rows, &agg);

        assert_eq!(out[0].years_since_baseline, 0.0);
        assert_eq!(out[3].years_since_baseline, 3.0);
        assert_eq!(out[0].flight_volume_percentile, Some(0.25));
        assert_eq!(out[1].flight_volume_percentile, Some(0.625));
        assert_eq!(out[2].flight_volume_percentile, Some(0.625));
        assert_eq!(out[3].flight_volume_percentile, Some(1.0));
        assert_eq!(out[0].capacity_utilization, Some(0.5));
        assert_eq!(out[3].capacity_utilization, Some(1.0));
        assert!(out[3].arr_delay.unwrap() < 10_000.0);
        assert_eq!(out[0].arr_delay, Some(100.0));
        // avg delay is derived before capping, then capped at 120
        assert_eq!(out[3].avg_delay_minutes, 25.0);
        assert!(out.iter().all(|r| r.carrier_airport_combo == OTHER_COMBO));
    }

    #[test]
    fn test_frequent_combo_survives() {
        let rows: Vec<FlightRecord> = (1..=12)
            .map(|m| record("DL", "ATL", 2015, m, 900.0, 90.0))
            .chain(std::iter::once(record("B6", "JFK", 2015, 1, 90.0, 9.0)))
            .collect();
        let out = engineer(&rows, &HistoricalAggregates::from_records(&rows));
        assert_eq!(out[0].carrier_airport_combo, "DL_ATL");
        assert_eq!(out[12].carrier_airport_combo, OTHER_COMBO);
    }

    #[test]
    fn test_engineer_is_idempotent() {
        let rows = vec![
            record("AA", "ORD", 2014, 1, 100.0, 10.0),
            record("UA", "SFO", 2017, 12, 0.0, 0.0),
        ];
        let agg = HistoricalAggregates::from_records(&rows);
        assert_eq!(engineer(&rows, &agg), engineer(&rows, &agg));
        assert!(engineer(&[], &agg).is_empty());
    }
}
