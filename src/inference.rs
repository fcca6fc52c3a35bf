//! Single-call delay prediction over a loaded [`ArtifactBundle`].
//!
//! A (carrier, airport, month) seen in training is answered straight from the
//! lookup table. Anything else is rebuilt as a feature row through the same
//! derivation the training rows went through, with historical rates read from
//! the lookup table, and scored by the frozen model.

use crate::artifacts::{ArtifactBundle, DatasetStats, LookupTable};
use crate::error::Result;
use crate::features::history::DEFAULT_CAUSE_SHARES;
use crate::features::{derive_row, HistoryProvider, RowInput};
use crate::month::Month;
use crate::preprocess::CauseValues;
use serde::Serialize;
use std::fmt;
use std::path::Path;
use tracing::debug;

pub const DEFAULT_ARR_FLIGHTS: u32 = 100;
const ASSUMED_CANCELLATION_SHARE: f64 = 0.02;
const ASSUMED_DIVERSION_SHARE: f64 = 0.003;

/// Historical rates for serving, read from the frozen lookup table.
pub struct LookupHistory<'a> {
    lookup: &'a LookupTable,
    stats: &'a DatasetStats,
}

impl<'a> LookupHistory<'a> {
    pub fn new(lookup: &'a LookupTable, stats: &'a DatasetStats) -> Self {
        Self { lookup, stats }
    }
}

impl HistoryProvider for LookupHistory<'_> {
    fn carrier_rate(&self, carrier: &str) -> Option<f64> {
        self.lookup.carrier_mean(carrier)
    }

    fn airport_rate(&self, airport: &str) -> Option<f64> {
        self.lookup.airport_mean(airport)
    }

    fn seasonal_rate(&self, carrier: &str, airport: &str, month: Month) -> Option<f64> {
        self.lookup.get(carrier, airport, month).map(|r| r.delay_probability)
    }

    fn cause_shares(&self, _carrier: &str, _airport: &str, _month: Month) -> Option<CauseValues> {
        Some(self.stats.cause_shares.unwrap_or(DEFAULT_CAUSE_SHARES))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RiskLevel {
    #[serde(rename = "Very Low")]
    VeryLow,
    Low,
    Moderate,
    High,
}

impl RiskLevel {
    /// Lower bounds are inclusive: exactly 0.15 is `Low`.
    pub fn from_probability(p: f64) -> Self {
        if p < 0.15 {
            Self::VeryLow
        } else if p < 0.25 {
            Self::Low
        } else if p < 0.35 {
            Self::Moderate
        } else {
            Self::High
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::VeryLow => "Very Low",
            Self::Low => "Low",
            Self::Moderate => "Moderate",
            Self::High => "High",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionSource {
    Lookup,
    Model,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    /// Display name, or the code when no name is known.
    pub carrier: String,
    pub airport: String,
    pub month: u32,
    pub delay_probability: f64,
    pub avg_delay_minutes: f64,
    pub risk_level: RiskLevel,
    pub expected_delays_per_100: u32,
    pub source: PredictionSource,
}

/// Read-only after construction; `predict` can be called from many threads.
#[derive(Debug, Clone)]
pub struct FlightDelayPredictor {
    bundle: ArtifactBundle,
}

impl FlightDelayPredictor {
    /// Fails if any artifact is missing or inconsistent.
    pub fn load(dir: &Path) -> Result<Self> {
        Ok(Self::from_bundle(ArtifactBundle::load(dir)?))
    }

    pub fn from_bundle(bundle: ArtifactBundle) -> Self {
        Self { bundle }
    }

    pub fn bundle(&self) -> &ArtifactBundle {
        &self.bundle
    }

    /// Errors only for a month outside `1..=12`; unknown codes still get a prediction.
    pub fn predict(&self, carrier: &str, airport: &str, month: u32, arr_flights: u32) -> Result<Prediction> {
        let month = Month::new(month)?;
        let b = &self.bundle;

        let (delay_probability, avg_delay_minutes, source) = match b.lookup.get(carrier, airport, month) {
            Some(row) => (row.delay_probability, row.avg_delay_minutes, PredictionSource::Lookup),
            None => (self.model_estimate(carrier, airport, month, arr_flights), b.stats.avg_delay_minutes, PredictionSource::Model),
        };
        debug!(carrier, airport, month = month.get(), ?source, delay_probability, "Prediction");

        Ok(Prediction {
            carrier: b.carrier_names.get(carrier).cloned().unwrap_or_else(|| carrier.to_string()),
            airport: b.airport_names.get(airport).cloned().unwrap_or_else(|| airport.to_string()),
            month: month.get(),
            delay_probability,
            avg_delay_minutes,
            risk_level: RiskLevel::from_probability(delay_probability),
            expected_delays_per_100: (delay_probability * 100.0).round() as u32,
            source,
        })
    }

    fn model_estimate(&self, carrier: &str, airport: &str, month: Month, arr_flights: u32) -> f64 {
        let b = &self.bundle;
        let flights = f64::from(arr_flights);
        let input = RowInput {
            carrier,
            carrier_name: None,
            airport,
            airport_name: None,
            year: b.stats.reference_year,
            month,
            arr_flights: flights,
            arr_del15: 0.0,
            arr_cancelled: (flights * ASSUMED_CANCELLATION_SHARE).floor(),
            arr_diverted: (flights * ASSUMED_DIVERSION_SHARE).floor(),
            arr_delay: None,
            cause_counts: Some(CauseValues::default()),
        };
        let history = LookupHistory::new(&b.lookup, &b.stats);
        let row = derive_row(&input, b.stats.baseline_year, &history);
        let x = b.preprocessor.transform_row(&row);
        b.model.predict_row(x.view())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::tests::bundle;
    use crate::error::DelayError;
    use crate::features::history::{DEFAULT_AIRPORT_RATE, DEFAULT_CARRIER_RATE, DEFAULT_SEASONAL_RATE};

    #[test]
    fn test_risk_thresholds() {
        assert_eq!(RiskLevel::from_probability(0.0), RiskLevel::VeryLow);
        assert_eq!(RiskLevel::from_probability(0.1499), RiskLevel::VeryLow);
        assert_eq!(RiskLevel::from_probability(0.15), RiskLevel::Low);
        assert_eq!(RiskLevel::from_probability(0.25), RiskLevel::Moderate);
        assert_eq!(RiskLevel::from_probability(0.35), RiskLevel::High);
        assert_eq!(serde_json::to_string(&RiskLevel::VeryLow).unwrap(), "\"Very Low\"");
    }

    #[test]
    fn test_lookup_hit_returns_historical_rate() {
        let predictor = FlightDelayPredictor::from_bundle(bundle());
        // 150 delayed out of 1000 training flights
        let p = predictor.predict("AA", "ORD", 7, DEFAULT_ARR_FLIGHTS).unwrap();
        assert_eq!(p.source, PredictionSource::Lookup);
        assert!((p.delay_probability - 0.15).abs() < 1e-12);
        assert_eq!(p.risk_level, RiskLevel::Low);
        assert_eq!(p.expected_delays_per_100, 15);
        assert_eq!(p.carrier, "American Airlines Inc.");
        assert_eq!(p.airport, "ORD");
    }

    #[test]
    fn test_unseen_triple_uses_lookup_averages() {
        let b = bundle();
        let history = LookupHistory::new(&b.lookup, &b.stats);
        let mar = Month::new(3).unwrap();
        // AA never flew ORD in March, but both codes have lookup rows
        assert!(b.lookup.get("AA", "ORD", mar).is_none());
        let carrier = history.carrier_rate("AA").unwrap();
        let airport = history.airport_rate("ORD").unwrap();
        assert!((carrier - 0.125).abs() < 1e-12);
        assert!((airport - 0.225).abs() < 1e-12);
        assert_ne!(carrier, DEFAULT_CARRIER_RATE);
        assert_ne!(airport, DEFAULT_AIRPORT_RATE);

        let input = RowInput {
            carrier: "AA",
            carrier_name: None,
            airport: "ORD",
            airport_name: None,
            year: 2022,
            month: mar,
            arr_flights: 100.0,
            arr_del15: 0.0,
            arr_cancelled: 2.0,
            arr_diverted: 0.0,
            arr_delay: None,
            cause_counts: None,
        };
        let row = derive_row(&input, b.stats.baseline_year, &history);
        assert_eq!(row.carrier_historical_delay_rate, carrier);
        assert_eq!(row.airport_historical_delay_rate, airport);
        assert_eq!(row.seasonal_delay_rate, DEFAULT_SEASONAL_RATE);

        let predictor = FlightDelayPredictor::from_bundle(b);
        let p = predictor.predict("AA", "ORD", 3, DEFAULT_ARR_FLIGHTS).unwrap();
        assert_eq!(p.source, PredictionSource::Model);
        assert!((0.0..=1.0).contains(&p.delay_probability));
        assert_eq!(p.avg_delay_minutes, predictor.bundle().stats.avg_delay_minutes);
    }

    #[test]
    fn test_unknown_codes_degrade_gracefully() {
        let predictor = FlightDelayPredictor::from_bundle(bundle());
        let p = predictor.predict("ZZ", "NOWHERE", 2, 0).unwrap();
        assert_eq!(p.source, PredictionSource::Model);
        assert_eq!(p.carrier, "ZZ");
        assert!((0.0..=1.0).contains(&p.delay_probability));
        assert!(p.delay_probability.is_finite());
    }

    #[test]
    fn test_month_outside_range_is_rejected() {
        let predictor = FlightDelayPredictor::from_bundle(bundle());
        assert!(matches!(predictor.predict("AA", "ORD", 13, 100), Err(DelayError::InvalidInput(_))));
        assert!(matches!(predictor.predict("AA", "ORD", 0, 100), Err(DelayError::InvalidInput(_))));
    }

    #[test]
    fn test_model_path_is_deterministic() {
        let predictor = FlightDelayPredictor::from_bundle(bundle());
        let a = predictor.predict("UA", "DFW", 8, 250).unwrap();
        let b = predictor.predict("UA", "DFW", 8, 250).unwrap();
        assert_eq!(a, b);
    }
}
