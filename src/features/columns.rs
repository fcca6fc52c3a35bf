//! Named model columns and how each one is read off an [`EngineeredRecord`].

use super::EngineeredRecord;
use serde::{Deserialize, Serialize};

/// A column that is label-encoded rather than used as a number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoricalColumn {
    Carrier,
    Airport,
    FlightVolumeCategory,
    OperationalStressLevel,
}

impl CategoricalColumn {
    pub const ALL: [CategoricalColumn; 4] = [
        CategoricalColumn::Carrier,
        CategoricalColumn::Airport,
        CategoricalColumn::FlightVolumeCategory,
        CategoricalColumn::OperationalStressLevel,
    ];

    pub fn label<'a>(self, r: &'a EngineeredRecord) -> &'a str {
        match self {
            Self::Carrier => &r.carrier,
            Self::Airport => &r.airport,
            Self::FlightVolumeCategory => r.flight_volume_category.label(),
            Self::OperationalStressLevel => r.operational_stress_level.label(),
        }
    }
}

macro_rules! feature_columns {
    ($($variant:ident => $name:literal,)+) => {
        /// Candidate model inputs, in model column order.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum FeatureColumn {
            $($variant,)+
        }

        impl FeatureColumn {
            pub const CANDIDATES: &'static [FeatureColumn] = &[$(FeatureColumn::$variant,)+];

            pub fn name(self) -> &'static str {
                match self {
                    $(FeatureColumn::$variant => $name,)+
                }
            }
        }
    };
}

// Outcome-bearing columns (arr_del15 and its log, arr_delay, avg_delay_minutes,
// delay_rate), arr_flights itself, the global-rank / airport-max columns and the
// identity strings are not candidates.
feature_columns! {
    Year => "year",
    Month => "month",
    Carrier => "carrier",
    Airport => "airport",
    ArrCancelled => "arr_cancelled",
    ArrDiverted => "arr_diverted",
    WeatherImpactOccurred => "weather_impact_occurred",
    SystemCongestionOccurred => "system_congestion_occurred",
    CascadeDelayOccurred => "cascade_delay_occurred",
    CarrierIssuesOccurred => "carrier_issues_occurred",
    SecurityIncidentOccurred => "security_incident_occurred",
    MonthSin => "month_sin",
    MonthCos => "month_cos",
    YearsSinceBaseline => "years_since_baseline",
    HolidayPeriod => "holiday_period",
    PeakSummer => "peak_summer",
    WinterWeatherSeason => "winter_weather_season",
    CancellationRate => "cancellation_rate",
    DiversionRate => "diversion_rate",
    DiversionOccurred => "diversion_occurred",
    TotalDisruptionRate => "total_disruption_rate",
    OperationalStressLevel => "operational_stress_level",
    CarrierHistoricalDelayRate => "carrier_historical_delay_rate",
    AirportHistoricalDelayRate => "airport_historical_delay_rate",
    SeasonalDelayRate => "seasonal_delay_rate",
    AvgCarrierPct => "avg_carrier_pct",
    AvgWeatherPct => "avg_weather_pct",
    AvgNasPct => "avg_nas_pct",
    AvgSecurityPct => "avg_security_pct",
    AvgLateAircraftPct => "avg_late_aircraft_pct",
    CarrierPeakRisk => "carrier_peak_risk",
    CarrierWinterRisk => "carrier_winter_risk",
    AirportHolidayRisk => "airport_holiday_risk",
    ArrFlightsLog => "arr_flights_log",
    ArrCancelledLog => "arr_cancelled_log",
    ArrDivertedLog => "arr_diverted_log",
}

impl FeatureColumn {
    pub fn categorical(self) -> Option<CategoricalColumn> {
        match self {
            Self::Carrier => Some(CategoricalColumn::Carrier),
            Self::Airport => Some(CategoricalColumn::Airport),
            Self::OperationalStressLevel => Some(CategoricalColumn::OperationalStressLevel),
            _ => None,
        }
    }

    /// Binary, ordinal and categorical columns keep their raw values.
    pub fn is_scaled(self) -> bool {
        self.categorical().is_none()
            && !matches!(
                self,
                Self::Year
                    | Self::Month
                    | Self::HolidayPeriod
                    | Self::PeakSummer
                    | Self::WinterWeatherSeason
                    | Self::DiversionOccurred
            )
    }

    /// Numeric value of the column; `None` for categorical columns and for
    /// optional blocks the source did not carry.
    pub fn numeric_value(self, r: &EngineeredRecord) -> Option<f64> {
        let flag = |pick: fn(&crate::preprocess::CauseValues) -> f64| r.cause_flags.as_ref().map(pick);
        let pct = |pick: fn(&crate::preprocess::CauseValues) -> f64| r.avg_cause_pct.as_ref().map(pick);
        match self {
            Self::Year => Some(r.year as f64),
            Self::Month => Some(r.month.get() as f64),
            Self::Carrier | Self::Airport | Self::OperationalStressLevel => None,
            Self::ArrCancelled => Some(r.arr_cancelled),
            Self::ArrDiverted => Some(r.arr_diverted),
            Self::WeatherImpactOccurred => flag(|c| c.weather),
            Self::SystemCongestionOccurred => flag(|c| c.nas),
            Self::CascadeDelayOccurred => flag(|c| c.late_aircraft),
            Self::CarrierIssuesOccurred => flag(|c| c.carrier),
            Self::SecurityIncidentOccurred => flag(|c| c.security),
            Self::MonthSin => Some(r.month_sin),
            Self::MonthCos => Some(r.month_cos),
            Self::YearsSinceBaseline => Some(r.years_since_baseline),
            Self::HolidayPeriod => Some(r.holiday_period),
            Self::PeakSummer => Some(r.peak_summer),
            Self::WinterWeatherSeason => Some(r.winter_weather_season),
            Self::CancellationRate => Some(r.cancellation_rate),
            Self::DiversionRate => Some(r.diversion_rate),
            Self::DiversionOccurred => Some(r.diversion_occurred),
            Self::TotalDisruptionRate => Some(r.total_disruption_rate),
            Self::CarrierHistoricalDelayRate => Some(r.carrier_historical_delay_rate),
            Self::AirportHistoricalDelayRate => Some(r.airport_historical_delay_rate),
            Self::SeasonalDelayRate => Some(r.seasonal_delay_rate),
            Self::AvgCarrierPct => pct(|c| c.carrier),
            Self::AvgWeatherPct => pct(|c| c.weather),
            Self::AvgNasPct => pct(|c| c.nas),
            Self::AvgSecurityPct => pct(|c| c.security),
            Self::AvgLateAircraftPct => pct(|c| c.late_aircraft),
            Self::CarrierPeakRisk => Some(r.carrier_peak_risk),
            Self::CarrierWinterRisk => Some(r.carrier_winter_risk),
            Self::AirportHolidayRisk => Some(r.airport_holiday_risk),
            Self::ArrFlightsLog => Some(r.arr_flights_log),
            Self::ArrCancelledLog => Some(r.arr_cancelled_log),
            Self::ArrDivertedLog => Some(r.arr_diverted_log),
        }
    }

    /// Candidates whose values exist on every row; optional cause blocks drop out
    /// as a whole when the source lacked them.
    pub fn available(rows: &[EngineeredRecord]) -> Vec<FeatureColumn> {
        Self::CANDIDATES
            .iter()
            .copied()
            .filter(|c| c.categorical().is_some() || rows.iter().all(|r| c.numeric_value(r).is_some()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::tests::record;
    use crate::features::{engineer, HistoricalAggregates};
    use crate::preprocess::CauseValues;

    #[test]
    fn test_serde_name_matches_column_name() {
        for col in FeatureColumn::CANDIDATES {
            let json = serde_json::to_string(col).unwrap();
            assert_eq!(json, format!("\"{}\"", col.name()));
        }
    }

    #[test]
    fn test_scaling_exclusions() {
        assert!(!FeatureColumn::Year.is_scaled());
        assert!(!FeatureColumn::Carrier.is_scaled());
        assert!(!FeatureColumn::DiversionOccurred.is_scaled());
        assert!(FeatureColumn::CancellationRate.is_scaled());
        assert!(FeatureColumn::WeatherImpactOccurred.is_scaled());
    }

    #[test]
    fn test_optional_blocks_drop_out() {
        let rows = vec![record("AA", "ORD", 2015, 1, 10.0, 1.0)];
        let out = engineer(&rows, &HistoricalAggregates::from_records(&rows));
        let cols = FeatureColumn::available(&out);
        assert!(!cols.contains(&FeatureColumn::WeatherImpactOccurred));
        assert!(!cols.contains(&FeatureColumn::AvgNasPct));
        assert!(cols.contains(&FeatureColumn::Carrier));
        assert_eq!(cols.len(), FeatureColumn::CANDIDATES.len() - 10);

        let mut full = rows[0].clone();
        full.arr_delay = Some(10.0);
        full.cause_counts = Some(CauseValues::default());
        full.cause_minutes = Some(CauseValues::default());
        let out = engineer(&[full.clone()], &HistoricalAggregates::from_records([&full]));
        assert_eq!(FeatureColumn::available(&out).len(), FeatureColumn::CANDIDATES.len());
    }
}
