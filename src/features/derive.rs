//! Per-row feature derivation shared by batch engineering and serving.

use super::history::{
    HistoryProvider, DEFAULT_AIRPORT_RATE, DEFAULT_CARRIER_RATE, DEFAULT_SEASONAL_RATE,
};
use super::{EngineeredRecord, StressLevel, VolumeCategory};
use crate::month::Month;
use crate::preprocess::{CauseValues, FlightRecord};
use crate::stats::safe_ratio;

pub const AVG_DELAY_CAP_MINUTES: f64 = 120.0;

/// The observable facts a feature row is derived from.
#[derive(Debug, Clone)]
pub struct RowInput<'a> {
    pub carrier: &'a str,
    pub carrier_name: Option<&'a str>,
    pub airport: &'a str,
    pub airport_name: Option<&'a str>,
    pub year: i32,
    pub month: Month,
    pub arr_flights: f64,
    /// 0 for serving rows, whose outcome is unknown.
    pub arr_del15: f64,
    pub arr_cancelled: f64,
    pub arr_diverted: f64,
    pub arr_delay: Option<f64>,
    pub cause_counts: Option<CauseValues>,
}

impl<'a> From<&'a FlightRecord> for RowInput<'a> {
    fn from(r: &'a FlightRecord) -> Self {
        Self {
            carrier: &r.carrier,
            carrier_name: r.carrier_name.as_deref(),
            airport: &r.airport,
            airport_name: r.airport_name.as_deref(),
            year: r.year,
            month: r.month,
            arr_flights: r.arr_flights,
            arr_del15: r.arr_del15,
            arr_cancelled: r.arr_cancelled,
            arr_diverted: r.arr_diverted,
            arr_delay: r.arr_delay,
            cause_counts: r.cause_counts,
        }
    }
}

fn flag(condition: bool) -> f64 {
    if condition {
        1.0
    } else {
        0.0
    }
}

/// Derives every row-local feature. Dataset-relative fields (volume
/// percentile, capacity utilisation, rare-combo grouping, delay-minute
/// capping) are left for the batch stage.
pub fn derive_row<H>(input: &RowInput<'_>, baseline_year: i32, history: &H) -> EngineeredRecord
where
    H: HistoryProvider + ?Sized,
{
    let flights = input.arr_flights;
    let month = input.month;

    let delay_rate = safe_ratio(input.arr_del15, flights).clamp(0.0, 1.0);
    let avg_delay_minutes = input
        .arr_delay
        .map(|d| safe_ratio(d, flights))
        .unwrap_or(0.0)
        .min(AVG_DELAY_CAP_MINUTES);
    let cause_flags = input.cause_counts.map(|c| c.map(|v| flag(v > 0.0)));

    let holiday_period = flag(month.is_holiday_period());
    let peak_summer = flag(month.is_peak_summer());
    let winter_weather_season = flag(month.is_winter_weather_season());

    let cancellation_rate = safe_ratio(input.arr_cancelled, flights);
    let diversion_rate = safe_ratio(input.arr_diverted, flights);
    let total_disruption_rate = cancellation_rate + diversion_rate;

    let carrier_rate = history.carrier_rate(input.carrier).unwrap_or(DEFAULT_CARRIER_RATE);
    let airport_rate = history.airport_rate(input.airport).unwrap_or(DEFAULT_AIRPORT_RATE);
    let seasonal_rate = history
        .seasonal_rate(input.carrier, input.airport, month)
        .unwrap_or(DEFAULT_SEASONAL_RATE);

    EngineeredRecord {
        carrier: input.carrier.to_string(),
        carrier_name: input.carrier_name.map(str::to_string),
        airport: input.airport.to_string(),
        airport_name: input.airport_name.map(str::to_string),
        year: input.year,
        month,
        arr_flights: flights,
        arr_del15: input.arr_del15,
        arr_cancelled: input.arr_cancelled,
        arr_diverted: input.arr_diverted,
        arr_delay: input.arr_delay,
        delay_rate,
        avg_delay_minutes,
        cause_flags,
        avg_cause_pct: history.cause_shares(input.carrier, input.airport, month),
        month_sin: month.sin(),
        month_cos: month.cos(),
        years_since_baseline: (input.year - baseline_year) as f64,
        holiday_period,
        peak_summer,
        winter_weather_season,
        flight_volume_category: VolumeCategory::from_flights(flights),
        flight_volume_percentile: None,
        capacity_utilization: None,
        cancellation_rate,
        diversion_rate,
        diversion_occurred: flag(input.arr_diverted > 0.0),
        total_disruption_rate,
        operational_stress_level: StressLevel::from_disruption_rate(total_disruption_rate),
        carrier_historical_delay_rate: carrier_rate,
        airport_historical_delay_rate: airport_rate,
        seasonal_delay_rate: seasonal_rate,
        carrier_peak_risk: carrier_rate * peak_summer,
        carrier_winter_risk: carrier_rate * winter_weather_season,
        airport_holiday_risk: airport_rate * holiday_period,
        arr_flights_log: flights.max(0.0).ln_1p(),
        arr_del15_log: input.arr_del15.max(0.0).ln_1p(),
        arr_cancelled_log: input.arr_cancelled.max(0.0).ln_1p(),
        arr_diverted_log: input.arr_diverted.max(0.0).ln_1p(),
        carrier_airport_combo: format!("{}_{}", input.carrier, input.airport),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::history::HistoricalAggregates;
    use crate::features::tests::record;

    #[test]
    fn test_derive_rates_and_flags() {
        let mut r = record("AA", "ORD", 2016, 7, 200.0, 50.0);
        r.arr_cancelled = 4.0;
        r.arr_diverted = 2.0;
        r.arr_delay = Some(40_000.0);
        r.cause_counts = Some(CauseValues { carrier: 3.0, weather: 0.0, nas: 1.5, security: 0.0, late_aircraft: 2.0 });
        let agg = HistoricalAggregates::from_records([&r]);
        let row = derive_row(&RowInput::from(&r), 2013, &agg);

        assert!((row.delay_rate - 0.25).abs() < 1e-12);
        assert_eq!(row.avg_delay_minutes, 120.0);
        assert!((row.cancellation_rate - 0.02).abs() < 1e-12);
        assert!((row.total_disruption_rate - 0.03).abs() < 1e-12);
        assert_eq!(row.operational_stress_level, StressLevel::Moderate);
        assert_eq!(row.flight_volume_category, VolumeCategory::Medium);
        assert_eq!(row.diversion_occurred, 1.0);
        assert_eq!(row.years_since_baseline, 3.0);
        let flags = row.cause_flags.unwrap();
        assert_eq!(flags.as_array(), [1.0, 0.0, 1.0, 0.0, 1.0]);
        assert!((row.carrier_peak_risk - 0.25).abs() < 1e-12);
        assert_eq!(row.carrier_winter_risk, 0.0);
        assert!((row.airport_holiday_risk - 0.25).abs() < 1e-12);
        assert!((row.arr_flights_log - 201f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn test_zero_flights_never_divides() {
        let r = record("AA", "ORD", 2016, 1, 0.0, 0.0);
        let row = derive_row(&RowInput::from(&r), 2016, &HistoricalAggregates::default());
        assert_eq!(row.delay_rate, 0.0);
        assert_eq!(row.cancellation_rate, 0.0);
        assert_eq!(row.diversion_rate, 0.0);
        assert_eq!(row.avg_delay_minutes, 0.0);
        assert_eq!(row.carrier_historical_delay_rate, DEFAULT_CARRIER_RATE);
        assert_eq!(row.seasonal_delay_rate, DEFAULT_SEASONAL_RATE);
        assert!(row.delay_rate.is_finite() && row.arr_flights_log == 0.0);
    }

    #[test]
    fn test_target_is_clipped() {
        let r = record("AA", "ORD", 2016, 1, 10.0, 12.0);
        let row = derive_row(&RowInput::from(&r), 2016, &HistoricalAggregates::default());
        assert_eq!(row.delay_rate, 1.0);
    }
}
