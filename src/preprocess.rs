// Data cleaning: drops anomalous years and rows without a target, repairs missing values.
use crate::io::{RawFlightRow, SourceData, SourceSchema};
use crate::month::Month;
use crate::stats::median;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{info, warn};

/// One value per delay cause, in the order the source publishes them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CauseValues {
    pub carrier: f64,
    pub weather: f64,
    pub nas: f64,
    pub security: f64,
    pub late_aircraft: f64,
}

impl CauseValues {
    pub fn as_array(&self) -> [f64; 5] {
        [self.carrier, self.weather, self.nas, self.security, self.late_aircraft]
    }

    pub fn map(&self, f: impl Fn(f64) -> f64) -> Self {
        Self {
            carrier: f(self.carrier),
            weather: f(self.weather),
            nas: f(self.nas),
            security: f(self.security),
            late_aircraft: f(self.late_aircraft),
        }
    }
}

/// Cleaned monthly record for one carrier at one airport.
#[derive(Debug, Clone, PartialEq)]
pub struct FlightRecord {
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
    /// Present when the source carries the `arr_delay` column.
    pub arr_delay: Option<f64>,
    /// Present when the source carries all five `*_ct` columns.
    pub cause_counts: Option<CauseValues>,
    /// Present when the source carries all five cause-minute columns and `arr_delay`.
    pub cause_minutes: Option<CauseValues>,
}

/// Cleans the raw rows.
///
/// - rows from `excluded_years` are removed
/// - rows with no `arr_del15` are removed
/// - `arr_flights` is median-imputed per (carrier, airport), then by the global median
/// - cancellations, diversions, delay minutes and cause values are zero-filled
pub fn clean(data: &SourceData, excluded_years: &[i32]) -> Vec<FlightRecord> {
    let schema = data.schema;
    let mut excluded = 0usize;
    let mut missing_target = 0usize;

    let mut kept: Vec<(&RawFlightRow, Month, f64)> = Vec::with_capacity(data.rows.len());
    for row in &data.rows {
        if excluded_years.contains(&row.year) {
            excluded += 1;
            continue;
        }
        let Some(arr_del15) = row.arr_del15 else {
            missing_target += 1;
            continue;
        };
        if row.carrier.is_empty() || row.airport.is_empty() {
            warn!(year = row.year, month = row.month, "Skipping row without carrier/airport");
            continue;
        }
        let month = match Month::new(row.month) {
            Ok(m) => m,
            Err(e) => {
                warn!(carrier = %row.carrier, airport = %row.airport, error = %e, "Skipping row");
                continue;
            }
        };
        kept.push((row, month, arr_del15));
    }

    // group medians of the observed arr_flights
    let mut observed: HashMap<(&str, &str), Vec<f64>> = HashMap::new();
    let mut all_observed = Vec::new();
    for (row, _, _) in &kept {
        if let Some(f) = row.arr_flights {
            observed.entry((row.carrier.as_str(), row.airport.as_str())).or_default().push(f);
            all_observed.push(f);
        }
    }
    let group_medians: HashMap<(&str, &str), f64> = observed
        .iter()
        .filter_map(|(k, v)| median(v).map(|m| (*k, m)))
        .collect();
    let global_median = median(&all_observed).unwrap_or(0.0);

    let mut imputed = 0usize;
    let records: Vec<FlightRecord> = kept
        .into_iter()
        .map(|(row, month, arr_del15)| {
            let arr_flights = row.arr_flights.unwrap_or_else(|| {
                imputed += 1;
                group_medians
                    .get(&(row.carrier.as_str(), row.airport.as_str()))
                    .copied()
                    .unwrap_or(global_median)
            });
            to_record(row, schema, month, arr_flights, arr_del15)
        })
        .collect();

    info!(
        rows = records.len(),
        excluded_years = excluded,
        dropped_missing_target = missing_target,
        imputed_arr_flights = imputed,
        "Cleaned source data"
    );
    records
}

fn to_record(row: &RawFlightRow, schema: SourceSchema, month: Month, arr_flights: f64, arr_del15: f64) -> FlightRecord {
    let zero = |v: Option<f64>| v.unwrap_or(0.0);
    let arr_delay = schema.has_arr_delay.then(|| zero(row.arr_delay));
    let cause_counts = schema.has_cause_counts.then(|| CauseValues {
        carrier: zero(row.carrier_ct),
        weather: zero(row.weather_ct),
        nas: zero(row.nas_ct),
        security: zero(row.security_ct),
        late_aircraft: zero(row.late_aircraft_ct),
    });
    let cause_minutes = (schema.has_cause_minutes && schema.has_arr_delay).then(|| CauseValues {
        carrier: zero(row.carrier_delay),
        weather: zero(row.weather_delay),
        nas: zero(row.nas_delay),
        security: zero(row.security_delay),
        late_aircraft: zero(row.late_aircraft_delay),
    });

    FlightRecord {
        carrier: row.carrier.clone(),
        carrier_name: row.carrier_name.clone().filter(|n| !n.is_empty()),
        airport: row.airport.clone(),
        airport_name: row.airport_name.clone().filter(|n| !n.is_empty()),
        year: row.year,
        month,
        arr_flights,
        arr_del15,
        arr_cancelled: zero(row.arr_cancelled),
        arr_diverted: zero(row.arr_diverted),
        arr_delay,
        cause_counts,
        cause_minutes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::read_csv;

    #[test]
    fn test_clean_filters_and_imputes() {
        let csv = "year,month,carrier,airport,arr_flights,arr_del15,arr_cancelled,arr_diverted\n\
2015,1,DL,ATL,100,10,,\n\
2015,2,DL,ATL,300,20,1,0\n\
2015,3,DL,ATL,,15,0,0\n\
2015,4,UA,SFO,,5,0,0\n\
2020,5,DL,ATL,100,10,0,0\n\
2015,6,DL,ATL,100,,0,0\n\
2015,13,DL,ATL,100,10,0,0\n";
        let data = read_csv(csv.as_bytes()).unwrap();
        let cleaned = clean(&data, &[2020, 2021]);
        assert_eq!(cleaned.len(), 4);

        // group median of DL/ATL observed = median(100, 300) = 200
        assert_eq!(cleaned[2].arr_flights, 200.0);
        // UA/SFO has no observation; global median of (100, 300) = 200
        assert_eq!(cleaned[3].arr_flights, 200.0);
        assert_eq!(cleaned[0].arr_cancelled, 0.0);
        assert_eq!(cleaned[0].arr_delay, None);
        assert_eq!(cleaned[0].cause_counts, None);
        assert!(cleaned.iter().all(|r| r.year != 2020));
    }

    #[test]
    fn test_cause_blocks_zero_filled_when_present() {
        let csv = "year,month,carrier,airport,arr_flights,arr_del15,carrier_ct,weather_ct,nas_ct,security_ct,\
late_aircraft_ct,arr_cancelled,arr_diverted,arr_delay,carrier_delay,weather_delay,nas_delay,security_delay,late_aircraft_delay\n\
2016,7,AA,ORD,100,20,5,,3,0,2,1,0,,100,0,50,,40\n";
        let data = read_csv(csv.as_bytes()).unwrap();
        let cleaned = clean(&data, &[]);
        let r = &cleaned[0];
        assert_eq!(r.arr_delay, Some(0.0));
        assert_eq!(r.cause_counts.unwrap().weather, 0.0);
        assert_eq!(r.cause_minutes.unwrap().nas, 50.0);
        assert_eq!(r.cause_minutes.unwrap().security, 0.0);
    }
}
