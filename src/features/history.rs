use crate::month::Month;
use crate::preprocess::{CauseValues, FlightRecord};
use crate::stats::safe_ratio;
use std::collections::HashMap;

/// Observed baseline rates used when no aggregate exists for a key.
pub const DEFAULT_CARRIER_RATE: f64 = 0.196;
pub const DEFAULT_AIRPORT_RATE: f64 = 0.193;
pub const DEFAULT_SEASONAL_RATE: f64 = 0.199;
/// Long-run share (%) of delay minutes per cause.
pub const DEFAULT_CAUSE_SHARES: CauseValues = CauseValues {
    carrier: 37.48,
    weather: 5.65,
    nas: 19.42,
    security: 0.19,
    late_aircraft: 34.60,
};

/// Source of the historical delay signals a feature row is enriched with.
///
/// Implemented over raw records for batch engineering and over the frozen
/// lookup table for serving, so both paths share one derivation.
pub trait HistoryProvider {
    fn carrier_rate(&self, carrier: &str) -> Option<f64>;
    fn airport_rate(&self, airport: &str) -> Option<f64>;
    fn seasonal_rate(&self, carrier: &str, airport: &str, month: Month) -> Option<f64>;
    /// Mean percentage of delay minutes per cause; `None` when causes are unknown.
    fn cause_shares(&self, carrier: &str, airport: &str, month: Month) -> Option<CauseValues>;
}

#[derive(Debug, Clone, Copy, Default)]
struct RateSum {
    delayed: f64,
    flights: f64,
}

impl RateSum {
    fn add(&mut self, r: &FlightRecord) {
        self.delayed += r.arr_del15;
        self.flights += r.arr_flights;
    }

    fn rate(&self) -> f64 {
        safe_ratio(self.delayed, self.flights)
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct ShareSum {
    total: [f64; 5],
    rows: usize,
}

impl ShareSum {
    fn add(&mut self, pct: &CauseValues) {
        for (t, v) in self.total.iter_mut().zip(pct.as_array()) {
            *t += v;
        }
        self.rows += 1;
    }

    fn mean(&self) -> Option<CauseValues> {
        if self.rows == 0 {
            return None;
        }
        let n = self.rows as f64;
        let [carrier, weather, nas, security, late_aircraft] = self.total.map(|t| t / n);
        Some(CauseValues { carrier, weather, nas, security, late_aircraft })
    }
}

type Triple = (String, String, Month);

/// Percentage of total delay minutes attributed to each cause, 0 when there were none.
pub fn cause_percentages(minutes: &CauseValues, arr_delay: f64) -> CauseValues {
    minutes.map(|m| safe_ratio(m, arr_delay) * 100.0)
}

/// sum(arr_del15) / sum(arr_flights) grouped by carrier, airport, and
/// (carrier, airport, month), plus per-triple mean cause shares.
#[derive(Debug, Clone, Default)]
pub struct HistoricalAggregates {
    carrier: HashMap<String, RateSum>,
    airport: HashMap<String, RateSum>,
    seasonal: HashMap<Triple, RateSum>,
    shares: HashMap<Triple, ShareSum>,
    global_shares: ShareSum,
}

impl HistoricalAggregates {
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a FlightRecord>) -> Self {
        let mut agg = Self::default();
        for r in records {
            agg.carrier.entry(r.carrier.clone()).or_default().add(r);
            agg.airport.entry(r.airport.clone()).or_default().add(r);
            let key = (r.carrier.clone(), r.airport.clone(), r.month);
            agg.seasonal.entry(key.clone()).or_default().add(r);
            if let (Some(minutes), Some(total)) = (r.cause_minutes, r.arr_delay) {
                let pct = cause_percentages(&minutes, total);
                agg.shares.entry(key).or_default().add(&pct);
                agg.global_shares.add(&pct);
            }
        }
        agg
    }

    /// Mean cause shares over every row, `None` without cause data.
    pub fn global_cause_shares(&self) -> Option<CauseValues> {
        self.global_shares.mean()
    }

    fn triple(carrier: &str, airport: &str, month: Month) -> Triple {
        (carrier.to_string(), airport.to_string(), month)
    }
}

impl HistoryProvider for HistoricalAggregates {
    fn carrier_rate(&self, carrier: &str) -> Option<f64> {
        self.carrier.get(carrier).map(RateSum::rate)
    }

    fn airport_rate(&self, airport: &str) -> Option<f64> {
        self.airport.get(airport).map(RateSum::rate)
    }

    fn seasonal_rate(&self, carrier: &str, airport: &str, month: Month) -> Option<f64> {
        self.seasonal.get(&Self::triple(carrier, airport, month)).map(RateSum::rate)
    }

    fn cause_shares(&self, carrier: &str, airport: &str, month: Month) -> Option<CauseValues> {
        self.shares
            .get(&Self::triple(carrier, airport, month))
            .and_then(ShareSum::mean)
            .or_else(|| self.global_cause_shares())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::tests::record;

    #[test]
    fn test_rates_are_ratio_of_sums() {
        let rows = vec![
            record("AA", "ORD", 2015, 7, 100.0, 10.0),
            record("AA", "ORD", 2016, 7, 300.0, 90.0),
            record("AA", "DFW", 2016, 1, 600.0, 60.0),
            record("UA", "ORD", 2016, 7, 0.0, 0.0),
        ];
        let agg = HistoricalAggregates::from_records(&rows);
        let jul = Month::new(7).unwrap();

        assert!((agg.carrier_rate("AA").unwrap() - 160.0 / 1000.0).abs() < 1e-12);
        assert!((agg.airport_rate("ORD").unwrap() - 100.0 / 400.0).abs() < 1e-12);
        assert!((agg.seasonal_rate("AA", "ORD", jul).unwrap() - 0.25).abs() < 1e-12);
        assert_eq!(agg.carrier_rate("UA"), Some(0.0));
        assert_eq!(agg.carrier_rate("ZZ"), None);
        assert_eq!(agg.seasonal_rate("AA", "DFW", jul), None);
        assert_eq!(agg.cause_shares("AA", "ORD", jul), None);
    }

    #[test]
    fn test_cause_shares_fall_back_to_global_mean() {
        let mut a = record("AA", "ORD", 2015, 7, 100.0, 10.0);
        a.arr_delay = Some(200.0);
        a.cause_minutes = Some(CauseValues { carrier: 100.0, weather: 0.0, nas: 50.0, security: 0.0, late_aircraft: 50.0 });
        let mut b = record("AA", "DFW", 2015, 7, 100.0, 10.0);
        b.arr_delay = Some(0.0);
        b.cause_minutes = Some(CauseValues::default());

        let agg = HistoricalAggregates::from_records([&a, &b]);
        let jul = Month::new(7).unwrap();
        let ord = agg.cause_shares("AA", "ORD", jul).unwrap();
        assert!((ord.carrier - 50.0).abs() < 1e-12);
        assert!((ord.nas - 25.0).abs() < 1e-12);
        let dfw = agg.cause_shares("AA", "DFW", jul).unwrap();
        assert_eq!(dfw, CauseValues::default());
        let unseen = agg.cause_shares("B6", "JFK", jul).unwrap();
        assert!((unseen.carrier - 25.0).abs() < 1e-12);
    }
}
