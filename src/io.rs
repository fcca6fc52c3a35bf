// Module for loading the raw delay-cause CSV and writing CSV reports. It validates the
// header, detects optional column blocks and skips rows it cannot parse.
use crate::error::Result;
use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{info, warn};

pub const CAUSE_COUNT_COLUMNS: [&str; 5] =
    ["carrier_ct", "weather_ct", "nas_ct", "security_ct", "late_aircraft_ct"];
pub const CAUSE_MINUTE_COLUMNS: [&str; 5] = [
    "carrier_delay",
    "weather_delay",
    "nas_delay",
    "security_delay",
    "late_aircraft_delay",
];
const REQUIRED_COLUMNS: [&str; 6] = ["year", "month", "carrier", "airport", "arr_flights", "arr_del15"];

/// One line of the monthly carrier/airport delay-cause file, as read.
#[derive(Debug, Clone, Deserialize)]
pub struct RawFlightRow {
    pub year: i32,
    pub month: u32,
    pub carrier: String,
    #[serde(default)] pub carrier_name: Option<String>,
    pub airport: String,
    #[serde(default)] pub airport_name: Option<String>,
    #[serde(default)] pub arr_flights: Option<f64>,
    #[serde(default)] pub arr_del15: Option<f64>,
    #[serde(default)] pub carrier_ct: Option<f64>,
    #[serde(default)] pub weather_ct: Option<f64>,
    #[serde(default)] pub nas_ct: Option<f64>,
    #[serde(default)] pub security_ct: Option<f64>,
    #[serde(default)] pub late_aircraft_ct: Option<f64>,
    #[serde(default)] pub arr_cancelled: Option<f64>,
    #[serde(default)] pub arr_diverted: Option<f64>,
    #[serde(default)] pub arr_delay: Option<f64>,
    #[serde(default)] pub carrier_delay: Option<f64>,
    #[serde(default)] pub weather_delay: Option<f64>,
    #[serde(default)] pub nas_delay: Option<f64>,
    #[serde(default)] pub security_delay: Option<f64>,
    #[serde(default)] pub late_aircraft_delay: Option<f64>,
}

/// Which optional column blocks the source header carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourceSchema {
    pub has_arr_delay: bool,
    pub has_cause_counts: bool,
    pub has_cause_minutes: bool,
}

impl SourceSchema {
    fn from_headers(headers: &StringRecord) -> Self {
        let has = |name: &str| headers.iter().any(|h| h.trim() == name);
        Self {
            has_arr_delay: has("arr_delay"),
            has_cause_counts: CAUSE_COUNT_COLUMNS.iter().all(|c| has(c)),
            has_cause_minutes: CAUSE_MINUTE_COLUMNS.iter().all(|c| has(c)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SourceData {
    pub schema: SourceSchema,
    pub rows: Vec<RawFlightRow>,
}

pub fn load_csv(path: &Path) -> Result<SourceData> {
    let file = File::open(path)?;
    let data = read_csv(file)?;
    info!(path = %path.display(), rows = data.rows.len(), "Loaded source data");
    Ok(data)
}

pub fn read_csv<R: Read>(reader: R) -> Result<SourceData> {
    let mut rdr = ReaderBuilder::new()
        .delimiter(b',')
        .flexible(true)
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = rdr.headers()?.clone();
    for required in REQUIRED_COLUMNS {
        if !headers.iter().any(|h| h == required) {
            return Err(crate::error::DelayError::data(format!(
                "source is missing required column '{required}'"
            )));
        }
    }
    let schema = SourceSchema::from_headers(&headers);
    let expected_len = headers.len();

    let mut rows = Vec::new();
    for result in rdr.records() {
        let raw: StringRecord = result?;
        let line = raw.position().map(|p| p.line()).unwrap_or(0);

        if raw.iter().all(|f| f.is_empty()) {
            continue;
        }

        if raw.len() != expected_len {
            warn!(line, expected = expected_len, found = raw.len(), "Skipping row with wrong field count");
            continue;
        }

        match raw.deserialize::<RawFlightRow>(Some(&headers)) {
            Ok(rec) => rows.push(rec),
            Err(e) => warn!(line, error = %e, "Skipping malformed record"),
        }
    }

    Ok(SourceData { schema, rows })
}

/// Writes serde rows as a headed CSV file, creating parent directories.
pub fn write_csv<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut wtr = WriterBuilder::new().has_headers(true).from_path(path)?;
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL_HEADER: &str = "year,month,carrier,carrier_name,airport,airport_name,arr_flights,arr_del15,\
carrier_ct,weather_ct,nas_ct,security_ct,late_aircraft_ct,arr_cancelled,arr_diverted,arr_delay,\
carrier_delay,weather_delay,nas_delay,security_delay,late_aircraft_delay";

    #[test]
    fn test_read_full_record() {
        let csv = format!(
            "{FULL_HEADER}\n2019,7,AA,American Airlines Inc.,ORD,\"Chicago, IL: O'Hare\",1000.0,150.0,\
40.0,5.0,50.0,0.0,55.0,12.0,3.0,9000.0,3000.0,500.0,2000.0,0.0,3500.0\n"
        );
        let data = read_csv(csv.as_bytes()).unwrap();
        assert_eq!(data.rows.len(), 1);
        assert!(data.schema.has_arr_delay);
        assert!(data.schema.has_cause_counts);
        assert!(data.schema.has_cause_minutes);
        let r = &data.rows[0];
        assert_eq!(r.carrier, "AA");
        assert_eq!(r.airport_name.as_deref(), Some("Chicago, IL: O'Hare"));
        assert_eq!(r.arr_flights, Some(1000.0));
        assert_eq!(r.security_ct, Some(0.0));
    }

    #[test]
    fn test_optional_blocks_absent() {
        let csv = "year,month,carrier,airport,arr_flights,arr_del15,arr_cancelled,arr_diverted\n\
2015,1,DL,ATL,500,60,,1\n";
        let data = read_csv(csv.as_bytes()).unwrap();
        assert_eq!(data.schema, SourceSchema::default());
        let r = &data.rows[0];
        assert_eq!(r.arr_cancelled, None);
        assert_eq!(r.carrier_ct, None);
        assert_eq!(r.arr_delay, None);
    }

    #[test]
    fn test_skips_blank_short_and_malformed_lines() {
        let csv = "year,month,carrier,airport,arr_flights,arr_del15\n\
2015,1,DL,ATL,500,60\n\
,,,,,\n\
2015,2,DL\n\
20x5,3,DL,ATL,500,60\n\
2015,4,DL,ATL,,\n";
        let data = read_csv(csv.as_bytes()).unwrap();
        assert_eq!(data.rows.len(), 2);
        assert_eq!(data.rows[1].month, 4);
        assert_eq!(data.rows[1].arr_flights, None);
    }

    #[test]
    fn test_missing_required_column_is_error() {
        let csv = "year,month,carrier,arr_flights,arr_del15\n2015,1,DL,500,60\n";
        assert!(read_csv(csv.as_bytes()).is_err());
    }

    #[test]
    fn test_write_csv_creates_parent() {
        #[derive(Serialize)]
        struct Row {
            name: &'static str,
            value: f64,
        }
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("out.csv");
        write_csv(&path, &[Row { name: "a", value: 1.5 }]).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "name,value\na,1.5\n");
    }
}
