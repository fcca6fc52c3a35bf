// Chronological train / validation / test partition.
use crate::config::SplitConfig;
use crate::error::{DelayError, Result};
use crate::features::EngineeredRecord;
use tracing::{info, warn};

/// Rows from the training years. Only [`split_by_year`] can build one, and it
/// is the only input encoders and the scaler can be fitted on.
#[derive(Debug, Clone)]
pub struct TrainingSet {
    rows: Vec<EngineeredRecord>,
}

impl TrainingSet {
    pub fn rows(&self) -> &[EngineeredRecord] {
        &self.rows
    }
}

/// Validation or test rows: transformed with the training fit, never fitted on.
#[derive(Debug, Clone, Default)]
pub struct HoldoutSet {
    rows: Vec<EngineeredRecord>,
}

impl HoldoutSet {
    pub fn rows(&self) -> &[EngineeredRecord] {
        &self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct DataSplit {
    pub train: TrainingSet,
    pub validation: HoldoutSet,
    pub test: HoldoutSet,
}

/// Sorts by (year, month) and partitions by year. Training and validation
/// must be non-empty; an empty test partition is allowed and skipped later.
pub fn split_by_year(mut rows: Vec<EngineeredRecord>, cfg: &SplitConfig) -> Result<DataSplit> {
    rows.sort_by_key(|r| (r.year, r.month));

    let (mut train, mut validation, mut test) = (Vec::new(), Vec::new(), Vec::new());
    let mut unassigned = 0usize;
    for r in rows {
        if cfg.train_years.contains(&r.year) {
            train.push(r);
        } else if cfg.validation_years.contains(&r.year) {
            validation.push(r);
        } else if cfg.test_years.contains(&r.year) {
            test.push(r);
        } else {
            unassigned += 1;
        }
    }

    if train.is_empty() {
        return Err(DelayError::data(format!("no rows in training years {:?}", cfg.train_years)));
    }
    if validation.is_empty() {
        return Err(DelayError::data(format!("no rows in validation years {:?}", cfg.validation_years)));
    }
    if test.is_empty() {
        warn!(years = ?cfg.test_years, "Test partition is empty");
    }
    info!(
        train = train.len(),
        validation = validation.len(),
        test = test.len(),
        unassigned,
        "Split data chronologically"
    );

    Ok(DataSplit {
        train: TrainingSet { rows: train },
        validation: HoldoutSet { rows: validation },
        test: HoldoutSet { rows: test },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::tests::record;
    use crate::features::{engineer, HistoricalAggregates};

    fn engineered(years: &[i32]) -> Vec<EngineeredRecord> {
        let rows: Vec<_> = years.iter().map(|&y| record("AA", "ORD", y, 3, 100.0, 10.0)).collect();
        engineer(&rows, &HistoricalAggregates::from_records(&rows))
    }

    #[test]
    fn test_split_by_year() {
        let split = split_by_year(engineered(&[2019, 2013, 2022, 2018, 2011, 2023]), &SplitConfig::default()).unwrap();
        let years = |rows: &[EngineeredRecord]| rows.iter().map(|r| r.year).collect::<Vec<_>>();
        assert_eq!(years(split.train.rows()), vec![2013, 2018]);
        assert_eq!(years(split.validation.rows()), vec![2019]);
        assert_eq!(years(split.test.rows()), vec![2022, 2023]);
    }

    #[test]
    fn test_empty_partitions() {
        assert!(split_by_year(engineered(&[2019, 2022]), &SplitConfig::default()).is_err());
        assert!(split_by_year(engineered(&[2014, 2022]), &SplitConfig::default()).is_err());
        let split = split_by_year(engineered(&[2014, 2019]), &SplitConfig::default()).unwrap();
        assert!(split.test.is_empty());
    }
}
