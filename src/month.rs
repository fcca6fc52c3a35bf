use crate::error::{DelayError, Result};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt;

/// Calendar month, validated to `1..=12` at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Month(u32);

impl Month {
    pub fn new(month: u32) -> Result<Self> {
        if (1..=12).contains(&month) {
            Ok(Self(month))
        } else {
            Err(DelayError::invalid_input(format!("month must be in 1..=12, got {month}")))
        }
    }

    pub fn get(self) -> u32 {
        self.0
    }

    pub fn sin(self) -> f64 {
        (2.0 * PI * self.0 as f64 / 12.0).sin()
    }

    pub fn cos(self) -> f64 {
        (2.0 * PI * self.0 as f64 / 12.0).cos()
    }

    /// June, July, November, December.
    pub fn is_holiday_period(self) -> bool {
        matches!(self.0, 6 | 7 | 11 | 12)
    }

    pub fn is_peak_summer(self) -> bool {
        matches!(self.0, 6..=8)
    }

    pub fn is_winter_weather_season(self) -> bool {
        matches!(self.0, 12 | 1..=3)
    }
}

impl TryFrom<u32> for Month {
    type Error = DelayError;

    fn try_from(value: u32) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Month> for u32 {
    fn from(month: Month) -> Self {
        month.0
    }
}

impl fmt::Display for Month {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
