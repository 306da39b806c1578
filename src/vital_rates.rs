//! Age-specific vital rates.
//!
//! A table maps every age from 0 to the oldest tabulated age to an annual
//! fertility rate (births per individual, before the single-sex halving) and
//! an annual mortality probability. Ages past the end of the table have no
//! entry; the demography treats such a lookup miss as certain death.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const DEFAULT_MAX_AGE: u16 = 99;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AgeRates {
    pub age: u16,
    pub fertility: f64,
    pub mortality: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct VitalRates {
    rates: Vec<AgeRates>,
}

impl VitalRates {
    /// Builds a table from rows that must cover ages `0..=max_age` exactly once,
    /// in order, with rates in `[0, 1]`.
    pub fn from_rows(rows: Vec<AgeRates>) -> Result<Self, ConfigError> {
        if rows.is_empty() {
            return Err(ConfigError::InvalidVitalRates(
                "table must contain at least one age".into(),
            ));
        }
        for (expected, row) in rows.iter().enumerate() {
            if row.age as usize != expected {
                return Err(ConfigError::InvalidVitalRates(format!(
                    "ages must be contiguous from 0, found {} at position {}",
                    row.age, expected
                )));
            }
            for (name, value) in [("fertility", row.fertility), ("mortality", row.mortality)] {
                if !(0.0..=1.0).contains(&value) {
                    return Err(ConfigError::InvalidVitalRates(format!(
                        "{name} at age {} must lie in [0, 1], got {value}",
                        row.age
                    )));
                }
            }
        }
        Ok(Self { rates: rows })
    }

    /// Pre-industrial schedule: Siler mortality hazard and a fertility hump
    /// peaking in the late twenties.
    pub fn pre_industrial() -> Self {
        Self::pre_industrial_to(DEFAULT_MAX_AGE)
    }

    pub fn pre_industrial_to(max_age: u16) -> Self {
        let rates = (0..=max_age)
            .map(|age| {
                let x = age as f64;
                let hazard = 0.175 * (-1.4 * x).exp() + 0.00368 + 0.000075 * (0.0917 * x).exp();
                let fertility = if (15..50).contains(&age) {
                    0.35 * (-((x - 27.0) / 8.0).powi(2)).exp()
                } else {
                    0.0
                };
                AgeRates {
                    age,
                    fertility,
                    mortality: (1.0 - (-hazard).exp()).clamp(0.0, 1.0),
                }
            })
            .collect();
        Self { rates }
    }

    pub fn max_age(&self) -> u16 {
        // from_rows rejects empty tables
        self.rates.last().map(|r| r.age).unwrap_or(0)
    }

    pub fn get(&self, age: u16) -> Option<&AgeRates> {
        self.rates.get(age as usize)
    }

    pub fn fertility(&self, age: u16) -> Option<f64> {
        self.get(age).map(|r| r.fertility)
    }

    pub fn mortality(&self, age: u16) -> Option<f64> {
        self.get(age).map(|r| r.mortality)
    }

    pub fn rows(&self) -> &[AgeRates] {
        &self.rates
    }

    /// Probability of surviving from birth to each tabulated age.
    pub fn survivorship(&self) -> Vec<f64> {
        let mut alive = 1.0;
        self.rates
            .iter()
            .map(|row| {
                let at_age = alive;
                alive *= 1.0 - row.mortality;
                at_age
            })
            .collect()
    }

    /// Expected lifetime offspring per individual under the single-sex
    /// convention, with no food stress.
    pub fn net_reproduction(&self) -> f64 {
        self.survivorship()
            .iter()
            .zip(&self.rates)
            .map(|(l, row)| l * row.fertility * 0.5)
            .sum()
    }
}

impl Default for VitalRates {
    fn default() -> Self {
        Self::pre_industrial()
    }
}

impl<'de> Deserialize<'de> for VitalRates {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let rows = Vec::<AgeRates>::deserialize(deserializer)?;
        VitalRates::from_rows(rows).map_err(serde::de::Error::custom)
    }
}
