//! Exogenous climate input for a settlement.

use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// One climate variable over time. Steps are numbered from 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClimateSeries {
    Constant(f64),
    /// Value per step; the last value holds past the end of the series.
    Series(Vec<f64>),
    /// Independent normal draw per step, truncated at zero.
    Stochastic { mean: f64, sd: f64 },
}

impl ClimateSeries {
    pub fn validate(&self, name: &'static str) -> Result<(), ConfigError> {
        match self {
            ClimateSeries::Constant(value) => check_level(name, *value),
            ClimateSeries::Series(values) => {
                if values.is_empty() {
                    return Err(ConfigError::parameter(name, "series must not be empty"));
                }
                values.iter().try_for_each(|v| check_level(name, *v))
            }
            ClimateSeries::Stochastic { mean, sd } => {
                check_level(name, *mean)?;
                if !(sd.is_finite() && *sd >= 0.0) {
                    return Err(ConfigError::parameter(
                        name,
                        format!("standard deviation must be finite and non-negative, got {sd}"),
                    ));
                }
                Ok(())
            }
        }
    }

    /// Value at `step`, drawing from `rng` for stochastic series.
    pub fn value<R: Rng + ?Sized>(&self, step: u64, rng: &mut R) -> f64 {
        match self {
            ClimateSeries::Stochastic { mean, sd } => match Normal::new(*mean, *sd) {
                Ok(normal) => normal.sample(rng).max(0.0),
                Err(_) => mean.max(0.0),
            },
            _ => self.expected(step),
        }
    }

    /// Deterministic value at `step`; the mean for stochastic series.
    pub fn expected(&self, step: u64) -> f64 {
        match self {
            ClimateSeries::Constant(value) => *value,
            ClimateSeries::Series(values) => {
                let index = (step.saturating_sub(1) as usize).min(values.len().saturating_sub(1));
                values.get(index).copied().unwrap_or(0.0)
            }
            ClimateSeries::Stochastic { mean, .. } => mean.max(0.0),
        }
    }
}

fn check_level(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::parameter(
            name,
            format!("climate values must be finite and non-negative, got {value}"),
        ))
    }
}

fn unit_factor() -> f64 {
    1.0
}

/// Multiplicative perturbation over an inclusive range of steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClimateAnomaly {
    pub start: u64,
    pub end: u64,
    #[serde(default = "unit_factor")]
    pub precipitation_factor: f64,
    #[serde(default = "unit_factor")]
    pub runoff_factor: f64,
}

impl ClimateAnomaly {
    pub fn covers(&self, step: u64) -> bool {
        step >= self.start && step <= self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClimateReading {
    pub precipitation: f64,
    pub runoff: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Climate {
    #[serde(with = "serde_yaml::with::singleton_map")]
    pub precipitation: ClimateSeries,
    #[serde(with = "serde_yaml::with::singleton_map")]
    pub runoff: ClimateSeries,
    #[serde(default)]
    pub anomalies: Vec<ClimateAnomaly>,
}

impl Climate {
    pub fn constant(precipitation: f64, runoff: f64) -> Self {
        Self {
            precipitation: ClimateSeries::Constant(precipitation),
            runoff: ClimateSeries::Constant(runoff),
            anomalies: Vec::new(),
        }
    }

    pub fn with_anomaly(mut self, anomaly: ClimateAnomaly) -> Self {
        self.anomalies.push(anomaly);
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.precipitation.validate("precipitation")?;
        self.runoff.validate("runoff")?;
        for anomaly in &self.anomalies {
            if anomaly.start > anomaly.end {
                return Err(ConfigError::parameter(
                    "anomalies",
                    format!("window starts at {} after it ends at {}", anomaly.start, anomaly.end),
                ));
            }
            check_level("anomalies", anomaly.precipitation_factor)?;
            check_level("anomalies", anomaly.runoff_factor)?;
        }
        Ok(())
    }

    pub fn sample<R: Rng + ?Sized>(&self, step: u64, rng: &mut R) -> ClimateReading {
        let reading = ClimateReading {
            precipitation: self.precipitation.value(step, rng),
            runoff: self.runoff.value(step, rng),
        };
        self.perturb(step, reading)
    }

    pub fn expected(&self, step: u64) -> ClimateReading {
        let reading = ClimateReading {
            precipitation: self.precipitation.expected(step),
            runoff: self.runoff.expected(step),
        };
        self.perturb(step, reading)
    }

    fn perturb(&self, step: u64, mut reading: ClimateReading) -> ClimateReading {
        for anomaly in self.anomalies.iter().filter(|a| a.covers(step)) {
            reading.precipitation *= anomaly.precipitation_factor;
            reading.runoff *= anomaly.runoff_factor;
        }
        reading
    }
}
