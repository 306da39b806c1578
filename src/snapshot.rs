//! Population snapshots, time series and the JSON snapshot writer.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HouseholdSnapshot {
    pub id: u32,
    pub settlement: u32,
    pub occupants: usize,
    pub laborers: usize,
    pub land: f64,
    pub storage: f64,
    pub yield_memory: f64,
    pub farming_fraction: f64,
    pub food_ratio: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementSnapshot {
    pub id: u32,
    pub name: String,
    pub population: usize,
    pub laborers: usize,
    pub total_land: f64,
    pub total_maintenance: f64,
    pub infrastructure: f64,
    pub irrigation_water: f64,
    pub precipitation: f64,
    pub runoff: f64,
    pub climatic_yield: f64,
}

/// State of every settlement and household at the end of a step. Step 0 is
/// the initial state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopulationSnapshot {
    pub step: u64,
    pub settlements: Vec<SettlementSnapshot>,
    pub households: Vec<HouseholdSnapshot>,
}

impl PopulationSnapshot {
    pub fn total_population(&self) -> usize {
        self.households.iter().map(|h| h.occupants).sum()
    }

    pub fn total_laborers(&self) -> usize {
        self.households.iter().map(|h| h.laborers).sum()
    }

    pub fn total_land(&self) -> f64 {
        self.households.iter().map(|h| h.land).sum()
    }

    /// Food ratios of households that still have occupants.
    fn occupied_food_ratios(&self) -> Vec<f64> {
        self.households
            .iter()
            .filter(|h| h.occupants > 0)
            .map(|h| h.food_ratio)
            .collect()
    }

    /// Mean food ratio over occupied households; `None` once all are empty.
    pub fn mean_food_ratio(&self) -> Option<f64> {
        let ratios = self.occupied_food_ratios();
        if ratios.is_empty() {
            return None;
        }
        Some(ratios.iter().sum::<f64>() / ratios.len() as f64)
    }

    pub fn median_food_ratio(&self) -> Option<f64> {
        let mut ratios = self.occupied_food_ratios();
        if ratios.is_empty() {
            return None;
        }
        ratios.sort_by(f64::total_cmp);
        let mid = ratios.len() / 2;
        if ratios.len() % 2 == 0 {
            Some((ratios[mid - 1] + ratios[mid]) / 2.0)
        } else {
            Some(ratios[mid])
        }
    }

    /// Dependents per hundred laborers; `None` without laborers.
    pub fn dependency_ratio(&self) -> Option<f64> {
        let laborers = self.total_laborers();
        if laborers == 0 {
            return None;
        }
        let dependents = self.total_population() - laborers;
        Some(dependents as f64 / laborers as f64 * 100.0)
    }
}

/// Every snapshot of one run, step 0 first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeries {
    pub scenario: String,
    pub seed: u64,
    pub snapshots: Vec<PopulationSnapshot>,
}

impl TimeSeries {
    pub fn new(scenario: impl Into<String>, seed: u64) -> Self {
        Self {
            scenario: scenario.into(),
            seed,
            snapshots: Vec::new(),
        }
    }

    pub fn push(&mut self, snapshot: PopulationSnapshot) {
        self.snapshots.push(snapshot);
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn last(&self) -> Option<&PopulationSnapshot> {
        self.snapshots.last()
    }

    pub fn at(&self, step: u64) -> Option<&PopulationSnapshot> {
        self.snapshots.iter().find(|s| s.step == step)
    }

    pub fn population_trajectory(&self) -> Vec<usize> {
        self.snapshots.iter().map(|s| s.total_population()).collect()
    }

    pub fn food_ratio_trajectory(&self) -> Vec<Option<f64>> {
        self.snapshots.iter().map(|s| s.mean_food_ratio()).collect()
    }

    pub fn land_trajectory(&self) -> Vec<f64> {
        self.snapshots.iter().map(|s| s.total_land()).collect()
    }
}

/// Writes a snapshot to `<dir>/<scenario>/step_NNNNNN.json` every
/// `interval` steps. An interval of zero disables writing.
pub struct SnapshotWriter {
    output_dir: PathBuf,
    interval: u64,
}

impl SnapshotWriter {
    pub fn new(output_dir: impl AsRef<Path>, interval: u64) -> Self {
        Self {
            output_dir: output_dir.as_ref().to_path_buf(),
            interval,
        }
    }

    pub fn disabled() -> Self {
        Self::new(".", 0)
    }

    pub fn should_write(&self, step: u64) -> bool {
        self.interval > 0 && step > 0 && step % self.interval == 0
    }

    pub fn maybe_write(
        &self,
        snapshot: &PopulationSnapshot,
        scenario: &str,
    ) -> Result<Option<PathBuf>, EngineError> {
        if !self.should_write(snapshot.step) {
            return Ok(None);
        }
        let dir = self.output_dir.join(scenario);
        fs::create_dir_all(&dir)?;
        let path = dir.join(format!("step_{:06}.json", snapshot.step));
        fs::write(&path, serde_json::to_string_pretty(snapshot)?)?;
        Ok(Some(path))
    }
}

pub fn load_snapshot(path: impl AsRef<Path>) -> Result<PopulationSnapshot, EngineError> {
    let data = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&data)?)
}
